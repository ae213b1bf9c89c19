//! Source-control probing
//!
//! Best-effort by design: a version-identifiable image must still be
//! producible from a plain source export, so every probe failure (no
//! repository, no commits, detached head, missing git binary) collapses
//! to empty fields and is never surfaced as an error.

use std::path::PathBuf;
use std::process::Command;

/// What the probe learned about the source tree.
///
/// All fields are empty strings when the tree is not a usable
/// repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScmInfo {
    /// Short commit identifier (14 hex chars), `-dirty` suffixed when
    /// the tree has uncommitted changes
    pub commit: String,

    /// Active branch name
    pub branch: String,
}

/// Seam for source-control state, so the synthesizer can be exercised
/// without a repository.
pub trait ScmProbe {
    fn probe(&self) -> ScmInfo;
}

/// Probes the working tree with the `git` command-line tool.
pub struct GitProbe {
    worktree: PathBuf,
}

/// Length of the short commit identifier
const COMMIT_ID_LEN: usize = 14;

impl GitProbe {
    pub fn new(worktree: impl Into<PathBuf>) -> Self {
        Self {
            worktree: worktree.into(),
        }
    }

    fn git_output(&self, args: &[&str]) -> Option<String> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.worktree)
            .args(args)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let text = String::from_utf8(output.stdout).ok()?;
        Some(text.trim().to_string())
    }
}

impl ScmProbe for GitProbe {
    fn probe(&self) -> ScmInfo {
        let Some(full_hash) = self.git_output(&["rev-parse", "HEAD"]) else {
            return ScmInfo::default();
        };
        if full_hash.len() < COMMIT_ID_LEN {
            return ScmInfo::default();
        }
        let mut commit = full_hash[..COMMIT_ID_LEN].to_string();

        // Non-empty status output means uncommitted changes
        let dirty = self
            .git_output(&["status", "--porcelain"])
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        if dirty {
            commit.push_str("-dirty");
        }

        // Empty on a detached head
        let branch = self
            .git_output(&["branch", "--show-current"])
            .unwrap_or_default();

        ScmInfo { commit, branch }
    }
}

/// Fixed probe result, for tests and for callers that already know the
/// source-control state.
pub struct FixedProbe(pub ScmInfo);

impl ScmProbe for FixedProbe {
    fn probe(&self) -> ScmInfo {
        self.0.clone()
    }
}

/// Convenience constructor covering the common "hash + dirty flag +
/// branch" shape reported by CI wrappers.
pub fn scm_info(hash: &str, dirty: bool, branch: &str) -> ScmInfo {
    let mut commit = hash.to_string();
    if dirty && !commit.is_empty() {
        commit.push_str("-dirty");
    }
    ScmInfo {
        commit,
        branch: branch.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_probe_outside_repository_degrades_to_empty() {
        let dir = TempDir::new().unwrap();
        let info = GitProbe::new(dir.path()).probe();
        assert_eq!(info, ScmInfo::default());
    }

    #[test]
    fn test_scm_info_dirty_tagging() {
        let info = scm_info("abcdef0123456", true, "main");
        assert_eq!(info.commit, "abcdef0123456-dirty");
        assert_eq!(info.branch, "main");
    }

    #[test]
    fn test_scm_info_clean_tree() {
        let info = scm_info("abcdef0123456", false, "main");
        assert_eq!(info.commit, "abcdef0123456");
    }

    #[test]
    fn test_scm_info_empty_hash_never_tagged() {
        let info = scm_info("", true, "");
        assert_eq!(info.commit, "");
    }
}

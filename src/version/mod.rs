//! Version record synthesis
//!
//! Derives the human- and machine-readable version metadata for one
//! build from the resolved configuration, the build timestamp, and the
//! source-control state. Every source-control path degrades to a
//! defined fallback; the only hard failure is a release build reaching
//! this stage without a version, which the resolver is supposed to have
//! ruled out.

pub mod scm;

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ResolvedConfig;
use self::scm::ScmProbe;

/// Sentinel base version for development builds on unmapped branches
const UNMAPPED_BASE_VERSION: &str = "999";

/// Version and build metadata for one image.
///
/// Written verbatim to the version-metadata file and interpolated into
/// the OS-identification file; never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Synthesized or pinned version string
    pub version: String,

    /// Builder identity
    pub built_by: String,

    /// Fixed-width year-month-day-hour-minute build token
    pub built_on: String,

    /// Fresh random identifier for this build
    pub build_uuid: String,

    /// Short commit identifier, `-dirty` tagged when applicable; empty
    /// without a repository
    pub build_git: String,

    /// Active branch name; empty without a repository
    pub build_branch: String,

    /// Release train this image belongs to
    pub release_train: String,

    /// True exactly for release builds
    pub lts_build: bool,

    /// Free-form build comment
    pub build_comment: String,
}

/// Branch name to base-version mapping for development builds.
///
/// Loading is lenient: an unreadable or malformed mapping file behaves
/// like an empty one.
#[derive(Debug, Clone, Default)]
pub struct BranchMap {
    branches: HashMap<String, String>,
}

impl BranchMap {
    /// Load the mapping from a TOML file with a `[branches]` table.
    pub fn load(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        let Ok(value) = toml::from_str::<toml::Value>(&contents) else {
            return Self::default();
        };
        let branches = value
            .get("branches")
            .and_then(|v| v.as_table())
            .map(|table| {
                table
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        Self { branches }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            branches: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn base_version(&self, branch: &str) -> Option<&str> {
        self.branches.get(branch).map(|s| s.as_str())
    }
}

/// Release builds reaching synthesis without a version indicate a
/// resolver defect; surfaced instead of silently defaulted.
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("release build reached version synthesis without a version")]
    MissingReleaseVersion,
}

/// Derive the version record for one build.
pub fn synthesize(
    resolved: &ResolvedConfig,
    now: DateTime<Utc>,
    probe: &dyn ScmProbe,
    branch_map: &BranchMap,
) -> Result<VersionRecord, VersionError> {
    let build_timestamp = now.format("%Y%m%d%H%M").to_string();
    let scm = probe.probe();

    let build_type = resolved.get_str("build_type").unwrap_or("development");
    let version = if build_type == "release" {
        let pinned = resolved.get_str("version").unwrap_or_default();
        if pinned.is_empty() {
            return Err(VersionError::MissingReleaseVersion);
        }
        pinned.to_string()
    } else {
        match branch_map.base_version(&scm.branch) {
            Some(base) => format!("{}-rolling-{}", base, build_timestamp),
            None => {
                if !scm.branch.is_empty() {
                    eprintln!(
                        "No base version mapped for branch '{}'; using placeholder",
                        scm.branch
                    );
                }
                format!("{}.{}", UNMAPPED_BASE_VERSION, build_timestamp)
            }
        }
    };

    Ok(VersionRecord {
        version,
        built_by: resolved.get_str("build_by").unwrap_or_default().to_string(),
        built_on: build_timestamp,
        build_uuid: Uuid::new_v4().to_string(),
        build_git: scm.commit,
        build_branch: scm.branch,
        release_train: resolved
            .get_str("release_train")
            .unwrap_or_default()
            .to_string(),
        lts_build: build_type == "release",
        build_comment: resolved
            .get_str("build_comment")
            .unwrap_or_default()
            .to_string(),
    })
}

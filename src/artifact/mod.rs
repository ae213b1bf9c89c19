//! Artifact compilation
//!
//! Renders the resolved configuration and version record into the
//! concrete artifacts the external image build tool consumes: the
//! package list, APT archive entries and keys, the release pin, the
//! embedded filesystem includes, the OS-identification and version
//! files, and the single templated configure command. Planning is a
//! pure step; a separate writer materializes the plan under the build
//! directory.

mod template;

pub use template::render;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::error::BuildError;
use crate::version::VersionRecord;

/// Fixed configure-command template for the external build tool. Every
/// `{field}` must exist in the resolved configuration.
const CONFIGURE_TEMPLATE: &str = concat!(
    "lb config noauto",
    " --architecture {architecture}",
    " --bootappend-live \"boot=live components quiet\"",
    " --linux-flavours {kernel_flavor}",
    " --linux-packages linux-image-{kernel_version}",
    " --bootloaders {bootloaders}",
    " --distribution {debian_distribution}",
    " --mirror-bootstrap {debian_mirror}",
    " --mirror-chroot {debian_mirror}",
    " --mirror-chroot-security {debian_security_mirror}",
    " --mirror-binary {debian_mirror}",
    " --mirror-binary-security {debian_security_mirror}",
    " --archive-areas \"main contrib non-free non-free-firmware\"",
    " --iso-publisher \"{build_by}\"",
    " --firmware-chroot false",
    " --updates true",
    " --security true",
    " --backports true",
    " --apt-recommends false",
);

/// One rendered artifact: a build-directory-relative path and its
/// literal content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub content: String,
}

/// The complete set of artifact writes plus the configure command.
///
/// Deterministic for identical inputs except for the UUID already
/// embedded in the version record.
#[derive(Debug, Clone)]
pub struct ArtifactPlan {
    /// Files to write, build-directory relative
    pub files: Vec<ArtifactFile>,

    /// APT key files to copy into the archives directory
    pub key_copies: Vec<PathBuf>,

    /// Fully substituted external-tool configure command
    pub configure_command: String,
}

/// Compile the resolved configuration into an artifact plan.
pub fn compile(
    resolved: &ResolvedConfig,
    record: &VersionRecord,
) -> Result<ArtifactPlan, BuildError> {
    let mut files = Vec::new();

    // Package list: order-preserving, no de-duplication; duplicates are
    // the profile author's responsibility
    let packages = resolved.get_str_seq("packages");
    files.push(ArtifactFile {
        path: PathBuf::from("config/package-lists/debfab.list.chroot"),
        content: join_lines(&packages),
    });

    // Custom APT entries, one blob when any are configured
    let apt_entries = resolved.get_str_seq("custom_apt_entry");
    if !apt_entries.is_empty() {
        files.push(ArtifactFile {
            path: PathBuf::from("config/archives/custom.list.chroot"),
            content: join_lines(&apt_entries),
        });
    }

    // Release pin, parameterized by the release train
    let release_train = resolved.get_str("release_train").unwrap_or_default();
    files.push(ArtifactFile {
        path: PathBuf::from("config/archives/release.pref.chroot"),
        content: format!(
            "Package: *\nPin: release n={}\nPin-Priority: 600\n",
            release_train
        ),
    });

    // Embedded filesystem includes from the configuration
    for include in resolved
        .get("includes_chroot")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
    {
        files.push(include_file(include)?);
    }

    // OS identification, version metadata, and the legacy version file
    files.push(ArtifactFile {
        path: PathBuf::from("config/includes.chroot/etc/os-release"),
        content: os_release(record),
    });
    files.push(ArtifactFile {
        path: PathBuf::from("config/includes.chroot/usr/share/debfab/version.json"),
        content: serde_json::to_string_pretty(record)?,
    });
    files.push(ArtifactFile {
        path: PathBuf::from("config/includes.chroot/usr/share/debfab/version"),
        content: legacy_version(record),
    });

    let key_copies = resolved
        .get_str_seq("custom_apt_key")
        .into_iter()
        .map(PathBuf::from)
        .collect();

    let configure_command = render(CONFIGURE_TEMPLATE, resolved.document())?;

    Ok(ArtifactPlan {
        files,
        key_copies,
        configure_command,
    })
}

/// Materialize a plan under `build_dir`.
///
/// Creates parent directories as needed and copies APT keys into the
/// archives directory with a `.key.chroot` suffix.
pub fn write_plan(plan: &ArtifactPlan, build_dir: &Path) -> Result<(), BuildError> {
    for file in &plan.files {
        let dest = build_dir.join(&file.path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &file.content)?;
    }

    for key in &plan.key_copies {
        let name = key
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("custom");
        let dest = build_dir.join(format!("config/archives/{}.key.chroot", name));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(key, &dest)?;
    }

    Ok(())
}

fn join_lines(items: &[String]) -> String {
    let mut blob = items.join("\n");
    if !blob.is_empty() {
        blob.push('\n');
    }
    blob
}

fn include_file(include: &Value) -> Result<ArtifactFile, BuildError> {
    let path = include
        .get("path")
        .and_then(|v| v.as_str())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            BuildError::ConfigParse("includes_chroot entry without a path".to_string())
        })?;
    let content = include
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    Ok(ArtifactFile {
        path: Path::new("config/includes.chroot").join(path.trim_start_matches('/')),
        content: content.to_string(),
    })
}

fn os_release(record: &VersionRecord) -> String {
    format!(
        concat!(
            "PRETTY_NAME=\"DebFab {version} ({train})\"\n",
            "NAME=\"DebFab\"\n",
            "ID=debfab\n",
            "VERSION_ID=\"{version}\"\n",
            "VERSION=\"{version} ({train})\"\n",
            "BUILD_ID=\"{uuid}\"\n",
        ),
        version = record.version,
        train = record.release_train,
        uuid = record.build_uuid,
    )
}

fn legacy_version(record: &VersionRecord) -> String {
    format!(
        concat!(
            "Version:  {}\n",
            "Built by: {}\n",
            "Built on: {}\n",
            "Build UUID: {}\n",
            "Build commit: {}\n",
        ),
        record.version, record.built_by, record.built_on, record.build_uuid, record.build_git,
    )
}

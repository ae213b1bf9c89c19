//! Build error taxonomy
//!
//! All configuration and validation failures are fatal and surface
//! before any file-system mutation or external invocation. The one
//! best-effort exception, the source-control probe, never produces an
//! error at all (see `version::scm`).

use std::io;

use thiserror::Error;

/// Fatal errors for the build pipeline
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no {kind} profile named '{name}'")]
    ConfigNotFound { kind: String, name: String },

    #[error("malformed profile document: {0}")]
    ConfigParse(String),

    #[error("invalid value for option '{option}': {value}")]
    Validation { option: String, value: String },

    #[error("invalid option combination: {0}")]
    InvalidOptionCombination(String),

    #[error("no flavor given; available flavors: {}", .available.join(", "))]
    MissingFlavor { available: Vec<String> },

    #[error("configuration is missing template field '{0}'")]
    TemplateFieldMissing(String),

    #[error("image build requires root privileges")]
    NotPrivileged,

    #[error("build tool exited with status {status}")]
    ExternalTool { status: i32 },

    #[error(transparent)]
    Version(#[from] crate::version::VersionError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BuildError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::ConfigNotFound { .. } => 2,
            BuildError::ConfigParse(_) => 2,
            BuildError::Validation { .. } => 3,
            BuildError::InvalidOptionCombination(_) => 3,
            BuildError::MissingFlavor { .. } => 4,
            BuildError::TemplateFieldMissing(_) => 5,
            BuildError::NotPrivileged => 77,
            BuildError::ExternalTool { status } => *status,
            BuildError::Version(_) => 3,
            BuildError::Io(_) => 1,
            BuildError::Json(_) => 1,
        }
    }
}

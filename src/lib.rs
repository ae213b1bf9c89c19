//! debfab - layered build-spec resolver and image build driver
//!
//! Resolves a final, internally-consistent build specification for a
//! Debian-based OS image from layered configuration sources (registry
//! defaults, build-type profile, architecture profile, flavor profile,
//! CLI overrides), then compiles that specification into the artifacts
//! the external live-build toolchain needs: the package list, APT
//! archive entries and pins, the version metadata, and the single
//! templated configure command.

pub mod artifact;
pub mod config;
pub mod error;
pub mod version;

pub use artifact::{compile, write_plan, ArtifactFile, ArtifactPlan};
pub use config::{resolve, LayerKind, LayerStore, ResolvedConfig};
pub use error::BuildError;
pub use version::{synthesize, BranchMap, VersionRecord};

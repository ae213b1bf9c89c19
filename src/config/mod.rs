//! Configuration resolution system
//!
//! Implements the layered configuration merge:
//! 1. Registry defaults (static option table)
//! 2. Build-type profile (release / development)
//! 3. Architecture profile
//! 4. Flavor profile (the positional build selector)
//! 5. CLI overrides

mod loader;
mod merge;
mod options;
mod resolve;

pub use loader::{LayerKind, LayerStore, LoadedLayer};
pub use merge::{merge, merge_layers};
pub use options::{
    defaults_document, descriptor, OptionDescriptor, BUILD_TYPES, DEFAULT_DEBIAN_MIRROR,
    DEFAULT_SECURITY_MIRROR, REGISTRY, SUPPORTED_ARCHITECTURES,
};
pub use resolve::{resolve, LayerOrigin, LayerSource, ResolvedConfig};

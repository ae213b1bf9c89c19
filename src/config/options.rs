//! Build option registry (layer 1 defaults)
//!
//! A static table of option descriptors: help text, a default-value
//! provider, and an optional validator predicate. The table is
//! materialized once into the concrete defaults document that seeds
//! every layer merge.

use serde_json::{json, Value};

/// Architectures the image builder can target.
pub const SUPPORTED_ARCHITECTURES: &[&str] = &["amd64", "arm64"];

/// The two build types; everything else is rejected up front.
pub const BUILD_TYPES: &[&str] = &["release", "development"];

/// Default Debian package mirror, shared by the chroot and pbuilder
/// bootstrap options.
pub const DEFAULT_DEBIAN_MIRROR: &str = "http://deb.debian.org/debian";

/// Default Debian security mirror.
pub const DEFAULT_SECURITY_MIRROR: &str = "http://deb.debian.org/debian-security";

/// Static metadata for one build option.
///
/// Only consulted during resolver validation; descriptors are not part
/// of the resolved configuration.
pub struct OptionDescriptor {
    /// Option name in the configuration document key convention
    pub name: &'static str,

    /// User-facing help text
    pub help: &'static str,

    /// Default-value provider, evaluated once at startup
    pub default: fn() -> Value,

    /// Validator over a supplied value; `None` accepts anything
    pub validator: Option<fn(&Value) -> bool>,
}

fn is_supported_architecture(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| SUPPORTED_ARCHITECTURES.contains(&s))
        .unwrap_or(false)
}

fn is_build_type(value: &Value) -> bool {
    value
        .as_str()
        .map(|s| BUILD_TYPES.contains(&s))
        .unwrap_or(false)
}

fn is_nonempty_string(value: &Value) -> bool {
    value.as_str().map(|s| !s.is_empty()).unwrap_or(false)
}

fn empty_string() -> Value {
    Value::String(String::new())
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

fn empty_map() -> Value {
    json!({})
}

/// The option registry.
///
/// Append-semantics sequence options (`custom_apt_entry`,
/// `custom_apt_key`, `custom_package`) default to empty sequences so
/// that concatenation with lower layers is an identity when nothing is
/// supplied.
pub const REGISTRY: &[OptionDescriptor] = &[
    OptionDescriptor {
        name: "architecture",
        help: "Target CPU architecture for the image",
        default: || Value::String("amd64".to_string()),
        validator: Some(is_supported_architecture),
    },
    OptionDescriptor {
        name: "build_type",
        help: "Build type: release or development",
        default: || Value::String("development".to_string()),
        validator: Some(is_build_type),
    },
    OptionDescriptor {
        name: "build_by",
        help: "Builder identity recorded in the image metadata",
        default: || Value::String("autobuild@debfab.dev".to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "build_comment",
        help: "Free-form comment recorded in the image metadata",
        default: empty_string,
        validator: None,
    },
    OptionDescriptor {
        name: "debian_distribution",
        help: "Debian distribution codename the image is built from",
        default: || Value::String("bookworm".to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "debian_mirror",
        help: "Debian package mirror for bootstrap and chroot stages",
        default: || Value::String(DEFAULT_DEBIAN_MIRROR.to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "debian_security_mirror",
        help: "Debian security mirror",
        default: || Value::String(DEFAULT_SECURITY_MIRROR.to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "pbuilder_debian_mirror",
        help: "Debian mirror used by the pbuilder bootstrap",
        default: || Value::String(DEFAULT_DEBIAN_MIRROR.to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "kernel_version",
        help: "Kernel version baked into the image",
        default: || Value::String("6.6.92".to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "kernel_flavor",
        help: "Kernel flavor passed to the image build tool",
        default: || Value::String("generic".to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "bootloaders",
        help: "Comma-separated bootloader list",
        default: || Value::String("syslinux,grub-efi".to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "release_train",
        help: "Release train the image belongs to",
        default: || Value::String("current".to_string()),
        validator: Some(is_nonempty_string),
    },
    OptionDescriptor {
        name: "version",
        help: "Image version (release builds only)",
        default: empty_string,
        validator: None,
    },
    OptionDescriptor {
        name: "custom_apt_entry",
        help: "Additional APT source entries, appended across layers",
        default: empty_list,
        validator: None,
    },
    OptionDescriptor {
        name: "custom_apt_key",
        help: "Paths of additional APT key files, appended across layers",
        default: empty_list,
        validator: None,
    },
    OptionDescriptor {
        name: "custom_package",
        help: "Additional packages, folded into the package list",
        default: empty_list,
        validator: None,
    },
    OptionDescriptor {
        name: "packages",
        help: "Base package list, concatenated across layers",
        default: empty_list,
        validator: None,
    },
    OptionDescriptor {
        name: "architectures",
        help: "Per-architecture overrides (architecture name -> document)",
        default: empty_map,
        validator: None,
    },
    OptionDescriptor {
        name: "includes_chroot",
        help: "Files embedded into the image filesystem (path + content)",
        default: empty_list,
        validator: None,
    },
];

/// Look up a descriptor by option name.
pub fn descriptor(name: &str) -> Option<&'static OptionDescriptor> {
    REGISTRY.iter().find(|d| d.name == name)
}

/// Materialize the registry into the concrete defaults document.
pub fn defaults_document() -> Value {
    let mut map = serde_json::Map::new();
    for descriptor in REGISTRY {
        map.insert(descriptor.name.to_string(), (descriptor.default)());
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_document_covers_registry() {
        let defaults = defaults_document();
        let map = defaults.as_object().unwrap();

        assert_eq!(map.len(), REGISTRY.len());
        assert_eq!(map["architecture"], "amd64");
        assert_eq!(map["build_type"], "development");
        assert_eq!(map["debian_mirror"], DEFAULT_DEBIAN_MIRROR);
        assert_eq!(map["pbuilder_debian_mirror"], DEFAULT_DEBIAN_MIRROR);
        assert_eq!(map["custom_package"], json!([]));
        assert_eq!(map["version"], "");
    }

    #[test]
    fn test_architecture_validator() {
        let validate = descriptor("architecture").unwrap().validator.unwrap();

        assert!(validate(&json!("amd64")));
        assert!(validate(&json!("arm64")));
        assert!(!validate(&json!("riscv64")));
        assert!(!validate(&json!(42)));
    }

    #[test]
    fn test_build_type_validator() {
        let validate = descriptor("build_type").unwrap().validator.unwrap();

        assert!(validate(&json!("release")));
        assert!(validate(&json!("development")));
        assert!(!validate(&json!("nightly")));
    }

    #[test]
    fn test_unknown_option_has_no_descriptor() {
        assert!(descriptor("no_such_option").is_none());
    }

    #[test]
    fn test_version_accepts_empty_default() {
        // version has no validator; the cross-field release rule is
        // enforced by the resolver instead
        assert!(descriptor("version").unwrap().validator.is_none());
    }
}

//! Configuration resolution
//!
//! Drives the layer merge in precedence order and applies the
//! post-merge transforms. Precedence, highest to lowest: CLI overrides
//! > flavor profile > architecture profile > build-type profile >
//! registry defaults.
//!
//! Resolution is two-phase: the `build_type` and `architecture`
//! selector keys are read from defaults+CLI only, validated, and then
//! used to pick the profile layers for the full merge. A flavor cannot
//! retarget the architecture of a build.

use serde_json::Value;

use super::loader::{LayerKind, LayerStore};
use super::merge::merge;
use super::options::{self, DEFAULT_DEBIAN_MIRROR};
use crate::error::BuildError;

/// Origin of a contributing configuration layer
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerOrigin {
    Defaults,
    BuildType,
    Architecture,
    Flavor,
    Cli,
}

/// Provenance for one contributing layer
#[derive(Debug, Clone, serde::Serialize)]
pub struct LayerSource {
    pub origin: LayerOrigin,

    /// Profile name (None for defaults and CLI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// File path (None for defaults and CLI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for defaults and CLI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// The single merged configuration document driving all derivation.
///
/// Immutable once handed to the version synthesizer and artifact
/// compiler; created once per invocation and never persisted.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    document: Value,
    sources: Vec<LayerSource>,
}

impl ResolvedConfig {
    /// Wrap an already-merged document with no provenance. Intended for
    /// embedding callers that resolve layers themselves.
    pub fn from_document(document: Value) -> Self {
        Self {
            document,
            sources: Vec::new(),
        }
    }

    /// The merged document
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Contributing layers in merge order, lowest precedence first
    pub fn sources(&self) -> &[LayerSource] {
        &self.sources
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.document.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }

    /// String-sequence option as owned strings; non-string items are
    /// skipped
    pub fn get_str_seq(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pretty-printed dump of the document and its provenance
    pub fn dump(&self) -> Result<String, serde_json::Error> {
        let full = serde_json::json!({
            "config": self.document,
            "sources": self.sources,
        });
        serde_json::to_string_pretty(&full)
    }
}

/// Resolve the final configuration for one build.
///
/// `cli_overrides` must contain only options the user explicitly
/// supplied; append-semantics sequence options are passed as (possibly
/// empty) arrays, whose concatenation with lower layers is then an
/// identity when nothing was given.
pub fn resolve(
    store: &mut LayerStore,
    flavor: Option<&str>,
    cli_overrides: &Value,
) -> Result<ResolvedConfig, BuildError> {
    let defaults = options::defaults_document();

    // Phase 1: selector keys from defaults+CLI only
    let build_type = selector(&defaults, cli_overrides, "build_type")?;
    let architecture = selector(&defaults, cli_overrides, "architecture")?;

    let flavor = match flavor {
        Some(name) => name,
        None => {
            return Err(BuildError::MissingFlavor {
                available: store.available(LayerKind::Flavor),
            })
        }
    };

    // Every explicitly supplied option must pass its validator
    validate_supplied(cli_overrides)?;

    // Phase 2: full merge, lowest to highest precedence
    let build_type_layer = store.load(LayerKind::BuildType, &build_type)?;
    let architecture_layer = store.load(LayerKind::Architecture, &architecture)?;
    let flavor_layer = store.load(LayerKind::Flavor, flavor)?;

    let mut sources = vec![LayerSource {
        origin: LayerOrigin::Defaults,
        name: None,
        path: None,
        digest: None,
    }];
    let mut document = defaults;
    let flavor_name = flavor.to_string();
    for (origin, name, layer) in [
        (LayerOrigin::BuildType, &build_type, &build_type_layer),
        (LayerOrigin::Architecture, &architecture, &architecture_layer),
        (LayerOrigin::Flavor, &flavor_name, &flavor_layer),
    ] {
        document = merge(&layer.document, &document);
        sources.push(LayerSource {
            origin,
            name: Some(name.clone()),
            path: Some(layer.path.to_string_lossy().to_string()),
            digest: Some(layer.digest.clone()),
        });
    }
    document = merge(cli_overrides, &document);
    sources.push(LayerSource {
        origin: LayerOrigin::Cli,
        name: None,
        path: None,
        digest: None,
    });

    // Profile layers must not fail registry validators either
    validate_supplied(&document)?;

    fold_custom_packages(&mut document);
    inject_architecture_packages(&mut document, &architecture);
    apply_cross_field_rules(&document, cli_overrides, &build_type)?;
    apply_mirror_fallback(&mut document);

    Ok(ResolvedConfig { document, sources })
}

/// Read and validate a selector key from CLI overrides, falling back to
/// the defaults document.
fn selector(defaults: &Value, cli_overrides: &Value, key: &str) -> Result<String, BuildError> {
    let value = cli_overrides
        .get(key)
        .or_else(|| defaults.get(key))
        .cloned()
        .unwrap_or(Value::Null);

    if let Some(validate) = options::descriptor(key).and_then(|d| d.validator) {
        if !validate(&value) {
            return Err(BuildError::Validation {
                option: key.to_string(),
                value: display_value(&value),
            });
        }
    }

    Ok(value.as_str().unwrap_or_default().to_string())
}

/// Check every registry-known option in `document` against its
/// validator.
fn validate_supplied(document: &Value) -> Result<(), BuildError> {
    let Some(map) = document.as_object() else {
        return Ok(());
    };
    for (key, value) in map {
        if let Some(validate) = options::descriptor(key).and_then(|d| d.validator) {
            if !validate(value) {
                return Err(BuildError::Validation {
                    option: key.clone(),
                    value: display_value(value),
                });
            }
        }
    }
    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Transform A: fold a non-empty `custom_package` sequence onto the end
/// of `packages` and drop the key.
fn fold_custom_packages(document: &mut Value) {
    let Some(map) = document.as_object_mut() else {
        return;
    };
    let custom = match map.remove("custom_package") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return,
    };
    match map.get_mut("packages") {
        Some(Value::Array(packages)) => packages.extend(custom),
        _ => {
            map.insert("packages".to_string(), Value::Array(custom));
        }
    }
}

/// Transform B: append the current architecture's conditional packages
/// to the top-level package list.
fn inject_architecture_packages(document: &mut Value, architecture: &str) {
    let conditional = document
        .get("architectures")
        .and_then(|archs| archs.get(architecture))
        .and_then(|entry| entry.get("packages"))
        .and_then(|v| v.as_array())
        .cloned();
    let Some(conditional) = conditional else {
        return;
    };
    let Some(map) = document.as_object_mut() else {
        return;
    };
    match map.get_mut("packages") {
        Some(Value::Array(packages)) => packages.extend(conditional),
        _ => {
            map.insert("packages".to_string(), Value::Array(conditional));
        }
    }
}

/// Version pinning is only meaningful for release builds, and release
/// builds cannot proceed without a version.
fn apply_cross_field_rules(
    document: &Value,
    cli_overrides: &Value,
    build_type: &str,
) -> Result<(), BuildError> {
    let cli_version = cli_overrides
        .get("version")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());

    match build_type {
        "development" => {
            if cli_version.is_some() {
                return Err(BuildError::InvalidOptionCombination(
                    "a version can only be set for release builds".to_string(),
                ));
            }
        }
        _ => {
            let version = document
                .get("version")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if version.is_empty() {
                return Err(BuildError::InvalidOptionCombination(
                    "release builds require a version".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// A custom Debian mirror also becomes the pbuilder bootstrap mirror
/// unless one was set explicitly (i.e. the resolved value moved off the
/// default).
fn apply_mirror_fallback(document: &mut Value) {
    let debian_mirror = document
        .get("debian_mirror")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_DEBIAN_MIRROR)
        .to_string();
    let pbuilder_mirror = document
        .get("pbuilder_debian_mirror")
        .and_then(|v| v.as_str())
        .unwrap_or(DEFAULT_DEBIAN_MIRROR);

    if debian_mirror != DEFAULT_DEBIAN_MIRROR && pbuilder_mirror == DEFAULT_DEBIAN_MIRROR {
        if let Some(map) = document.as_object_mut() {
            map.insert(
                "pbuilder_debian_mirror".to_string(),
                Value::String(debian_mirror),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    /// Minimal on-disk data tree: empty release/development build
    /// types, amd64/arm64 architectures, one flavor.
    fn data_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (subdir, name, contents) in [
            ("build-types", "release", ""),
            ("build-types", "development", "packages = [\"gdb\"]\n"),
            ("architectures", "amd64", ""),
            ("architectures", "arm64", ""),
            (
                "flavors",
                "generic-iso",
                concat!(
                    "packages = [\"bar\"]\n",
                    "[architectures.arm64]\n",
                    "packages = [\"u-boot\"]\n",
                ),
            ),
        ] {
            let path = dir.path().join(subdir);
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join(format!("{}.toml", name)), contents).unwrap();
        }
        dir
    }

    #[test]
    fn test_resolve_defaults_only() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(&mut store, Some("generic-iso"), &json!({})).unwrap();

        assert_eq!(resolved.get_str("build_type"), Some("development"));
        assert_eq!(resolved.get_str("architecture"), Some("amd64"));
        // flavor packages over the development build-type packages
        assert_eq!(resolved.get_str_seq("packages"), vec!["bar", "gdb"]);
        assert_eq!(resolved.sources().len(), 5);
    }

    #[test]
    fn test_missing_flavor_lists_available() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let err = resolve(&mut store, None, &json!({})).unwrap_err();
        match err {
            BuildError::MissingFlavor { available } => {
                assert_eq!(available, vec!["generic-iso"]);
            }
            other => panic!("expected MissingFlavor, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_flavor_is_config_not_found() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let err = resolve(&mut store, Some("bogus"), &json!({})).unwrap_err();
        assert!(matches!(err, BuildError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_invalid_build_type_rejected() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let err = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"build_type": "nightly"}),
        )
        .unwrap_err();
        match err {
            BuildError::Validation { option, value } => {
                assert_eq!(option, "build_type");
                assert_eq!(value, "nightly");
            }
            other => panic!("expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_architecture_rejected() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let err = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"architecture": "riscv64"}),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::Validation { .. }));
    }

    #[test]
    fn test_custom_package_folding() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"custom_package": ["foo"]}),
        )
        .unwrap();

        let packages = resolved.get_str_seq("packages");
        assert_eq!(packages, vec!["bar", "gdb", "foo"]);
        assert!(resolved.get("custom_package").is_none());
    }

    #[test]
    fn test_architecture_conditional_packages_injected() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"architecture": "arm64"}),
        )
        .unwrap();
        assert!(resolved.get_str_seq("packages").contains(&"u-boot".to_string()));
    }

    #[test]
    fn test_architecture_conditional_packages_skipped_for_other_arch() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(&mut store, Some("generic-iso"), &json!({})).unwrap();
        assert!(!resolved.get_str_seq("packages").contains(&"u-boot".to_string()));
    }

    #[test]
    fn test_development_with_version_rejected() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let err = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"version": "1.5.0"}),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::InvalidOptionCombination(_)));
    }

    #[test]
    fn test_release_without_version_rejected() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let err = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"build_type": "release"}),
        )
        .unwrap_err();
        match err {
            BuildError::InvalidOptionCombination(message) => {
                assert!(message.contains("version"));
            }
            other => panic!("expected InvalidOptionCombination, got {:?}", other),
        }
    }

    #[test]
    fn test_release_with_version_resolves() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"build_type": "release", "version": "1.5.0"}),
        )
        .unwrap();
        assert_eq!(resolved.get_str("version"), Some("1.5.0"));
        assert_eq!(resolved.get_str("build_type"), Some("release"));
    }

    #[test]
    fn test_mirror_fallback_propagates_custom_mirror() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"debian_mirror": "http://custom"}),
        )
        .unwrap();
        assert_eq!(resolved.get_str("pbuilder_debian_mirror"), Some("http://custom"));
    }

    #[test]
    fn test_mirror_fallback_respects_explicit_pbuilder_mirror() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({
                "debian_mirror": "http://custom",
                "pbuilder_debian_mirror": "http://pbuilder-only"
            }),
        )
        .unwrap();
        assert_eq!(
            resolved.get_str("pbuilder_debian_mirror"),
            Some("http://pbuilder-only")
        );
    }

    #[test]
    fn test_default_mirrors_left_alone() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(&mut store, Some("generic-iso"), &json!({})).unwrap();
        assert_eq!(
            resolved.get_str("pbuilder_debian_mirror"),
            Some(DEFAULT_DEBIAN_MIRROR)
        );
    }

    #[test]
    fn test_custom_apt_sequences_concatenate_across_layers() {
        let dir = TempDir::new().unwrap();
        for (subdir, name, contents) in [
            ("build-types", "development", ""),
            ("architectures", "amd64", ""),
            (
                "flavors",
                "generic-iso",
                "custom_apt_entry = [\"deb http://flavor/repo stable main\"]\n",
            ),
        ] {
            let path = dir.path().join(subdir);
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join(format!("{}.toml", name)), contents).unwrap();
        }
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(
            &mut store,
            Some("generic-iso"),
            &json!({"custom_apt_entry": ["deb http://cli/repo stable main"]}),
        )
        .unwrap();

        // CLI entries first (higher precedence is the merge source)
        assert_eq!(
            resolved.get_str_seq("custom_apt_entry"),
            vec![
                "deb http://cli/repo stable main",
                "deb http://flavor/repo stable main"
            ]
        );
    }

    #[test]
    fn test_dump_includes_provenance() {
        let dir = data_dir();
        let mut store = LayerStore::new(dir.path());

        let resolved = resolve(&mut store, Some("generic-iso"), &json!({})).unwrap();
        let dump = resolved.dump().unwrap();
        assert!(dump.contains("\"sources\""));
        assert!(dump.contains("generic-iso"));
    }
}

//! Profile layer loading
//!
//! Reads named TOML profile documents (build types, architectures,
//! flavors) from the data directory and deserializes them into JSON
//! configuration documents. Loads are memoized per `(kind, name)`:
//! profile files are immutable for the process lifetime.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::BuildError;

/// The profile kinds a layer can be loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    BuildType,
    Architecture,
    Flavor,
}

impl LayerKind {
    /// Subdirectory of the data directory holding this kind
    pub fn subdir(&self) -> &'static str {
        match self {
            LayerKind::BuildType => "build-types",
            LayerKind::Architecture => "architectures",
            LayerKind::Flavor => "flavors",
        }
    }
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            LayerKind::BuildType => "build type",
            LayerKind::Architecture => "architecture",
            LayerKind::Flavor => "flavor",
        };
        write!(f, "{}", label)
    }
}

/// A loaded layer with its provenance.
#[derive(Debug, Clone)]
pub struct LoadedLayer {
    /// The deserialized configuration document
    pub document: Value,

    /// Path the document was read from
    pub path: PathBuf,

    /// SHA-256 digest of the raw file bytes
    pub digest: String,
}

/// Loads and caches profile layers from a data directory.
pub struct LayerStore {
    root: PathBuf,
    cache: HashMap<(LayerKind, String), LoadedLayer>,
}

impl LayerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    /// Load the named document under `kind`.
    ///
    /// Pure deserialize step: no merging, no validation. Fails with
    /// `ConfigNotFound` when no document exists for the name and
    /// `ConfigParse` on malformed TOML.
    pub fn load(&mut self, kind: LayerKind, name: &str) -> Result<LoadedLayer, BuildError> {
        let key = (kind, name.to_string());
        if let Some(layer) = self.cache.get(&key) {
            return Ok(layer.clone());
        }

        let path = self.root.join(kind.subdir()).join(format!("{}.toml", name));
        if !path.exists() {
            return Err(BuildError::ConfigNotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        }

        let layer = load_toml_file(&path)?;
        self.cache.insert(key, layer.clone());
        Ok(layer)
    }

    /// Names of all available documents under `kind`, sorted.
    ///
    /// Used to surface the available flavors when the positional flavor
    /// argument is missing or unknown.
    pub fn available(&self, kind: LayerKind) -> Vec<String> {
        let dir = self.root.join(kind.subdir());
        let mut names: Vec<String> = fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let path = e.path();
                        if path.extension().and_then(|x| x.to_str()) == Some("toml") {
                            path.file_stem()
                                .and_then(|s| s.to_str())
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Load and parse a TOML file into a JSON document with its digest.
fn load_toml_file(path: &Path) -> Result<LoadedLayer, BuildError> {
    let bytes = fs::read(path)?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes).map_err(|e| {
        BuildError::ConfigParse(format!("{}: invalid UTF-8: {}", path.display(), e))
    })?;

    let toml_value: toml::Value = toml::from_str(&contents)
        .map_err(|e| BuildError::ConfigParse(format!("{}: {}", path.display(), e)))?;

    Ok(LoadedLayer {
        document: toml_to_json(toml_value),
        path: path.to_path_buf(),
        digest,
    })
}

/// Convert a TOML value into the JSON merge currency.
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            Value::Object(map)
        }
    }
}

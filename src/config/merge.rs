//! Configuration merge logic
//!
//! Implements the layered merge with:
//! - Objects: deep-merge by key (source overrides)
//! - Arrays: CONCATENATE (source items first, no de-duplication)
//! - Scalars: source wins

use serde_json::Value;

/// Deep merge two configuration documents.
///
/// `source` is the higher-precedence layer, `destination` the lower.
/// Neither input is mutated. Merge semantics, per key of `source`:
/// - Key absent in `destination`: source value copied through
/// - Both objects: deep-merge by key (recursive, source as override)
/// - Source value is an array: `source ++ destination` (a missing
///   destination key counts as an empty array)
/// - Anything else, including type mismatches: source wins
///
/// Keys present only in `destination` pass through unchanged.
pub fn merge(source: &Value, destination: &Value) -> Value {
    match (source, destination) {
        (Value::Object(source_map), Value::Object(destination_map)) => {
            let mut result = destination_map.clone();
            for (key, source_value) in source_map {
                let merged = match (source_value, destination_map.get(key)) {
                    (Value::Object(_), Some(dest_value @ Value::Object(_))) => {
                        merge(source_value, dest_value)
                    }
                    (Value::Array(source_items), dest_value) => {
                        let mut items = source_items.clone();
                        if let Some(Value::Array(dest_items)) = dest_value {
                            items.extend(dest_items.iter().cloned());
                        }
                        Value::Array(items)
                    }
                    _ => source_value.clone(),
                };
                result.insert(key.clone(), merged);
            }
            Value::Object(result)
        }

        // Non-object roots have no keys to walk; source wins outright
        (source, _) => source.clone(),
    }
}

/// Fold config layers, lowest precedence first.
///
/// Each subsequent layer is applied as the `source` (override) against
/// the accumulator, so the last layer has the highest precedence.
pub fn merge_layers(layers: &[Value]) -> Value {
    layers
        .iter()
        .fold(Value::Object(Default::default()), |acc, layer| merge(layer, &acc))
}

//! Deep merge for layered YAML configuration.
//!
//! Higher tiers override lower tiers one field at a time. Sequences are
//! replaced whole.

use serde_json::Value;

/// Merge `overlay` onto `base`.
///
/// Objects merge key by key, recursively. A null in the overlay means
/// "not specified" and keeps the base value. Anything else in the overlay
/// replaces the base value outright.
///
/// ```
/// use serde_json::json;
/// use taskhub::config::deep_merge;
///
/// let defaults = json!({"server": {"host": "127.0.0.1", "port": 5000}});
/// let project = json!({"server": {"port": 8080}});
/// assert_eq!(
///     deep_merge(defaults, project),
///     json!({"server": {"host": "127.0.0.1", "port": 8080}})
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Fold `deep_merge` over tiers given lowest priority first.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

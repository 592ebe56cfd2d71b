//! Read-only configuration views for importables.
//!
//! An importable's effective configuration has two layers:
//!
//! | Layer | Source | Lookup |
//! |-------|--------|--------|
//! | override | `_config` object in the importable's data file | flattened key (`"a.b"`) |
//! | base | static defaults deep-merged with the guild config section | dotted path through nested objects |
//!
//! The override layer wins. Reads never mutate either layer and never fail:
//! a missing key is `None`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A snapshot of an importable's effective configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigView {
    base: Arc<Value>,
    overrides: Map<String, Value>,
}

impl ConfigView {
    pub fn new(base: Arc<Value>, overrides: Map<String, Value>) -> Self {
        Self { base, overrides }
    }

    /// Raw value at `path`, override layer first.
    pub fn get(&self, path: &str) -> Option<Value> {
        if let Some(value) = self.overrides.get(path) {
            return Some(value.clone());
        }
        follow_keys(&self.base, path).cloned()
    }

    /// Value at `path` deserialized into `T`. A value of the wrong shape
    /// reads as `None`.
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        self.get(path)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Like [`get_as`](Self::get_as) with a fallback.
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        self.get_as(path).unwrap_or(default)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.overrides.contains_key(path) || follow_keys(&self.base, path).is_some()
    }

    /// The merged base configuration without overrides.
    pub fn base(&self) -> &Value {
        &self.base
    }

    /// The base configuration deserialized into a typed struct, with the
    /// top-level overrides applied.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut value = (*self.base).clone();
        if let Value::Object(map) = &mut value {
            for (key, override_value) in &self.overrides {
                if !key.contains('.') {
                    map.insert(key.clone(), override_value.clone());
                }
            }
        }
        serde_json::from_value(value)
    }
}

/// Resolves a dotted path (`"a.b.0.c"`) through nested objects and arrays.
///
/// A key that literally contains dots is matched before splitting.
pub fn follow_keys<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    if let Some(found) = value.as_object().and_then(|map| map.get(path)) {
        return Some(found);
    }

    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Recursively merges `overlay` into `base`. Objects merge key by key;
/// any other overlay value replaces the base value.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn view(base: Value, overrides: Value) -> ConfigView {
        let overrides = match overrides {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        ConfigView::new(Arc::new(base), overrides)
    }

    #[test]
    fn test_dotted_lookup() {
        let config = view(json!({"a": {"b": 1, "list": [10, 20]}}), json!({}));
        assert_eq!(config.get("a.b"), Some(json!(1)));
        assert_eq!(config.get("a.list.1"), Some(json!(20)));
        assert_eq!(config.get("a.missing"), None);
        assert_eq!(config.get("a.b.c"), None);
    }

    #[test]
    fn test_override_wins() {
        let config = view(json!({"a": {"b": 1}}), json!({"a.b": 2}));
        assert_eq!(config.get_as::<i64>("a.b"), Some(2));
        assert_eq!(config.base()["a"]["b"], json!(1));
    }

    #[test]
    fn test_wrong_shape_reads_as_none() {
        let config = view(json!({"name": "x"}), json!({}));
        assert_eq!(config.get_as::<u32>("name"), None);
        assert_eq!(config.get_or("name", 7u32), 7);
    }

    #[test]
    fn test_deep_merge() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "keep": true});
        deep_merge(&mut base, &json!({"a": {"c": 3, "d": 4}, "new": "x"}));
        assert_eq!(
            base,
            json!({"a": {"b": 1, "c": 3, "d": 4}, "keep": true, "new": "x"})
        );
    }

    #[test]
    fn test_deserialize_with_overrides() {
        #[derive(serde::Deserialize)]
        struct Settings {
            limit: u32,
            channel: String,
        }

        let config = view(json!({"limit": 5, "channel": "c1"}), json!({"limit": 9}));
        let settings: Settings = config.deserialize().unwrap();
        assert_eq!(settings.limit, 9);
        assert_eq!(settings.channel, "c1");
    }
}

//! Plugin option merging.
//!
//! A plugin declares its default options in the manifest; the host keeps a
//! persisted overlay per plugin. [`merge`] combines both into the
//! [`EffectiveOptions`] consumed by activation and by every handler.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Flat option mapping, as declared in a manifest or persisted on disk.
pub type OptionMap = Map<String, Value>;

/// Option key that gates a plugin's command set.
pub const IS_ACTIVE: &str = "is_active";

/// Overlay `persisted` onto `defaults`.
///
/// Rules:
/// - every key of `defaults` is present in the output;
/// - a persisted value replaces the default only if it is type-compatible
///   with it (see [`type_compatible`]);
/// - keys only present in `persisted` are dropped, so removed options do
///   not resurrect.
///
/// Pure and idempotent: `merge(d, merge(d, p)) == merge(d, p)`.
pub fn merge(defaults: &OptionMap, persisted: &OptionMap) -> EffectiveOptions {
    let values = defaults
        .iter()
        .map(|(key, default)| {
            let value = match persisted.get(key) {
                Some(candidate) if type_compatible(default, candidate) => candidate.clone(),
                _ => default.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    EffectiveOptions { values }
}

/// Whether `candidate` may replace `default`.
///
/// Integers only accept integers; floats accept any number. A `null`
/// default accepts any value.
pub fn type_compatible(default: &Value, candidate: &Value) -> bool {
    match (default, candidate) {
        (Value::Null, _) => true,
        (Value::Bool(_), Value::Bool(_)) => true,
        (Value::Number(d), Value::Number(c)) => d.is_f64() || !c.is_f64(),
        (Value::String(_), Value::String(_)) => true,
        (Value::Array(_), Value::Array(_)) => true,
        (Value::Object(_), Value::Object(_)) => true,
        _ => false,
    }
}

/// The merged option set of one plugin.
///
/// Computed once at activation time; never re-merged per call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveOptions {
    values: OptionMap,
}

impl EffectiveOptions {
    /// Wrap an already-merged mapping.
    pub fn from_map(values: OptionMap) -> Self {
        Self { values }
    }

    /// `is_active` flag. Plugins that do not declare it are always active.
    pub fn is_active(&self) -> bool {
        self.bool(IS_ACTIVE).unwrap_or(true)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    /// Any number, integers included.
    pub fn f64(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(Value::as_f64)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    /// A string option that is present and not blank.
    pub fn non_empty_str(&self, key: &str) -> Option<&str> {
        self.str(key).map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn object(&self, key: &str) -> Option<&OptionMap> {
        self.values.get(key).and_then(Value::as_object)
    }

    pub fn as_map(&self) -> &OptionMap {
        &self.values
    }

    pub fn into_map(self) -> OptionMap {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> OptionMap {
        value.as_object().cloned().unwrap()
    }

    fn defaults() -> OptionMap {
        map(json!({
            "is_active": false,
            "base_url": "http://localhost:8123",
            "rate": 150,
            "volume": 0.9,
            "voice_by_call_name": {"ирина|ирины": "xenia"}
        }))
    }

    #[test]
    fn empty_persisted_yields_defaults() {
        let merged = merge(&defaults(), &OptionMap::new());
        assert_eq!(merged.as_map(), &defaults());
    }

    #[test]
    fn persisted_overrides_compatible_values() {
        let persisted = map(json!({"is_active": true, "base_url": "http://ha.local:8123"}));
        let merged = merge(&defaults(), &persisted);
        assert!(merged.is_active());
        assert_eq!(merged.str("base_url"), Some("http://ha.local:8123"));
        assert_eq!(merged.i64("rate"), Some(150));
    }

    #[test]
    fn unknown_persisted_keys_are_dropped() {
        let persisted = map(json!({"removed_option": 1, "rate": 200}));
        let merged = merge(&defaults(), &persisted);
        assert!(merged.get("removed_option").is_none());
        assert_eq!(merged.len(), defaults().len());
        assert_eq!(merged.i64("rate"), Some(200));
    }

    #[test]
    fn incompatible_types_fall_back_to_default() {
        let persisted = map(json!({
            "is_active": "yes",
            "rate": 1.5,
            "voice_by_call_name": "xenia"
        }));
        let merged = merge(&defaults(), &persisted);
        assert!(!merged.is_active());
        assert_eq!(merged.i64("rate"), Some(150));
        assert!(merged.object("voice_by_call_name").is_some());
    }

    #[test]
    fn float_default_accepts_integer() {
        let persisted = map(json!({"volume": 1}));
        let merged = merge(&defaults(), &persisted);
        assert_eq!(merged.f64("volume"), Some(1.0));
    }

    #[test]
    fn nested_mapping_is_replaced_wholesale() {
        let persisted = map(json!({"voice_by_call_name": {"николай": "aidar"}}));
        let merged = merge(&defaults(), &persisted);
        let nested = merged.object("voice_by_call_name").unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested["николай"], "aidar");
    }

    #[test]
    fn merge_is_idempotent() {
        let persisted = map(json!({
            "is_active": true,
            "rate": "fast",
            "volume": 2,
            "extra": [1, 2, 3]
        }));
        let once = merge(&defaults(), &persisted);
        let twice = merge(&defaults(), once.as_map());
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_is_active_means_active() {
        let merged = merge(&map(json!({"rate": 150})), &OptionMap::new());
        assert!(merged.is_active());
    }

    #[test]
    fn non_empty_str_ignores_blank_values() {
        let merged = merge(&map(json!({"access_token": "  "})), &OptionMap::new());
        assert_eq!(merged.non_empty_str("access_token"), None);
        assert_eq!(merged.str("access_token"), Some("  "));
    }

    #[test]
    fn null_default_accepts_anything() {
        let defaults = map(json!({"anything": null}));
        let merged = merge(&defaults, &map(json!({"anything": {"a": 1}})));
        assert_eq!(merged.get("anything"), Some(&json!({"a": 1})));
    }
}

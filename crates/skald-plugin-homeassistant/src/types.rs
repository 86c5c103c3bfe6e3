//! Home Assistant entity model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entity as returned by `GET /api/states`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// `domain.object_id`, e.g. `light.kitchen_main`.
    pub entity_id: String,

    /// Raw state string (`on`, `off`, `21.5`, `unavailable`, ...).
    pub state: String,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Entity {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// `friendly_name`, or the entity id when unset.
    pub fn display_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }

    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or_default()
    }

    pub fn unit(&self) -> &str {
        self.attributes
            .get("unit_of_measurement")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn is_on(&self) -> bool {
        self.state == "on"
    }

    /// State parsed as a number, if it is one.
    pub fn numeric_state(&self) -> Option<f64> {
        self.state.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Case-insensitive match on the display name.
    pub fn name_contains(&self, needle: &str) -> bool {
        self.display_name()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

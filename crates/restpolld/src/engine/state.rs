use std::collections::HashMap;

use serde::Serialize;

/// Attribute bag published alongside a sensor's state. Always a flat
/// JSON object so the surface can serialize it without special cases.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Last published value of a single sensor.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SensorState {
    /// Display name from configuration.
    pub name: String,

    /// State string from the most recent successful poll cycle, or
    /// `None` if the sensor has never published.
    pub state: Option<String>,

    /// Attributes from the most recent successful poll cycle.
    pub attributes: Attributes,

    /// False while the most recent poll cycle failed. The previous
    /// state and attributes are kept in that case.
    pub available: bool,

    /// Why the most recent poll cycle failed, when unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Centralized snapshot of every configured sensor's published value.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub sensors: HashMap<String, SensorState>,
}

//! Default JSON → state/attributes coercion policy.
//!
//! Applied to the response body, or to the parsed template output when a
//! template is configured. The shape of the value decides the published
//! state:
//! - array: state is the element count, the array moves under `items`
//! - object: state comes from `count`, then `total`, else `"OK"`, and
//!   the object itself becomes the attributes
//! - anything else: state is the string form, the value moves under `raw`

use serde_json::Value;

use crate::engine::Attributes;

/// Result of one successful poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedState {
    pub state: String,
    pub attributes: Attributes,
}

/// Apply the coercion policy to a JSON value
pub fn from_value(value: &Value) -> PublishedState {
    match value {
        Value::Array(items) => {
            let mut attributes = Attributes::new();
            attributes.insert("items".to_string(), Value::Array(items.clone()));
            PublishedState {
                state: items.len().to_string(),
                attributes,
            }
        }
        Value::Object(map) => {
            // Key presence decides, never truthiness: {"count": 0}
            // publishes state "0".
            let state = map
                .get("count")
                .or_else(|| map.get("total"))
                .map(scalar_to_state)
                .unwrap_or_else(|| "OK".to_string());
            PublishedState {
                state,
                attributes: map.clone(),
            }
        }
        other => {
            let mut attributes = Attributes::new();
            attributes.insert("raw".to_string(), other.clone());
            PublishedState {
                state: scalar_to_state(other),
                attributes,
            }
        }
    }
}

/// String form of a JSON value for use as a state
///
/// JSON strings publish their contents verbatim; everything else is its
/// JSON serialization (`null`, `true`, `3.5`).
fn scalar_to_state(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_array_publishes_length_and_items() {
        let published = from_value(&json!([{"id": 1}, {"id": 2}, {"id": 3}]));
        assert_eq!(published.state, "3");
        assert_eq!(
            published.attributes["items"],
            json!([{"id": 1}, {"id": 2}, {"id": 3}])
        );
        assert_eq!(published.attributes.len(), 1);
    }

    #[test]
    fn test_empty_array() {
        let published = from_value(&json!([]));
        assert_eq!(published.state, "0");
        assert_eq!(published.attributes["items"], json!([]));
    }

    #[test]
    fn test_object_without_count_or_total_is_ok() {
        let published = from_value(&json!({"temperature": 21.5, "humidity": 40}));
        assert_eq!(published.state, "OK");
        assert_eq!(published.attributes["temperature"], json!(21.5));
        assert_eq!(published.attributes["humidity"], json!(40));
    }

    #[test]
    fn test_object_total_becomes_state() {
        let published = from_value(&json!({"total": 17, "results": []}));
        assert_eq!(published.state, "17");
    }

    #[test]
    fn test_count_wins_over_total() {
        let published = from_value(&json!({"count": 5, "total": 100}));
        assert_eq!(published.state, "5");
    }

    #[test]
    fn test_falsy_count_still_wins() {
        // Presence of the key is the trigger, not its truthiness
        let published = from_value(&json!({"count": 0, "total": 9}));
        assert_eq!(published.state, "0");
    }

    #[test]
    fn test_string_count_is_verbatim() {
        let published = from_value(&json!({"count": "many"}));
        assert_eq!(published.state, "many");
    }

    #[test]
    fn test_scalar_string() {
        let published = from_value(&json!("running"));
        assert_eq!(published.state, "running");
        assert_eq!(published.attributes["raw"], json!("running"));
    }

    #[test]
    fn test_scalar_number() {
        let published = from_value(&json!(3.5));
        assert_eq!(published.state, "3.5");
        assert_eq!(published.attributes["raw"], json!(3.5));
    }

    #[test]
    fn test_scalar_bool() {
        let published = from_value(&json!(true));
        assert_eq!(published.state, "true");
    }

    #[test]
    fn test_null() {
        let published = from_value(&serde_json::Value::Null);
        assert_eq!(published.state, "null");
        assert_eq!(published.attributes["raw"], serde_json::Value::Null);
    }
}

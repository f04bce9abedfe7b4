//! Queue wire format.
//!
//! Each queue message is one JSON object:
//!
//! ```json
//! {"warehouseId":"WH-1","sensorId":"t1","type":"TEMPERATURE","value":40,"timestamp":1700000000000}
//! ```
//!
//! `warehouseId` is optional (omitted or `null`); every other field is
//! required. Unknown `type` names decode to
//! [`SensorType::Unrecognized`](crate::SensorType::Unrecognized) so that the
//! consumer can reject them with a precise reason instead of a parse error.

use thiserror::Error;

use crate::Measurement;

/// Errors converting between [`Measurement`] and its wire form.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The text is not JSON, or misses a required field.
    #[error("Invalid measurement json: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The measurement could not be rendered.
    #[error("Failed to serialize measurement: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Render a measurement as a queue message body.
pub fn to_json(measurement: &Measurement) -> Result<String, CodecError> {
    serde_json::to_string(measurement).map_err(CodecError::Serialize)
}

/// Decode a queue message body.
pub fn from_json(text: &str) -> Result<Measurement, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorType;

    #[test]
    fn test_wire_field_names() {
        let m = Measurement::new(Some("WH-1".into()), "t1", SensorType::Temperature, -4, 1_700_000_000_000);
        let value: serde_json::Value = serde_json::from_str(&to_json(&m).unwrap()).unwrap();

        assert_eq!(value["warehouseId"], "WH-1");
        assert_eq!(value["sensorId"], "t1");
        assert_eq!(value["type"], "TEMPERATURE");
        assert_eq!(value["value"], -4);
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_absent_warehouse_is_omitted() {
        let m = Measurement::new(None, "h1", SensorType::Humidity, 51, 7);
        let json = to_json(&m).unwrap();
        assert!(!json.contains("warehouseId"));
        assert_eq!(from_json(&json).unwrap().warehouse_id(), None);
    }

    #[test]
    fn test_null_warehouse_is_accepted() {
        let json = r#"{"warehouseId":null,"sensorId":"h1","type":"HUMIDITY","value":51,"timestamp":7}"#;
        let m = from_json(json).unwrap();
        assert_eq!(m.warehouse_id(), None);
        assert_eq!(m.sensor_type(), &SensorType::Humidity);
    }

    #[test]
    fn test_unknown_type_decodes_as_unrecognized() {
        let json = r#"{"sensorId":"p1","type":"PRESSURE","value":3,"timestamp":7}"#;
        let m = from_json(json).unwrap();
        assert_eq!(m.sensor_type(), &SensorType::Unrecognized("PRESSURE".into()));
        assert!(!m.is_valid());
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let json = r#"{"warehouseId":"WH-1","type":"HUMIDITY","value":51,"timestamp":7}"#;
        assert!(matches!(from_json(json), Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(from_json("not json").is_err());
        assert!(from_json(r#"{"sensorId":"t1","type":"TEMPERATURE","value":"x","timestamp":1}"#).is_err());
    }
}

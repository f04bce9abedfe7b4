//! Tolerant text-to-measurement parser.
//!
//! The canonical datagram is `sensor_id=<token>; value=<integer>`, but field
//! firmware is sloppy, so the parser accepts any ordering, stray whitespace,
//! unknown `key=value` segments and repeated keys (the last one wins).
//! Segments that do not split into a non-empty key and a non-empty value
//! around their first `=` are skipped rather than failing the payload.

use std::collections::HashMap;

use siterelay_types::{current_timestamp_ms, Measurement, SensorType};
use tracing::debug;
use uuid::Uuid;

const SENSOR_ID_KEY: &str = "sensor_id";
const VALUE_KEY: &str = "value";

/// Turns raw datagram text into [`Measurement`]s for one edge site.
#[derive(Debug, Clone)]
pub struct MeasurementParser {
    warehouse_id: String,
}

impl MeasurementParser {
    /// Create a parser stamping readings with `default_warehouse_id`.
    ///
    /// When no (or a blank) id is given a random UUID is used, so unmarked
    /// sites stay distinguishable from one another.
    pub fn new(default_warehouse_id: Option<String>) -> Self {
        let warehouse_id = default_warehouse_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self { warehouse_id }
    }

    /// The warehouse id injected into every parsed reading.
    pub fn warehouse_id(&self) -> &str {
        &self.warehouse_id
    }

    /// Parse one payload received for `sensor_type`.
    ///
    /// Returns `None` when the payload is blank, the type is absent or
    /// unrecognized, `sensor_id` or `value` is missing, or `value` is not a
    /// 32-bit signed integer. The timestamp is the current wall-clock time.
    pub fn parse(&self, payload: &str, sensor_type: Option<&SensorType>) -> Option<Measurement> {
        if payload.trim().is_empty() {
            return None;
        }
        let sensor_type = sensor_type.filter(|t| t.is_recognized())?;

        if !is_canonical(payload.trim()) {
            debug!("Parsing non-canonical payload tolerantly: {:?}", payload);
        }

        let pairs = key_values(payload);
        let sensor_id = pairs.get(SENSOR_ID_KEY)?;
        let value = pairs.get(VALUE_KEY)?.parse::<i32>().ok()?;

        Some(Measurement::new(
            Some(self.warehouse_id.clone()),
            *sensor_id,
            sensor_type.clone(),
            value,
            current_timestamp_ms(),
        ))
    }
}

/// Split `payload` into trimmed `key=value` pairs; later keys override
/// earlier ones.
fn key_values(payload: &str) -> HashMap<&str, &str> {
    payload
        .split(';')
        .filter_map(|segment| segment.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .collect()
}

/// Whether `payload` is exactly `sensor_id=<token>; value=<integer>`.
fn is_canonical(payload: &str) -> bool {
    let Some((id_part, value_part)) = payload.split_once("; ") else {
        return false;
    };

    let id_ok = id_part
        .strip_prefix("sensor_id=")
        .is_some_and(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

    let value_ok = value_part.strip_prefix("value=").is_some_and(|v| {
        let digits = v.strip_prefix('-').unwrap_or(v);
        !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
    });

    id_ok && value_ok
}

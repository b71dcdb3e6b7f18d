//! JSON payload carried on the transport topics.
//!
//! ```json
//! {"measurement": "thermal_zone",
//!  "tags": {"zone_id": "BLOCK1:OFFICEXSW:X1F"},
//!  "time": "2005-01-15T01:00:00Z",
//!  "fields": {"mean_air_temperature": 21.37}}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};

use super::event::{EventError, MeasurementEvent};
use super::family::{Family, Field};

#[derive(thiserror::Error, Debug)]
pub enum WireError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown topic '{0}'")]
    UnknownTopic(String),
    #[error("measurement '{measurement}' does not match topic '{topic}'")]
    MeasurementMismatch { topic: String, measurement: String },
    #[error("unknown field '{field}' for {family}")]
    UnknownField { family: Family, field: String },
    #[error("field '{field}' is not numeric")]
    NonNumeric { field: String },
    #[error(transparent)]
    Invalid(#[from] EventError),
}

#[derive(Debug, Serialize, Deserialize)]
struct WirePayload {
    measurement: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
    fields: BTreeMap<String, serde_json::Value>,
}

/// Serialize an event after checking it against its family's invariants.
pub fn encode_event(event: &MeasurementEvent) -> Result<Vec<u8>, WireError> {
    event.validate()?;

    let payload = WirePayload {
        measurement: event.family.measurement().to_string(),
        tags: event.tags.clone(),
        time: event.timestamp.to_offset(UtcOffset::UTC),
        fields: event
            .fields
            .iter()
            .map(|(field, value)| (field.as_str().to_string(), serde_json::Value::from(*value)))
            .collect(),
    };

    Ok(serde_json::to_vec(&payload)?)
}

/// Decode a payload delivered on `topic` into a validated event.
///
/// The family is taken from the topic and the payload's `measurement` must
/// agree with it. Field names outside the family's vocabulary and values that
/// are not JSON numbers are rejected.
pub fn decode_event(topic: &str, payload: &[u8]) -> Result<MeasurementEvent, WireError> {
    let family =
        Family::from_topic(topic).ok_or_else(|| WireError::UnknownTopic(topic.to_string()))?;
    let wire: WirePayload = serde_json::from_slice(payload)?;

    if Family::from_measurement(&wire.measurement) != Some(family) {
        return Err(WireError::MeasurementMismatch {
            topic: topic.to_string(),
            measurement: wire.measurement,
        });
    }

    let mut fields = BTreeMap::new();
    for (name, value) in wire.fields {
        let field = Field::parse_for(family, &name).ok_or_else(|| WireError::UnknownField {
            family,
            field: name.clone(),
        })?;
        let value = value.as_f64().ok_or(WireError::NonNumeric { field: name })?;
        fields.insert(field, value);
    }

    let event = MeasurementEvent {
        family,
        timestamp: wire.time.to_offset(UtcOffset::UTC),
        tags: wire.tags,
        fields,
    };
    event.validate()?;

    Ok(event)
}

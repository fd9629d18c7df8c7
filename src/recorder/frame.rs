use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::Reading;

/// Content type of every delivered payload
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// One named numeric value in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub name: String,
    pub value: f64,
}

/// Snapshot of all numeric channels at one tick, in channel order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub data: Vec<Payload>,
}

impl Frame {
    /// Keep the numeric readings, silently dropping everything else
    pub fn from_readings(readings: &[Reading]) -> Self {
        let data = readings
            .iter()
            .filter_map(|reading| match reading.value.as_f64() {
                Some(value) => Some(Payload {
                    name: reading.display_name.clone(),
                    value,
                }),
                None => {
                    tracing::trace!("Dropping non-numeric reading for {}", reading.display_name);
                    None
                }
            })
            .collect();

        Self { data }
    }

    /// Encode the frame. Non-finite values have no JSON number form and are rejected.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        if let Some(payload) = self.data.iter().find(|p| !p.value.is_finite()) {
            return Err(serde::ser::Error::custom(format!(
                "value of {} is not finite: {}",
                payload.name, payload.value
            )));
        }
        serde_json::to_vec(self)
    }
}

/// A serialized frame wrapped for delivery to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub source: String,
    pub content_type: String,
    pub timestamp_millis: i64,
    pub payload: Vec<u8>,
}

impl FrameRecord {
    pub fn new(source: &str, timestamp: DateTime<Utc>, payload: Vec<u8>) -> Self {
        Self {
            source: source.to_string(),
            content_type: JSON_CONTENT_TYPE.to_string(),
            timestamp_millis: timestamp.timestamp_millis(),
            payload,
        }
    }

    /// Decode the payload back into a frame
    pub fn frame(&self) -> Result<Frame, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

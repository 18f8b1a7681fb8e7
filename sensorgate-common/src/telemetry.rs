use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Device type reported when none is configured.
pub const DEFAULT_DEVICE_TYPE: &str = "default";

/// One cycle's worth of converted readings from a single device.
///
/// Built fresh every poll cycle, handed to the publisher and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    /// Display name of the device, as registered with the gateway.
    pub device_name: String,

    /// Gateway device type (profile).
    pub device_type: String,

    /// Field name to physical value, in descriptor order.
    pub fields: Vec<(String, f64)>,
}

impl TelemetryEnvelope {
    /// Create an envelope with no fields.
    pub fn new(device_name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            device_type: device_type.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    pub fn with_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }

    /// The record placed in the device's gateway array.
    ///
    /// ```
    /// use sensorgate_common::TelemetryEnvelope;
    ///
    /// let record = TelemetryEnvelope::new("SHT45", "default")
    ///     .with_field("temperature", 24.5)
    ///     .to_record();
    /// assert_eq!(record["deviceName"], "SHT45");
    /// assert_eq!(record["temperature"], 24.5);
    /// ```
    pub fn to_record(&self) -> Value {
        let mut record = Map::new();
        record.insert("deviceName".to_string(), json!(self.device_name));
        record.insert("deviceType".to_string(), json!(self.device_type));
        for (name, value) in &self.fields {
            record.insert(name.clone(), json!(value));
        }
        Value::Object(record)
    }
}

/// Build the multi-device gateway telemetry payload.
///
/// `{"<device>": [{...record...}], ...}`; envelopes for the same device are
/// appended to that device's array.
pub fn gateway_telemetry_payload(envelopes: &[TelemetryEnvelope]) -> Value {
    let mut payload = Map::new();
    for envelope in envelopes {
        let records = payload
            .entry(envelope.device_name.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(records) = records {
            records.push(envelope.to_record());
        }
    }
    Value::Object(payload)
}

/// Payload announcing a device to the gateway.
pub fn announce_payload(device_name: &str) -> Value {
    json!({ "device": device_name })
}

/// Payload telling the gateway a device went away.
pub fn disconnect_payload(device_name: &str) -> Value {
    json!({ "device": device_name })
}

//! Integration tests for sensorgate-common library.

use std::io::Write;

use sensorgate_common::{
    CONNECT_TOPIC, DeliveryLevel, Error, GatewayConfig, TELEMETRY_TOPIC, TelemetryEnvelope,
    announce_payload, gateway_telemetry_payload, load_config,
};
use serde::Deserialize;

#[test]
fn test_envelope_to_gateway_payload_roundtrip() {
    let envelope = TelemetryEnvelope::new("ISM303DAC Sensor", "default")
        .with_field("magneticX", 24.0)
        .with_field("magneticY", 48.0)
        .with_field("magneticZ", 72.0);

    let payload = gateway_telemetry_payload(&[envelope]);
    let bytes = serde_json::to_vec(&payload).expect("Encoding failed");
    let decoded: serde_json::Value = serde_json::from_slice(&bytes).expect("Decoding failed");

    let record = &decoded["ISM303DAC Sensor"][0];
    assert_eq!(record["deviceName"], "ISM303DAC Sensor");
    assert_eq!(record["magneticX"], 24.0);
    assert_eq!(record["magneticY"], 48.0);
    assert_eq!(record["magneticZ"], 72.0);
}

#[test]
fn test_empty_payload_is_empty_object() {
    let payload = gateway_telemetry_payload(&[]);
    assert_eq!(payload, serde_json::json!({}));
}

#[test]
fn test_negative_values_survive_encoding() {
    let envelope = TelemetryEnvelope::new("acc", "default").with_field("accelX", -0.061);
    let payload = gateway_telemetry_payload(&[envelope]);
    let text = serde_json::to_string(&payload).unwrap();
    assert!(text.contains("-0.061"));
}

#[test]
fn test_gateway_topics() {
    assert_eq!(CONNECT_TOPIC, "v1/gateway/connect");
    assert_eq!(TELEMETRY_TOPIC, "v1/gateway/telemetry");
    assert_eq!(announce_payload("x")["device"], "x");
}

#[derive(Debug, Deserialize)]
struct GatewayOnly {
    gateway: GatewayConfig,
}

#[test]
fn test_load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            // gateway on the local host
            gateway: {{ host: "localhost", port: 1883, access_token: "abc", delivery: "at_most_once" }},
        }}"#
    )
    .unwrap();

    let config: GatewayOnly = load_config(file.path()).unwrap();
    assert_eq!(config.gateway.access_token, "abc");
    assert_eq!(config.gateway.delivery, DeliveryLevel::AtMostOnce);
}

#[test]
fn test_load_config_reports_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{{ gateway: ").unwrap();

    let result: Result<GatewayOnly, Error> = load_config(file.path());
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

//! Gateway topic names.
//!
//! The bridge speaks the gateway MQTT API: one connection reports on behalf
//! of every managed device, so device identity travels in the payload rather
//! than in the topic.

/// Device connect (announce) topic.
pub const CONNECT_TOPIC: &str = "v1/gateway/connect";

/// Device disconnect topic.
pub const DISCONNECT_TOPIC: &str = "v1/gateway/disconnect";

/// Telemetry topic.
pub const TELEMETRY_TOPIC: &str = "v1/gateway/telemetry";

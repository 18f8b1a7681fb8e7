//! Sensor telemetry bridge.
//!
//! Polls I2C register sensors and serial line sensors and publishes their
//! readings to a ThingsBoard-style MQTT gateway.
//!
//! # Topics
//!
//! ```text
//! v1/gateway/connect      {"device": "<name>"}
//! v1/gateway/telemetry    {"<name>": [{"deviceName": ..., "deviceType": ..., "<field>": <value>}]}
//! v1/gateway/disconnect   {"device": "<name>"}
//! ```
//!
//! Every device is described by a [`descriptor::DeviceDefinition`]; the
//! poll loop in [`poller`] is the same for all of them.

pub mod config;
pub mod convert;
pub mod descriptor;
pub mod device;
pub mod poller;
pub mod transport;

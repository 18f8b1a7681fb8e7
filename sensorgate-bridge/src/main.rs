//! Sensor telemetry bridge.
//!
//! Polls the configured sensors and publishes their readings to the gateway.

use anyhow::{Context, Result, bail};
use clap::Parser;
use sensorgate_bridge::config::SensorBridgeConfig;
use sensorgate_bridge::device::{initialize_all, open_devices};
use sensorgate_bridge::poller::{SensorPoller, probe};
use sensorgate_bridge::transport::BusRegistry;
use sensorgate_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};

/// Ready checks per device in probe mode.
const PROBE_ATTEMPTS: usize = 10;

/// Sensor telemetry bridge (I2C / serial to MQTT gateway).
#[derive(Parser, Debug)]
#[command(name = "sensorgate-bridge")]
#[command(about = "Polls local sensors and publishes to a telemetry gateway")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    bridge: BridgeArgs,

    /// Read one sample from every device and exit without connecting to the gateway
    #[arg(long)]
    probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = SensorBridgeConfig::load(&cli.bridge.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.bridge.config))?;

    let runner = BridgeRunner::new_with_args("sensors", config, Some(&cli.bridge))?;
    tracing::info!("Loaded configuration from {:?}", cli.bridge.config);

    let sensors = runner.config().bridge.clone();
    let timing = sensors.timing();

    let mut buses = BusRegistry::new();
    let devices =
        open_devices(sensors.definitions(), &mut buses).context("Failed to open transports")?;
    tracing::info!(devices = devices.len(), buses = buses.len(), "Transports open");

    if cli.probe {
        let mut devices = initialize_all(devices, sensors.identity_policy).await?;
        let summary = probe(&mut devices, PROBE_ATTEMPTS, timing.not_ready_delay).await;
        if !summary.is_complete() {
            bail!("No sample from: {}", summary.missing.join(", "));
        }
        tracing::info!(devices = summary.sampled.len(), "Probe complete");
        return Ok(());
    }

    let devices = initialize_all(devices, sensors.identity_policy).await?;

    let publisher = runner.connect().await?;
    let mut poller = SensorPoller::new(devices, publisher, timing);
    let announced = poller.announce().await;
    tracing::info!(announced, "Sensor bridge running");

    runner
        .run(|shutdown| async move {
            poller.run(shutdown).await;
            Ok(())
        })
        .await?;

    Ok(())
}

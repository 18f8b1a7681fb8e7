//! Bridge runner for lifecycle management.

use std::future::Future;

use tokio::signal;
use tokio::sync::watch;

use sensorgate_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::mqtt::MqttSink;
use crate::publisher::Publisher;

/// Bridge runner that manages the lifecycle of a telemetry bridge.
///
/// Handles:
/// - Logging initialization
/// - Gateway connection
/// - Shutdown signalling on Ctrl+C / SIGTERM
///
/// # Example
///
/// ```ignore
/// let runner = BridgeRunner::new_with_args("sensors", config, Some(&args))?;
/// let publisher = runner.connect().await?;
/// let poller = SensorPoller::new(devices, publisher, timing);
///
/// runner
///     .run(|shutdown| async move {
///         let stats = poller.run(shutdown).await;
///         tracing::info!(published = stats.success, "Poller stopped");
///         Ok(())
///     })
///     .await
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// The loaded configuration.
    config: C,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner, initializing logging from the config.
    ///
    /// A `--log-level` in `args` overrides the configured level.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let name = name.into();

        let log_config = match args.and_then(|a| a.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                ..config.logging().clone()
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        tracing::info!(bridge = %name, version = env!("CARGO_PKG_VERSION"), "Starting bridge");

        Ok(Self { name, config })
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Connect to the gateway.
    ///
    /// There is no retry here: failing to reach the gateway at startup is fatal.
    pub async fn connect(&self) -> Result<Publisher<MqttSink>> {
        let gateway = self.config.gateway().clone();
        let delivery = gateway.delivery;
        let mut publisher = Publisher::new(MqttSink::new(gateway), delivery);

        publisher.connect().await.map_err(|e| {
            tracing::error!(bridge = %self.name, error = %e, phase = "startup", "Gateway connection failed");
            BridgeError::Sink(e)
        })?;

        Ok(publisher)
    }

    /// Run a worker until it returns.
    ///
    /// The worker receives a shutdown flag that flips to `true` on Ctrl+C or
    /// SIGTERM; it is expected to finish its current cycle, clean up and
    /// return.
    pub async fn run<F, Fut>(self, worker: F) -> Result<()>
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bridge = self.name.clone();
        let signal_task = tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            tracing::info!(bridge = %bridge, "Received shutdown signal");
            let _ = shutdown_tx.send(true);
        });

        tracing::info!(bridge = %self.name, "Bridge running. Press Ctrl+C to stop.");

        let result = worker(shutdown_rx).await;
        signal_task.abort();

        match &result {
            Ok(()) => tracing::info!(bridge = %self.name, "Goodbye!"),
            Err(e) => tracing::error!(bridge = %self.name, error = %e, "Bridge stopped with error"),
        }

        result
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        }
        _ = terminate => {}
    }
}

//! Poll-read-convert-publish loop.

use std::time::Duration;

use sensorgate_bridge_framework::{PublishStats, Publisher, ReconnectOutcome, TelemetrySink};
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::config::IdentityPolicy;
use crate::convert::RawSample;
use crate::device::{DeviceError, ManagedDevice, StartupError, initialize_all};

/// Loop cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Fixed delay after a cycle in which something happened.
    pub interval: Duration,
    /// Shorter delay when no device had data and nothing failed.
    pub not_ready_delay: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            not_ready_delay: Duration::from_millis(100),
        }
    }
}

/// What happened during one cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Devices that produced a sample.
    pub ready: usize,
    /// Envelopes handed to the sink.
    pub published: usize,
    /// Read, parse or publish failures.
    pub failed: usize,
    /// Reconnect attempts made (zero or one).
    pub reconnects: usize,
}

impl CycleReport {
    /// How long to sleep before the next cycle.
    pub fn next_delay(&self, timing: &PollTiming) -> Duration {
        if self.ready == 0 && self.failed == 0 {
            timing.not_ready_delay
        } else {
            timing.interval
        }
    }
}

/// Reconnect bookkeeping for one cycle.
#[derive(Debug, Default)]
struct CycleGateway {
    /// A reconnect was made this cycle; no further attempt until the next one.
    attempted: bool,
    /// That attempt failed; the rest of the cycle is dropped.
    down: bool,
}

impl CycleGateway {
    /// Called after every read or publish error.
    ///
    /// Reconnects only if the sink reports the connection down and no attempt
    /// has been made yet this cycle. A live connection does not use up the
    /// cycle's attempt.
    async fn after_error<S: TelemetrySink>(
        &mut self,
        publisher: &mut Publisher<S>,
        report: &mut CycleReport,
    ) {
        if self.attempted {
            return;
        }
        match publisher.reconnect_if_disconnected().await {
            ReconnectOutcome::AlreadyConnected => {}
            ReconnectOutcome::Reconnected => {
                self.attempted = true;
                report.reconnects += 1;
            }
            ReconnectOutcome::Failed => {
                self.attempted = true;
                self.down = true;
                report.reconnects += 1;
            }
        }
    }
}

/// Polls every managed device and publishes what they produce.
pub struct SensorPoller<S> {
    devices: Vec<ManagedDevice>,
    publisher: Publisher<S>,
    timing: PollTiming,
}

impl<S: TelemetrySink> SensorPoller<S> {
    pub fn new(devices: Vec<ManagedDevice>, publisher: Publisher<S>, timing: PollTiming) -> Self {
        Self {
            devices,
            publisher,
            timing,
        }
    }

    pub fn devices(&self) -> &[ManagedDevice] {
        &self.devices
    }

    pub fn timing(&self) -> PollTiming {
        self.timing
    }

    /// Verify and configure every device. Fatal on failure.
    pub async fn initialize_devices(&mut self, policy: IdentityPolicy) -> Result<(), StartupError> {
        let devices = std::mem::take(&mut self.devices);
        self.devices = initialize_all(devices, policy).await?;
        Ok(())
    }

    /// Announce every device to the gateway.
    ///
    /// Returns the number of announcements that were queued.
    pub async fn announce(&mut self) -> usize {
        let mut announced = 0;
        for device in &self.devices {
            match self.publisher.announce(device.name()).await {
                Ok(_) => announced += 1,
                Err(e) => {
                    warn!(device = %device.name(), error = %e, "Failed to announce device");
                }
            }
        }
        announced
    }

    /// Run one cycle over all devices.
    ///
    /// Each device is gated on its own ready flag. After an error, if the
    /// gateway connection is down, one reconnect is attempted (at most one per
    /// cycle); if that fails, the remaining envelopes of the cycle are
    /// dropped.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let mut gateway = CycleGateway::default();

        for device in &mut self.devices {
            let envelope = match device.poll().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => {
                    trace!(device = %device.name(), "Not ready");
                    continue;
                }
                Err(DeviceError::NoData) => {
                    debug!(device = %device.name(), "No complete sample yet");
                    continue;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(device = %device.name(), error = %e, phase = "loop", "Device read failed");
                    gateway.after_error(&mut self.publisher, &mut report).await;
                    continue;
                }
            };
            report.ready += 1;

            if gateway.down {
                report.failed += 1;
                debug!(device = %device.name(), "Gateway down, dropping envelope");
                continue;
            }

            match self.publisher.publish_envelope(&envelope).await {
                Ok(message_id) => {
                    report.published += 1;
                    info!(
                        device = %envelope.device_name,
                        message_id,
                        fields = ?envelope.fields,
                        "Published telemetry"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(device = %device.name(), error = %e, phase = "loop", "Publish failed");
                    gateway.after_error(&mut self.publisher, &mut report).await;
                }
            }
        }

        report
    }

    /// Poll until `shutdown` turns true, then disconnect.
    ///
    /// The flag is checked once per cycle, after the sleep.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PublishStats {
        info!(
            devices = self.devices.len(),
            interval_ms = self.timing.interval.as_millis() as u64,
            "Starting poll loop"
        );

        while !*shutdown.borrow() {
            let report = self.run_cycle().await;
            if report.failed > 0 {
                debug!(?report, "Cycle finished with errors");
            }

            tokio::select! {
                _ = tokio::time::sleep(report.next_delay(&self.timing)) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody can ask us to stop any more.
                        break;
                    }
                }
            }
        }

        info!("Stopping poll loop");
        let names: Vec<String> = self.devices.iter().map(|d| d.name().to_string()).collect();
        self.publisher.shutdown(names.iter().map(String::as_str)).await;

        let stats = self.publisher.stats();
        info!(
            published = stats.success,
            failed = stats.failed,
            reconnects = stats.reconnects,
            success_rate = format_args!("{:.1}%", stats.success_rate()),
            "Poll loop stopped"
        );
        stats
    }
}

/// Outcome of a probe run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeSummary {
    /// Devices that produced a sample.
    pub sampled: Vec<String>,
    /// Devices that never became ready or failed to read.
    pub missing: Vec<String>,
}

impl ProbeSummary {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Read one sample from each device without touching the gateway.
///
/// Each device is given `attempts` ready checks, `delay` apart.
pub async fn probe(devices: &mut [ManagedDevice], attempts: usize, delay: Duration) -> ProbeSummary {
    let mut summary = ProbeSummary::default();

    for device in devices.iter_mut() {
        match probe_device(device, attempts, delay).await {
            Ok(Some(sample)) => {
                let envelope = device.envelope(&sample);
                match &sample {
                    RawSample::Codes(codes) => {
                        info!(device = %device.name(), ?codes, fields = ?envelope.fields, "Probe sample");
                    }
                    RawSample::Values(values) => {
                        info!(device = %device.name(), ?values, fields = ?envelope.fields, "Probe sample");
                    }
                }
                summary.sampled.push(device.name().to_string());
            }
            Ok(None) => {
                warn!(device = %device.name(), attempts, "Device never reported data ready");
                summary.missing.push(device.name().to_string());
            }
            Err(e) => {
                error!(device = %device.name(), error = %e, "Probe read failed");
                summary.missing.push(device.name().to_string());
            }
        }
    }

    summary
}

async fn probe_device(
    device: &mut ManagedDevice,
    attempts: usize,
    delay: Duration,
) -> Result<Option<RawSample>, DeviceError> {
    for attempt in 0..attempts {
        match device.read_if_ready().await {
            Ok(Some(sample)) => return Ok(Some(sample)),
            Ok(None) | Err(DeviceError::NoData) => {
                trace!(device = %device.name(), attempt, "Not ready");
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(delay).await;
    }
    Ok(None)
}

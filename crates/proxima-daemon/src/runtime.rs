//! The daemon main loop.
//!
//! Three `tokio::time` intervals drive the core: scan polls the
//! [`ScanSource`] and ingests the batch, evaluation sweeps and runs the
//! state machine, and status writes the snapshot for the external reporter.
//! The loop ends on the shutdown signal or when the source is exhausted;
//! either way every alert is stopped and a final status is written.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use proxima_core::{
    AlertEvent, Millis, ProximaError, ScanError, ScanSettings, ScanSource, StatusSnapshot,
};
use serde::Serialize;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// Default period between status file writes.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(1);

/// Monotonic millisecond clock starting at zero.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    /// Start the clock now.
    #[must_use]
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds since the clock started.
    #[must_use]
    pub fn now(&self) -> Millis {
        Millis::try_from(self.origin.elapsed().as_millis()).unwrap_or(Millis::MAX)
    }
}

/// Loop cadence and outputs.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Period between scan polls.
    pub scan_interval: Duration,
    /// Period between evaluations.
    pub evaluation_interval: Duration,
    /// Period between status writes.
    pub status_interval: Duration,
    /// Where to write the status snapshot, if anywhere.
    pub status_path: Option<PathBuf>,
}

impl RuntimeOptions {
    /// Options from the configured scan settings.
    #[must_use]
    pub fn from_settings(settings: &ScanSettings, status_path: Option<PathBuf>) -> Self {
        Self {
            scan_interval: Duration::from_millis(settings.scan_interval_ms),
            evaluation_interval: Duration::from_millis(settings.evaluation_interval_ms),
            status_interval: DEFAULT_STATUS_INTERVAL,
            status_path,
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Non-empty scan batches ingested.
    pub batches: u64,
    /// Observations ingested.
    pub observations: u64,
    /// Alert events produced.
    pub events: u64,
    /// Alerts started.
    pub activations: u64,
    /// Status files written.
    pub status_writes: u64,
}

impl RunSummary {
    fn record(&mut self, events: &[AlertEvent]) {
        self.events += events.len() as u64;
        self.activations += events
            .iter()
            .filter(|e| matches!(e, AlertEvent::Activated { .. }))
            .count() as u64;
    }
}

#[derive(Serialize)]
struct StatusFile<'a> {
    written_at: DateTime<Utc>,
    #[serde(flatten)]
    snapshot: &'a StatusSnapshot,
}

/// Write `snapshot` as JSON to `path`, replacing it atomically.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub async fn write_status(path: &Path, snapshot: &StatusSnapshot) -> anyhow::Result<()> {
    let body = serde_json::to_vec_pretty(&StatusFile {
        written_at: Utc::now(),
        snapshot,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

/// Run the loop until `shutdown` resolves or `source` is exhausted.
///
/// # Errors
///
/// Returns an error if the scan source fails permanently. Alerts are
/// stopped before returning.
pub async fn run<S, F>(
    state: AppState,
    mut source: S,
    clock: Clock,
    options: RuntimeOptions,
    shutdown: F,
) -> anyhow::Result<RunSummary>
where
    S: ScanSource + Send,
    F: Future<Output = ()>,
{
    let mut scan = interval(options.scan_interval);
    scan.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut evaluate = interval(options.evaluation_interval);
    evaluate.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = interval(options.status_interval);
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tokio::pin!(shutdown);
    let mut summary = RunSummary::default();

    info!(
        scan_ms = options.scan_interval.as_millis(),
        evaluation_ms = options.evaluation_interval.as_millis(),
        status = ?options.status_path,
        "Runtime started"
    );

    let outcome: anyhow::Result<()> = loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown requested");
                break Ok(());
            }
            _ = scan.tick() => match source.next_batch(clock.now()) {
                Ok(batch) if batch.is_empty() => {}
                Ok(batch) => {
                    debug!(observations = batch.len(), "Scan batch");
                    summary.batches += 1;
                    summary.observations += batch.len() as u64;
                    state.ingest(batch).await;
                }
                Err(ScanError::Exhausted) => {
                    info!("Scan source exhausted");
                    let events = state.tick(clock.now()).await;
                    summary.record(&events);
                    break Ok(());
                }
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "Scan poll failed");
                }
                Err(err) => {
                    let err = ProximaError::from(err);
                    error!(error = %err, code = err.error_code(), "Scan source failed");
                    break Err(err.into());
                }
            },
            _ = evaluate.tick() => {
                let events = state.tick(clock.now()).await;
                summary.record(&events);
            }
            _ = status.tick(), if options.status_path.is_some() => {
                if let Some(path) = &options.status_path {
                    let snapshot = state.snapshot(clock.now()).await;
                    match write_status(path, &snapshot).await {
                        Ok(()) => summary.status_writes += 1,
                        Err(e) => warn!(error = %e, "Status write failed"),
                    }
                }
            }
        }
    };

    let now = clock.now();
    let events = state.stop_all(now).await;
    summary.record(&events);
    if let Some(path) = &options.status_path {
        let snapshot = state.snapshot(now).await;
        match write_status(path, &snapshot).await {
            Ok(()) => summary.status_writes += 1,
            Err(e) => warn!(error = %e, "Final status write failed"),
        }
    }

    info!(
        batches = summary.batches,
        observations = summary.observations,
        activations = summary.activations,
        "Runtime stopped"
    );
    outcome.map(|()| summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{channel, ReplaySource};
    use proxima_core::{
        BeaconEntry, BeaconObservation, Config, DistanceEstimator, ProximityConfig,
        RecordingDriver, ScanResult,
    };

    fn config() -> Config {
        let mut config = Config::default();
        config.scan.filter_window = 1;
        config.scan.scan_interval_ms = 250;
        config.scan.evaluation_interval_ms = 500;
        config.beacons = vec![BeaconEntry::new(
            "B1",
            ProximityConfig {
                trigger_distance_cm: 10.0,
                cooldown_period_ms: 3_000,
                alert_duration_ms: 2_000,
                ..ProximityConfig::default()
            },
        )];
        config
    }

    fn approach_trace() -> ReplaySource {
        let estimator = DistanceEstimator::default();
        let observations = [(0, 15.0), (500, 15.0), (1_000, 8.0), (1_500, 8.0), (2_000, 8.0), (2_500, 8.0)]
            .into_iter()
            .map(|(at, cm)| {
                #[allow(clippy::cast_possible_truncation)]
                let rssi = estimator.signal_for_distance(cm).round() as i16;
                BeaconObservation::new("B1", rssi, at)
            })
            .collect();
        ReplaySource::new(observations)
    }

    fn state(config: &Config) -> AppState {
        AppState::new(config, Box::new(RecordingDriver::new())).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_runs_to_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let status_path = dir.path().join("status").join("proxima.json");
        let config = config();
        let options = RuntimeOptions::from_settings(&config.scan, Some(status_path.clone()));

        let summary = run(
            state(&config),
            approach_trace(),
            Clock::start(),
            options,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(summary.observations, 6);
        assert_eq!(summary.activations, 1);
        assert!(summary.status_writes >= 1);

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&status_path).unwrap()).unwrap();
        assert!(written.get("written_at").is_some());
        assert_eq!(written["proximity"][0]["identity"], "B1");
        assert_eq!(written["proximity"][0]["alert_active"], false);
        assert!(!status_path.with_extension("json.tmp").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_stops_live_loop() {
        let config = config();
        let (sender, source) = channel(16);
        let shutdown = tokio::time::sleep(Duration::from_secs(3));

        let summary = run(
            state(&config),
            source,
            Clock::start(),
            RuntimeOptions::from_settings(&config.scan, None),
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(summary.observations, 0);
        assert_eq!(summary.status_writes, 0);
        drop(sender);
    }

    struct DeadAdapter;

    impl ScanSource for DeadAdapter {
        fn next_batch(&mut self, _now: Millis) -> ScanResult<Vec<BeaconObservation>> {
            Err(ScanError::AdapterUnavailable {
                message: "hci0 missing".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_scan_failure_is_an_error() {
        let config = config();
        let result = run(
            state(&config),
            DeadAdapter,
            Clock::start(),
            RuntimeOptions::from_settings(&config.scan, None),
            std::future::pending(),
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("hci0 missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_follows_tokio_time() {
        let clock = Clock::start();
        tokio::time::advance(Duration::from_millis(1_250)).await;
        assert_eq!(clock.now(), 1_250);
    }
}

//! Scan sources for the daemon.
//!
//! - [`ReplaySource`] replays a recorded JSON-lines trace of observations,
//!   honouring their timestamps against the daemon clock.
//! - [`ChannelSource`] receives live observations pushed from a scanner
//!   callback through an [`ObservationSender`].
//!
//! Trace format, one observation per line (`#` comments and blank lines
//! are skipped):
//!
//! ```text
//! {"identity":"AA:BB:CC:DD:EE:01","name":"PetZone-Home-01","raw_signal":-58,"observed_at":1500}
//! ```

use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;

use proxima_core::{BeaconObservation, Millis, ScanError, ScanResult, ScanSettings, ScanSource};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, info, warn};

use crate::runtime::Clock;

// =============================================================================
// REPLAY
// =============================================================================

/// Finite source replaying recorded observations in timestamp order.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    pending: VecDeque<BeaconObservation>,
}

impl ReplaySource {
    /// Replay the given observations. They are ordered by `observed_at`;
    /// ties keep their given order.
    #[must_use]
    pub fn new(mut observations: Vec<BeaconObservation>) -> Self {
        observations.sort_by_key(|o| o.observed_at);
        Self {
            pending: observations.into(),
        }
    }

    /// Parse a JSON-lines trace.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidRecord`] for the first line that does not
    /// decode, or [`ScanError::ScanFailed`] if reading fails.
    pub fn from_reader(reader: impl BufRead) -> ScanResult<Self> {
        let mut observations = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| ScanError::ScanFailed {
                message: e.to_string(),
            })?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let observation = serde_json::from_str::<BeaconObservation>(line).map_err(|e| {
                ScanError::InvalidRecord {
                    line: index + 1,
                    message: e.to_string(),
                }
            })?;
            observations.push(observation);
        }
        Ok(Self::new(observations))
    }

    /// Open and parse a trace file.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::AdapterUnavailable`] if the file cannot be
    /// opened, otherwise as [`from_reader`](Self::from_reader).
    pub fn from_path(path: impl AsRef<Path>) -> ScanResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| ScanError::AdapterUnavailable {
            message: format!("cannot open trace {}: {e}", path.display()),
        })?;
        let source = Self::from_reader(std::io::BufReader::new(file))?;
        info!(
            path = %path.display(),
            observations = source.remaining(),
            "Replay trace loaded"
        );
        Ok(source)
    }

    /// Observations not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl ScanSource for ReplaySource {
    fn next_batch(&mut self, now: Millis) -> ScanResult<Vec<BeaconObservation>> {
        if self.pending.is_empty() {
            return Err(ScanError::Exhausted);
        }
        let due = self
            .pending
            .iter()
            .take_while(|o| o.observed_at <= now)
            .count();
        Ok(self.pending.drain(..due).collect())
    }
}

// =============================================================================
// LIVE CHANNEL
// =============================================================================

/// Observations that may queue between polls per registry slot.
const QUEUE_SLOTS_PER_BEACON: usize = 8;

/// Live queue size for the configured registry capacity.
#[must_use]
pub const fn queue_capacity(settings: &ScanSettings) -> usize {
    settings.registry_capacity.saturating_mul(QUEUE_SLOTS_PER_BEACON)
}

/// Create a bounded channel between a scanner callback and the scan loop.
///
/// `capacity` bounds how many observations may wait between two polls;
/// further sends are dropped.
#[must_use]
pub fn channel(capacity: usize) -> (ObservationSender, ChannelSource) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ObservationSender { tx }, ChannelSource { rx })
}

/// Sending half handed to the scanner.
#[derive(Debug, Clone)]
pub struct ObservationSender {
    tx: mpsc::Sender<BeaconObservation>,
}

impl ObservationSender {
    /// Queue an observation without blocking. Returns `false` if it was
    /// dropped because the queue is full or the loop has stopped.
    pub fn send(&self, observation: BeaconObservation) -> bool {
        match self.tx.try_send(observation) {
            Ok(()) => true,
            Err(TrySendError::Full(observation)) => {
                debug!(identity = %observation.identity, "Scan queue full, dropping observation");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Turn the sender into a plain callback for scanner APIs.
    pub fn into_callback(self) -> impl FnMut(BeaconObservation) + Send + 'static {
        move |observation| {
            self.send(observation);
        }
    }
}

/// Receiving half polled by the scan loop. Exhausted once every sender is
/// dropped and the queue is empty.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<BeaconObservation>,
}

impl ScanSource for ChannelSource {
    fn next_batch(&mut self, _now: Millis) -> ScanResult<Vec<BeaconObservation>> {
        let mut batch = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(observation) => batch.push(observation),
                Err(TryRecvError::Empty) => return Ok(batch),
                Err(TryRecvError::Disconnected) if batch.is_empty() => {
                    return Err(ScanError::Exhausted)
                }
                Err(TryRecvError::Disconnected) => return Ok(batch),
            }
        }
    }
}

/// A live sighting without a timestamp; stamped on arrival.
#[derive(Debug, Deserialize)]
struct LiveRecord {
    identity: String,
    #[serde(default)]
    name: Option<String>,
    raw_signal: i16,
}

/// Feed JSON-lines sightings from `input` (e.g. a scanner piped into stdin)
/// into `sender`, stamping each with the daemon clock.
///
/// Returns when `input` ends. Malformed lines are logged and skipped.
pub async fn feed_lines<R>(input: R, sender: ObservationSender, clock: Clock)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut line_number = 0usize;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Scan input failed");
                break;
            }
        };
        line_number += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<LiveRecord>(line) {
            Ok(record) => {
                let mut observation =
                    BeaconObservation::new(record.identity, record.raw_signal, clock.now());
                observation.name = record.name;
                sender.send(observation);
            }
            Err(e) => warn!(line = line_number, error = %e, "Skipping malformed sighting"),
        }
    }
    info!(lines = line_number, "Scan input closed");
}

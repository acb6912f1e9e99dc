//! Bounded registry of observed beacons.
//!
//! The registry is the single owner of every [`BeaconRecord`] and of the
//! per-beacon [`SignalFilter`]. It holds at most `capacity` records; when a
//! new identity arrives at capacity the least-recently-seen *inactive*
//! record is evicted, and if every record is still active the observation is
//! dropped. Dropping is the normal bounded-resource policy under a crowded
//! radio environment, so it is counted rather than reported as an error.
//!
//! A beacon that reappears after being swept inactive starts a fresh
//! moving average; samples from before the gap are discarded.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::distance::{confidence, DistanceEstimator};
use crate::filter::{SignalFilter, DEFAULT_FILTER_WINDOW};
use crate::types::{elapsed, BeaconObservation, Millis};

/// Default maximum number of tracked beacons.
pub const DEFAULT_REGISTRY_CAPACITY: usize = 20;

/// Default age after which a beacon is considered gone.
pub const DEFAULT_LIVENESS_WINDOW_MS: Millis = 10_000;

/// Last known state of one beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconRecord {
    /// Identity key from the observation.
    pub identity: String,

    /// Most recent advertised name, if any.
    pub name: Option<String>,

    /// Most recent unfiltered reading, in dBm.
    pub last_raw_signal: i16,

    /// Moving-average RSSI.
    pub filtered_signal: f32,

    /// Distance derived from `filtered_signal`, in centimetres.
    pub estimated_distance_cm: f32,

    /// Signal-strength confidence in `0.0..=1.0`.
    pub confidence: f32,

    /// False while the filter is still filling; readings are provisional.
    pub stable: bool,

    /// First observation time.
    pub first_seen: Millis,

    /// Latest observation time.
    pub last_seen: Millis,

    /// Whether the beacon was seen within the liveness window.
    pub is_active: bool,
}

/// What [`BeaconRegistry::ingest`] did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new record was created.
    Created,
    /// An existing record was updated.
    Updated,
    /// A new record was created after evicting an inactive one.
    CreatedWithEviction,
    /// The registry was full of active beacons; the observation was ignored.
    Dropped,
}

/// Records touched by a [`BeaconRegistry::sweep`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Identities that went from active to inactive.
    pub expired: Vec<String>,
    /// Identities removed to get back under capacity.
    pub evicted: Vec<String>,
}

/// Running counters for the status snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Observations applied to a record.
    pub observations: u64,
    /// Observations ignored because the registry was full.
    pub dropped: u64,
    /// Records evicted to make room.
    pub evicted: u64,
}

#[derive(Debug, Clone)]
struct Entry {
    record: BeaconRecord,
    filter: SignalFilter,
}

/// Map of identity to beacon state with an enforced capacity.
#[derive(Debug, Clone)]
pub struct BeaconRegistry {
    entries: HashMap<String, Entry>,
    capacity: usize,
    filter_window: usize,
    estimator: DistanceEstimator,
    stats: RegistryStats,
}

impl BeaconRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(capacity: usize, filter_window: usize, estimator: DistanceEstimator) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            filter_window,
            estimator,
            stats: RegistryStats::default(),
        }
    }

    /// Apply one observation.
    ///
    /// Never fails; see [`IngestOutcome`] for what happened.
    pub fn ingest(&mut self, observation: BeaconObservation) -> IngestOutcome {
        let BeaconObservation {
            identity,
            name,
            raw_signal,
            observed_at,
        } = observation;

        if let Some(entry) = self.entries.get_mut(&identity) {
            if !entry.record.is_active {
                debug!(identity = %entry.record.identity, "Beacon reappeared");
                entry.filter.reset();
            }
            let filtered = entry.filter.add_sample(raw_signal);
            let record = &mut entry.record;
            if name.is_some() {
                record.name = name;
            }
            record.last_raw_signal = raw_signal;
            Self::refresh(record, &self.estimator, &entry.filter, filtered);
            record.last_seen = record.last_seen.max(observed_at);
            record.is_active = true;
            self.stats.observations += 1;
            return IngestOutcome::Updated;
        }

        let mut outcome = IngestOutcome::Created;
        if self.entries.len() >= self.capacity {
            match self.oldest_inactive() {
                Some(victim) => {
                    self.evict(&victim);
                    outcome = IngestOutcome::CreatedWithEviction;
                }
                None => {
                    self.stats.dropped += 1;
                    debug!(
                        identity = %identity,
                        capacity = self.capacity,
                        "Registry full of active beacons, dropping observation"
                    );
                    return IngestOutcome::Dropped;
                }
            }
        }

        let mut filter = SignalFilter::new(self.filter_window);
        filter.reset();
        let filtered = filter.add_sample(raw_signal);
        let mut record = BeaconRecord {
            identity: identity.clone(),
            name,
            last_raw_signal: raw_signal,
            filtered_signal: filtered,
            estimated_distance_cm: 0.0,
            confidence: 0.0,
            stable: false,
            first_seen: observed_at,
            last_seen: observed_at,
            is_active: true,
        };
        Self::refresh(&mut record, &self.estimator, &filter, filtered);

        info!(
            identity = %identity,
            rssi = raw_signal,
            distance_cm = record.estimated_distance_cm,
            "New beacon"
        );
        self.entries.insert(identity, Entry { record, filter });
        self.stats.observations += 1;
        outcome
    }

    /// Mark beacons not seen within `liveness_window_ms` of `now` inactive,
    /// then evict the oldest inactive records while over capacity.
    ///
    /// Inactive records are otherwise retained so their last known state
    /// stays queryable.
    pub fn sweep(&mut self, now: Millis, liveness_window_ms: Millis) -> SweepReport {
        let mut report = SweepReport::default();

        for entry in self.entries.values_mut() {
            let record = &mut entry.record;
            if record.is_active && elapsed(now, record.last_seen) > liveness_window_ms {
                record.is_active = false;
                debug!(
                    identity = %record.identity,
                    age_ms = elapsed(now, record.last_seen),
                    "Beacon expired"
                );
                report.expired.push(record.identity.clone());
            }
        }

        while self.entries.len() > self.capacity {
            let Some(victim) = self.oldest_inactive() else {
                break;
            };
            self.evict(&victim);
            report.evicted.push(victim);
        }

        report.expired.sort();
        report
    }

    /// Change the capacity bound. Shrinking takes effect at the next sweep.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    /// Look up a beacon by identity.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&BeaconRecord> {
        self.entries.get(identity).map(|e| &e.record)
    }

    /// Owned copy of every active record.
    ///
    /// The returned vector is detached from the registry, so it is unaffected
    /// by later ingestion.
    #[must_use]
    pub fn all_active(&self) -> Vec<BeaconRecord> {
        self.records().filter(|r| r.is_active).cloned().collect()
    }

    /// Every record, active or not, in unspecified order.
    pub fn records(&self) -> impl Iterator<Item = &BeaconRecord> {
        self.entries.values().map(|e| &e.record)
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no beacon has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured capacity bound.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Running counters.
    #[must_use]
    pub const fn stats(&self) -> RegistryStats {
        self.stats
    }

    /// Distance estimator applied to every record.
    #[must_use]
    pub const fn estimator(&self) -> &DistanceEstimator {
        &self.estimator
    }

    fn refresh(
        record: &mut BeaconRecord,
        estimator: &DistanceEstimator,
        filter: &SignalFilter,
        filtered: f32,
    ) {
        record.filtered_signal = filtered;
        record.estimated_distance_cm = estimator.estimate(filtered);
        record.confidence = confidence(filtered);
        record.stable = filter.has_enough_samples();
    }

    fn oldest_inactive(&self) -> Option<String> {
        self.entries
            .values()
            .filter(|e| !e.record.is_active)
            .min_by(|a, b| {
                a.record
                    .last_seen
                    .cmp(&b.record.last_seen)
                    .then_with(|| a.record.identity.cmp(&b.record.identity))
            })
            .map(|e| e.record.identity.clone())
    }

    fn evict(&mut self, identity: &str) {
        if self.entries.remove(identity).is_some() {
            self.stats.evicted += 1;
            debug!(identity = %identity, "Evicted inactive beacon");
        }
    }
}

impl Default for BeaconRegistry {
    fn default() -> Self {
        Self::new(
            DEFAULT_REGISTRY_CAPACITY,
            DEFAULT_FILTER_WINDOW,
            DistanceEstimator::default(),
        )
    }
}

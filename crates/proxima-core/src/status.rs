//! Read-only status snapshot for the reporter.

use serde::{Deserialize, Serialize};

use crate::alert::AlertFaults;
use crate::naming::BeaconName;
use crate::registry::{BeaconRecord, RegistryStats};
use crate::state_machine::{ProximityPhase, ProximityState};
use crate::types::{elapsed, Millis};

/// One active beacon as seen by the reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconStatus {
    /// Identity key.
    pub identity: String,
    /// Advertised name, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Location parsed from the name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<BeaconName>,
    /// Moving-average RSSI.
    pub filtered_signal: f32,
    /// Estimated distance.
    pub estimated_distance_cm: f32,
    /// Signal-strength confidence.
    pub confidence: f32,
    /// False while readings are provisional.
    pub stable: bool,
    /// Time since the beacon was last seen.
    pub last_seen_age_ms: Millis,
}

impl BeaconStatus {
    /// Build from a registry record.
    #[must_use]
    pub fn from_record(record: &BeaconRecord, now: Millis, name_prefix: &str) -> Self {
        Self {
            identity: record.identity.clone(),
            name: record.name.clone(),
            location: record
                .name
                .as_deref()
                .map(|name| BeaconName::parse(name, name_prefix)),
            filtered_signal: record.filtered_signal,
            estimated_distance_cm: record.estimated_distance_cm,
            confidence: record.confidence,
            stable: record.stable,
            last_seen_age_ms: elapsed(now, record.last_seen),
        }
    }
}

/// One configured beacon's proximity state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityStatus {
    /// Configured identity.
    pub identity: String,
    /// Current phase; `Far` if never evaluated.
    pub phase: ProximityPhase,
    /// Whether its alert is running.
    pub alert_active: bool,
    /// Distance at the last evaluation.
    pub distance_cm: Option<f32>,
    /// Start of the current in-range period.
    pub near_since: Option<Millis>,
    /// Start of the last alert.
    pub last_alert_at: Option<Millis>,
}

impl ProximityStatus {
    /// Build from a tracked state, or a fresh one if the beacon was never
    /// evaluated.
    #[must_use]
    pub fn new(identity: &str, state: Option<&ProximityState>) -> Self {
        let state = state.cloned().unwrap_or_default();
        Self {
            identity: identity.to_string(),
            phase: state.phase,
            alert_active: state.alert_active,
            distance_cm: state.last_distance_cm,
            near_since: state.near_since,
            last_alert_at: state.last_alert_at,
        }
    }
}

/// Whole-system snapshot, detached from the live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Monotonic time the snapshot was taken.
    pub generated_at: Millis,
    /// Active beacons, sorted by identity.
    pub beacons: Vec<BeaconStatus>,
    /// Configured beacons, sorted by identity.
    pub proximity: Vec<ProximityStatus>,
    /// Beacon holding the shared actuator.
    pub alert_holder: Option<String>,
    /// Actuator failures.
    pub faults: AlertFaults,
    /// Registry counters.
    pub registry: RegistryStats,
}

impl StatusSnapshot {
    /// Whether any configured beacon has a running alert.
    #[must_use]
    pub fn any_alert_active(&self) -> bool {
        self.proximity.iter().any(|p| p.alert_active)
    }

    /// Status of one configured beacon.
    #[must_use]
    pub fn proximity_of(&self, identity: &str) -> Option<&ProximityStatus> {
        self.proximity.iter().find(|p| p.identity == identity)
    }
}

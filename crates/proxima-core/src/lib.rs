//! # proxima-core
//!
//! Core logic for a wearable BLE proximity-alert device.
//!
//! A collar scans for nearby BLE beacons, smooths each beacon's signal
//! strength, estimates its distance and raises a buzzer or vibration alert
//! when a configured beacon comes within its trigger distance.
//!
//! This crate provides:
//! - Per-beacon RSSI smoothing and path-loss distance estimation
//! - A bounded registry of observed beacons with liveness and eviction
//! - A per-beacon proximity state machine with entry delay, cooldown and
//!   capped alert duration
//! - Device configuration loading, saving and validation
//!
//! Radio scanning and actuator hardware are supplied by the host through the
//! [`ScanSource`] and [`AlertDriver`] traits.
//!
//! ## Architecture
//!
//! - [`types`] - Observations and the monotonic clock type
//! - [`filter`] - Moving-average RSSI filter
//! - [`distance`] - Path-loss distance model and signal confidence
//! - [`naming`] - Advertised beacon name parsing
//! - [`registry`] - Bounded beacon registry
//! - [`config`] - Device configuration and the per-beacon config store
//! - [`alert`] - Actuator driver contract and fault record
//! - [`state_machine`] - Far / entering / near state machine
//! - [`source`] - Scan source contract
//! - [`status`] - Read-only status snapshot
//! - [`system`] - The [`ProximitySystem`] aggregate
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod alert;
pub mod config;
pub mod distance;
pub mod error;
pub mod filter;
pub mod naming;
pub mod registry;
pub mod source;
pub mod state_machine;
pub mod status;
pub mod system;
pub mod types;

// Re-export primary types for convenience
#[cfg(any(test, feature = "mock-driver"))]
pub use alert::{DriverCall, RecordingDriver};
pub use alert::{ActuatorPolicy, AlertDriver, AlertError, AlertFaults, AlertRequest, AlertResult};
pub use config::{
    is_valid_mac_address, AlertMode, AlertSettings, BeaconEntry, BeaconMatcher, Config,
    ConfigError, ConfigResult, ConfigStore, ProximityConfig, ScanSettings,
};
pub use distance::{confidence, Calibration, DistanceEstimator};
pub use error::{ProximaError, Result};
pub use filter::SignalFilter;
pub use naming::BeaconName;
pub use registry::{BeaconRecord, BeaconRegistry, IngestOutcome, RegistryStats, SweepReport};
pub use source::{ScanError, ScanResult, ScanSource};
pub use state_machine::{
    AlertEvent, DeactivationReason, EvaluationInput, ProximityPhase, ProximityState,
    ProximityStateMachine, SuppressionReason,
};
pub use status::{BeaconStatus, ProximityStatus, StatusSnapshot};
pub use system::ProximitySystem;
pub use types::{elapsed, BeaconObservation, Millis};

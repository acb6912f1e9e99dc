//! The proximity system aggregate.
//!
//! [`ProximitySystem`] owns the beacon registry, the configuration store and
//! the state machine. Hosts wrap it in a single lock; every method is
//! bounded and does no I/O, so holding that lock across a call is cheap.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::alert::AlertDriver;
use crate::config::{
    BeaconEntry, BeaconMatcher, Config, ConfigStore, ProximityConfig, ScanSettings,
};
use crate::distance::DistanceEstimator;
use crate::error::{ProximaError, Result};
use crate::registry::{BeaconRecord, BeaconRegistry, IngestOutcome, SweepReport};
use crate::state_machine::{AlertEvent, EvaluationInput, ProximityStateMachine};
use crate::status::{BeaconStatus, ProximityStatus, StatusSnapshot};
use crate::types::{BeaconObservation, Millis};

/// Registry, configuration and proximity state of one device.
#[derive(Debug, Clone)]
pub struct ProximitySystem {
    registry: BeaconRegistry,
    configs: ConfigStore,
    machine: ProximityStateMachine,
    settings: ScanSettings,
}

impl ProximitySystem {
    /// Build a system from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails validation.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        let estimator = DistanceEstimator::new(config.calibration);
        let registry = BeaconRegistry::new(
            config.scan.registry_capacity,
            config.scan.filter_window,
            estimator,
        );
        let mut configs = ConfigStore::new();
        for entry in &config.beacons {
            configs.upsert(entry.clone())?;
        }

        info!(
            beacons = configs.len(),
            capacity = config.scan.registry_capacity,
            actuator = ?config.alerts.actuator,
            "Proximity system initialised"
        );

        Ok(Self {
            registry,
            configs,
            machine: ProximityStateMachine::new(config.alerts.actuator),
            settings: config.scan.clone(),
        })
    }

    /// Apply one observation from the scan source. Never fails.
    pub fn ingest(&mut self, observation: BeaconObservation) -> IngestOutcome {
        self.registry.ingest(observation)
    }

    /// Apply a batch of observations in order.
    pub fn ingest_all(&mut self, observations: impl IntoIterator<Item = BeaconObservation>) {
        for observation in observations {
            self.registry.ingest(observation);
        }
    }

    /// Expire stale beacons using the configured liveness window.
    pub fn sweep(&mut self, now: Millis) -> SweepReport {
        self.registry.sweep(now, self.settings.liveness_window_ms)
    }

    /// Evaluate every configured beacon against its current record.
    ///
    /// Each observed record applies to at most one entry. Exact-identity
    /// entries claim their records first; address and name matchers then
    /// resolve in registration order among the records left. Unconfigured
    /// beacons are tracked but never evaluated.
    pub fn evaluate(&mut self, now: Millis, driver: &mut dyn AlertDriver) -> Vec<AlertEvent> {
        let entries: Vec<&BeaconEntry> = self.configs.entries().collect();
        let mut records: Vec<Option<&BeaconRecord>> = vec![None; entries.len()];
        let mut claimed: HashSet<&str> = HashSet::new();

        for exact in [true, false] {
            for (slot, entry) in records.iter_mut().zip(&entries) {
                if matches!(entry.matcher, BeaconMatcher::Identity) != exact {
                    continue;
                }
                *slot = entry.resolve(&self.registry).filter(|record| {
                    let fresh = claimed.insert(record.identity.as_str());
                    if !fresh {
                        debug!(
                            identity = %entry.identity,
                            record = %record.identity,
                            "Record already claimed by another entry"
                        );
                    }
                    fresh
                });
            }
        }

        let inputs: Vec<EvaluationInput<'_>> = entries
            .iter()
            .zip(records)
            .map(|(entry, record)| EvaluationInput {
                identity: &entry.identity,
                config: &entry.proximity,
                distance_cm: record
                    .filter(|r| r.is_active)
                    .map(|r| r.estimated_distance_cm),
            })
            .collect();

        self.machine.evaluate(now, &inputs, driver)
    }

    /// Sweep, then evaluate.
    pub fn tick(&mut self, now: Millis, driver: &mut dyn AlertDriver) -> Vec<AlertEvent> {
        self.sweep(now);
        self.evaluate(now, driver)
    }

    /// Stop every running alert. Cooldown is preserved.
    pub fn stop_all_alerts(&mut self, now: Millis, driver: &mut dyn AlertDriver) -> Vec<AlertEvent> {
        self.machine.stop_all(now, driver)
    }

    /// Insert or replace a configured beacon. The replacement is atomic:
    /// evaluations see either the old entry or the new one.
    ///
    /// # Errors
    ///
    /// Returns a validation error; the previous entry is kept on error.
    pub fn configure(&mut self, entry: BeaconEntry) -> Result<Option<BeaconEntry>> {
        Ok(self.configs.upsert(entry)?)
    }

    /// Set alert rules for `identity`, keeping any existing matcher.
    ///
    /// # Errors
    ///
    /// Returns a validation error; the previous rules are kept on error.
    pub fn configure_beacon(
        &mut self,
        identity: &str,
        proximity: ProximityConfig,
    ) -> Result<Option<ProximityConfig>> {
        Ok(self.configs.set(identity, proximity)?)
    }

    /// Remove a configured beacon, stopping its alert if one is running.
    ///
    /// # Errors
    ///
    /// Returns [`ProximaError::BeaconNotConfigured`] if `identity` is unknown.
    pub fn remove_config(
        &mut self,
        identity: &str,
        now: Millis,
        driver: &mut dyn AlertDriver,
    ) -> Result<Option<AlertEvent>> {
        self.configs
            .remove(identity)
            .ok_or_else(|| ProximaError::BeaconNotConfigured(identity.to_string()))?;
        info!(identity, "Beacon configuration removed");
        Ok(self.machine.forget(identity, now, driver))
    }

    /// Replace the configured beacons and scan settings from a reloaded
    /// configuration.
    ///
    /// Beacons no longer configured are removed as by
    /// [`remove_config`](Self::remove_config). Calibration, filter window
    /// and actuator policy only take effect on restart.
    ///
    /// # Errors
    ///
    /// Returns a configuration error; nothing changes on error.
    pub fn reload(
        &mut self,
        config: &Config,
        now: Millis,
        driver: &mut dyn AlertDriver,
    ) -> Result<Vec<AlertEvent>> {
        config.validate()?;

        let mut configs = ConfigStore::new();
        for entry in &config.beacons {
            configs.upsert(entry.clone())?;
        }

        if config.calibration != *self.registry.estimator().calibration()
            || config.scan.filter_window != self.settings.filter_window
            || config.alerts.actuator != self.machine.policy()
        {
            warn!("Calibration, filter window or actuator changes require a restart");
        }

        let removed: Vec<String> = self
            .configs
            .entries()
            .filter(|old| configs.entry(&old.identity).is_none())
            .map(|old| old.identity.clone())
            .collect();
        let events = removed
            .iter()
            .filter_map(|identity| self.machine.forget(identity, now, driver))
            .collect();

        self.configs = configs;
        self.registry.set_capacity(config.scan.registry_capacity);
        self.settings = ScanSettings {
            filter_window: self.settings.filter_window,
            ..config.scan.clone()
        };

        info!(
            beacons = self.configs.len(),
            removed = removed.len(),
            "Configuration reloaded"
        );
        Ok(events)
    }

    /// Detached snapshot for the status reporter.
    #[must_use]
    pub fn snapshot(&self, now: Millis) -> StatusSnapshot {
        let mut beacons: Vec<BeaconStatus> = self
            .registry
            .records()
            .filter(|r| r.is_active)
            .map(|r| BeaconStatus::from_record(r, now, &self.settings.name_prefix))
            .collect();
        beacons.sort_by(|a, b| a.identity.cmp(&b.identity));

        let mut proximity: Vec<ProximityStatus> = self
            .configs
            .entries()
            .map(|e| ProximityStatus::new(&e.identity, self.machine.state(&e.identity)))
            .collect();
        proximity.sort_by(|a, b| a.identity.cmp(&b.identity));

        StatusSnapshot {
            generated_at: now,
            beacons,
            proximity,
            alert_holder: self.machine.alert_holder().map(str::to_string),
            faults: self.machine.faults().clone(),
            registry: self.registry.stats(),
        }
    }

    /// The beacon registry.
    #[must_use]
    pub const fn registry(&self) -> &BeaconRegistry {
        &self.registry
    }

    /// The configuration store.
    #[must_use]
    pub const fn configs(&self) -> &ConfigStore {
        &self.configs
    }

    /// The state machine.
    #[must_use]
    pub const fn machine(&self) -> &ProximityStateMachine {
        &self.machine
    }

    /// Scan settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &ScanSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::RecordingDriver;
    use crate::state_machine::ProximityPhase;

    fn near_config() -> ProximityConfig {
        ProximityConfig {
            trigger_distance_cm: 100.0,
            alert_duration_ms: 1_000,
            cooldown_period_ms: 0,
            ..ProximityConfig::default()
        }
    }

    fn system() -> ProximitySystem {
        let mut config = Config::default();
        config.scan.filter_window = 1;
        ProximitySystem::new(&config).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let mut config = Config::default();
        config.scan.registry_capacity = 0;
        let err = ProximitySystem::new(&config).unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_unconfigured_beacon_is_tracked_not_evaluated() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        sys.ingest(BeaconObservation::new("B1", -40, 0));

        assert!(sys.evaluate(0, &mut driver).is_empty());
        assert!(driver.calls().is_empty());
        assert_eq!(sys.snapshot(0).beacons.len(), 1);
        assert!(sys.snapshot(0).proximity.is_empty());
    }

    #[test]
    fn test_name_matcher_routes_record_to_entry() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        sys.configure(
            BeaconEntry::new("kitchen", near_config())
                .with_matcher(BeaconMatcher::NameContains("Kitchen".into())),
        )
        .unwrap();
        sys.ingest(
            BeaconObservation::new("AA:BB:CC:DD:EE:01", -50, 0)
                .with_name("PetZone-Home-Kitchen-01"),
        );

        let events = sys.evaluate(0, &mut driver);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity(), "kitchen");
        assert_eq!(driver.activations().next().unwrap().identity, "kitchen");
    }

    #[test]
    fn test_record_claimed_by_first_entry_only() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        sys.configure(
            BeaconEntry::new("first", near_config())
                .with_matcher(BeaconMatcher::NameContains("Home".into())),
        )
        .unwrap();
        sys.configure(
            BeaconEntry::new("second", near_config())
                .with_matcher(BeaconMatcher::NameContains("Kitchen".into())),
        )
        .unwrap();
        sys.ingest(BeaconObservation::new("B1", -50, 0).with_name("PetZone-Home-Kitchen-01"));

        sys.evaluate(0, &mut driver);
        assert_eq!(
            sys.machine().state("first").unwrap().phase,
            ProximityPhase::Near
        );
        assert_eq!(
            sys.machine().state("second").unwrap().phase,
            ProximityPhase::Far
        );
    }

    #[test]
    fn test_exact_identity_wins_over_earlier_name_match() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        sys.configure(
            BeaconEntry::new("zone", near_config())
                .with_matcher(BeaconMatcher::NameContains("Home".into())),
        )
        .unwrap();
        sys.configure_beacon("B1", near_config()).unwrap();
        sys.ingest(BeaconObservation::new("B1", -50, 0).with_name("PetZone-Home-01"));

        let events = sys.evaluate(0, &mut driver);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity(), "B1");
        assert_eq!(
            sys.machine().state("B1").unwrap().phase,
            ProximityPhase::Near
        );
        assert_eq!(
            sys.machine().state("zone").unwrap().phase,
            ProximityPhase::Far
        );
    }

    #[test]
    fn test_tick_treats_expired_beacon_as_far() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        sys.configure_beacon("B1", near_config()).unwrap();
        sys.ingest(BeaconObservation::new("B1", -50, 0));
        sys.tick(0, &mut driver);
        assert!(sys.machine().state("B1").unwrap().alert_active);

        // The default liveness window is 10 s.
        sys.tick(500, &mut driver);
        let events = sys.tick(10_001, &mut driver);
        assert!(!events.is_empty());
        assert_eq!(
            sys.machine().state("B1").unwrap().phase,
            ProximityPhase::Far
        );
    }

    #[test]
    fn test_remove_unknown_config_errors() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        let err = sys.remove_config("nope", 0, &mut driver).unwrap_err();
        assert_eq!(err.error_code(), "BEACON_NOT_CONFIGURED");
    }

    #[test]
    fn test_reload_drops_removed_beacons() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        sys.configure_beacon("B1", near_config()).unwrap();
        sys.configure_beacon("B2", near_config()).unwrap();
        sys.ingest(BeaconObservation::new("B1", -50, 0));
        sys.evaluate(0, &mut driver);

        let mut next = Config::default();
        next.scan.filter_window = 1;
        next.scan.registry_capacity = 5;
        next.beacons = vec![BeaconEntry::new("B2", near_config())];

        let events = sys.reload(&next, 100, &mut driver).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity(), "B1");
        assert!(sys.configs().entry("B1").is_none());
        assert_eq!(sys.registry().capacity(), 5);
    }

    #[test]
    fn test_reload_rejects_invalid_and_keeps_state() {
        let mut sys = system();
        let mut driver = RecordingDriver::new();
        sys.configure_beacon("B1", near_config()).unwrap();

        let mut bad = Config::default();
        bad.beacons = vec![BeaconEntry::new("", near_config())];
        assert!(sys.reload(&bad, 0, &mut driver).is_err());
        assert!(sys.configs().entry("B1").is_some());
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let mut sys = system();
        for id in ["C", "A", "B"] {
            sys.ingest(BeaconObservation::new(id, -60, 0));
            sys.configure_beacon(id, near_config()).unwrap();
        }
        let snapshot = sys.snapshot(0);
        let ids: Vec<_> = snapshot.beacons.iter().map(|b| b.identity.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        let ids: Vec<_> = snapshot
            .proximity
            .iter()
            .map(|p| p.identity.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }
}

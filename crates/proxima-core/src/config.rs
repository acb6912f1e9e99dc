//! Device configuration.
//!
//! Handles loading, saving, and validating proxima configuration including:
//! - Scan cadence, liveness window and registry capacity
//! - Path-loss calibration
//! - Actuator sharing policy
//! - Per-beacon proximity alert settings
//!
//! Configuration is read with the `config` crate so every value can be
//! overridden from `PROXIMA_`-prefixed environment variables, using `__` to
//! separate nested keys (e.g. `PROXIMA_SCAN__LIVENESS_WINDOW_MS=15000`).

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::alert::ActuatorPolicy;
use crate::distance::Calibration;
use crate::filter::DEFAULT_FILTER_WINDOW;
use crate::naming::DEFAULT_NAME_PREFIX;
use crate::registry::{
    BeaconRecord, BeaconRegistry, DEFAULT_LIVENESS_WINDOW_MS, DEFAULT_REGISTRY_CAPACITY,
};
use crate::types::Millis;

/// Lowest accepted alert intensity.
pub const MIN_ALERT_INTENSITY: u8 = 1;

/// Highest accepted alert intensity.
pub const MAX_ALERT_INTENSITY: u8 = 5;

static MAC_ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}$").expect("MAC address regex is valid")
});

/// Returns `true` if `address` is a colon-separated MAC address.
#[must_use]
pub fn is_valid_mac_address(address: &str) -> bool {
    MAC_ADDRESS_RE.is_match(address)
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised while loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    ReadError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be written.
    #[error("Failed to write {path}: {source}")]
    WriteError {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML text could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Layered sources (file + environment) could not be merged.
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    /// Configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field holds an invalid value.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields hold invalid values.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    fn from_list(mut errors: Vec<Self>) -> Result<(), Self> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::MultipleValidationErrors(errors)),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// PER-BEACON PROXIMITY SETTINGS
// =============================================================================

/// Which actuators an alert drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMode {
    /// Configured but silent.
    None,
    /// Primary actuator only (buzzer).
    #[serde(alias = "buzzer")]
    Primary,
    /// Secondary actuator only (vibration motor).
    #[serde(alias = "vibration")]
    Secondary,
    /// Both actuators.
    #[default]
    Both,
}

impl AlertMode {
    /// Whether the primary actuator is driven.
    #[must_use]
    pub const fn uses_primary(self) -> bool {
        matches!(self, Self::Primary | Self::Both)
    }

    /// Whether the secondary actuator is driven.
    #[must_use]
    pub const fn uses_secondary(self) -> bool {
        matches!(self, Self::Secondary | Self::Both)
    }

    /// Whether the mode produces no output.
    #[must_use]
    pub const fn is_silent(self) -> bool {
        matches!(self, Self::None)
    }
}

/// Alerting rules for one configured beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProximityConfig {
    /// Estimated distance at or below which the beacon counts as near.
    pub trigger_distance_cm: f32,

    /// Actuators to drive.
    pub alert_mode: AlertMode,

    /// Output intensity, 1 (gentle) to 5 (strongest).
    pub alert_intensity: u8,

    /// Hard cap on how long one alert runs.
    pub alert_duration_ms: Millis,

    /// Minimum time between two activations, measured from activation.
    pub cooldown_period_ms: Millis,

    /// Require a dwell time in range before alerting.
    pub enable_entry_delay: bool,

    /// Dwell time, used only when `enable_entry_delay` is set.
    pub entry_delay_ms: Millis,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            trigger_distance_cm: 200.0,
            alert_mode: AlertMode::Both,
            alert_intensity: 3,
            alert_duration_ms: 1_000,
            cooldown_period_ms: 5_000,
            enable_entry_delay: false,
            entry_delay_ms: 0,
        }
    }
}

impl ProximityConfig {
    /// Check every field, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for a single problem or
    /// [`ConfigError::MultipleValidationErrors`] for several.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::from_list(self.validation_errors(""))
    }

    fn validation_errors(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !(self.trigger_distance_cm.is_finite() && self.trigger_distance_cm > 0.0) {
            errors.push(ConfigError::invalid(
                format!("{prefix}trigger_distance_cm"),
                format!("must be a positive distance (got {})", self.trigger_distance_cm),
            ));
        }
        if !(MIN_ALERT_INTENSITY..=MAX_ALERT_INTENSITY).contains(&self.alert_intensity) {
            errors.push(ConfigError::invalid(
                format!("{prefix}alert_intensity"),
                format!(
                    "must be between {MIN_ALERT_INTENSITY} and {MAX_ALERT_INTENSITY} (got {})",
                    self.alert_intensity
                ),
            ));
        }
        if self.alert_duration_ms == 0 {
            errors.push(ConfigError::invalid(
                format!("{prefix}alert_duration_ms"),
                "must be greater than 0",
            ));
        }
        errors
    }
}

/// How a configured beacon is recognised among observed records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BeaconMatcher {
    /// The record identity equals the configured identity.
    #[default]
    Identity,
    /// The record identity equals this MAC address (case-insensitive).
    Address(String),
    /// The advertised name contains this substring.
    NameContains(String),
}

/// A configured beacon: identity key, matcher and alert rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconEntry {
    /// Key under which proximity state is tracked and reported.
    pub identity: String,

    /// How observed records are matched to this entry.
    #[serde(default)]
    pub matcher: BeaconMatcher,

    /// Alert rules.
    #[serde(default)]
    pub proximity: ProximityConfig,
}

impl BeaconEntry {
    /// Entry matched by exact identity.
    pub fn new(identity: impl Into<String>, proximity: ProximityConfig) -> Self {
        Self {
            identity: identity.into(),
            matcher: BeaconMatcher::Identity,
            proximity,
        }
    }

    /// Replace the matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: BeaconMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Check identity, matcher and alert rules.
    ///
    /// # Errors
    ///
    /// Returns the collected validation errors.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::from_list(self.validation_errors("beacon."))
    }

    fn validation_errors(&self, prefix: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.identity.trim().is_empty() {
            errors.push(ConfigError::invalid(
                format!("{prefix}identity"),
                "must not be empty",
            ));
        }
        match &self.matcher {
            BeaconMatcher::Identity => {}
            BeaconMatcher::Address(address) if !is_valid_mac_address(address) => {
                errors.push(ConfigError::invalid(
                    format!("{prefix}matcher"),
                    format!("'{address}' is not a MAC address (expected XX:XX:XX:XX:XX:XX)"),
                ));
            }
            BeaconMatcher::NameContains(fragment) if fragment.is_empty() => {
                errors.push(ConfigError::invalid(
                    format!("{prefix}matcher"),
                    "name fragment must not be empty",
                ));
            }
            BeaconMatcher::Address(_) | BeaconMatcher::NameContains(_) => {}
        }
        errors.extend(
            self.proximity
                .validation_errors(&format!("{prefix}proximity.")),
        );
        errors
    }

    /// Find the observed record this entry applies to.
    ///
    /// Name matches prefer active records, then the most recently seen.
    #[must_use]
    pub fn resolve<'a>(&self, registry: &'a BeaconRegistry) -> Option<&'a BeaconRecord> {
        match &self.matcher {
            BeaconMatcher::Identity => registry.get(&self.identity),
            BeaconMatcher::Address(address) => registry.get(address).or_else(|| {
                registry
                    .records()
                    .find(|r| r.identity.eq_ignore_ascii_case(address))
            }),
            BeaconMatcher::NameContains(fragment) => registry
                .records()
                .filter(|r| r.name.as_deref().is_some_and(|n| n.contains(fragment.as_str())))
                .max_by(|a, b| {
                    a.is_active
                        .cmp(&b.is_active)
                        .then_with(|| a.last_seen.cmp(&b.last_seen))
                        .then_with(|| b.identity.cmp(&a.identity))
                }),
        }
    }
}

// =============================================================================
// CONFIG STORE
// =============================================================================

/// Keyed store of configured beacons, in registration order.
///
/// Updates replace a whole entry at once; there is no partial update.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    entries: Vec<BeaconEntry>,
}

impl ConfigStore {
    /// Empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert or replace an entry, returning the previous one.
    ///
    /// A replaced entry keeps its registration position.
    ///
    /// # Errors
    ///
    /// Returns validation errors; the store is unchanged on error.
    pub fn upsert(&mut self, entry: BeaconEntry) -> ConfigResult<Option<BeaconEntry>> {
        entry.validate()?;
        if let Some(slot) = self.entries.iter_mut().find(|e| e.identity == entry.identity) {
            debug!(identity = %entry.identity, "Replacing beacon configuration");
            return Ok(Some(std::mem::replace(slot, entry)));
        }
        info!(identity = %entry.identity, trigger_cm = entry.proximity.trigger_distance_cm, "Beacon configured");
        self.entries.push(entry);
        Ok(None)
    }

    /// Set alert rules for `identity`, keeping its matcher if already known.
    ///
    /// # Errors
    ///
    /// Returns validation errors; the store is unchanged on error.
    pub fn set(
        &mut self,
        identity: &str,
        proximity: ProximityConfig,
    ) -> ConfigResult<Option<ProximityConfig>> {
        let matcher = self
            .entry(identity)
            .map(|e| e.matcher.clone())
            .unwrap_or_default();
        let entry = BeaconEntry::new(identity, proximity).with_matcher(matcher);
        Ok(self.upsert(entry)?.map(|previous| previous.proximity))
    }

    /// Remove the entry for `identity`.
    pub fn remove(&mut self, identity: &str) -> Option<BeaconEntry> {
        let index = self.entries.iter().position(|e| e.identity == identity)?;
        Some(self.entries.remove(index))
    }

    /// Alert rules for `identity`.
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&ProximityConfig> {
        self.entry(identity).map(|e| &e.proximity)
    }

    /// Full entry for `identity`.
    #[must_use]
    pub fn entry(&self, identity: &str) -> Option<&BeaconEntry> {
        self.entries.iter().find(|e| e.identity == identity)
    }

    /// Entries in registration order.
    pub fn entries(&self) -> impl Iterator<Item = &BeaconEntry> {
        self.entries.iter()
    }

    /// Number of configured beacons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no beacon is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =============================================================================
// DEVICE CONFIGURATION
// =============================================================================

/// Scan and registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Age after which a beacon is marked inactive.
    pub liveness_window_ms: Millis,

    /// Maximum number of tracked beacons.
    pub registry_capacity: usize,

    /// Moving-average window per beacon.
    pub filter_window: usize,

    /// How often the state machine is evaluated.
    pub evaluation_interval_ms: Millis,

    /// How often the scan source is polled.
    pub scan_interval_ms: Millis,

    /// Advertised-name prefix of zone beacons.
    pub name_prefix: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            liveness_window_ms: DEFAULT_LIVENESS_WINDOW_MS,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
            filter_window: DEFAULT_FILTER_WINDOW,
            evaluation_interval_ms: 500,
            scan_interval_ms: 1_000,
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
        }
    }
}

/// Actuator settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Whether beacons share one physical actuator.
    pub actuator: ActuatorPolicy,
}

/// Complete device configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scan and registry settings.
    pub scan: ScanSettings,

    /// Path-loss calibration.
    pub calibration: Calibration,

    /// Actuator settings.
    pub alerts: AlertSettings,

    /// Configured beacons.
    pub beacons: Vec<BeaconEntry>,
}

impl Config {
    /// Load from a TOML file, applying `PROXIMA_` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, cannot be parsed, or fails
    /// validation.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        debug!(path = %path.display(), "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix("PROXIMA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        info!(
            path = %path.display(),
            beacons = config.beacons.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        match Self::load(path) {
            Err(ConfigError::NotFound(path)) => {
                info!(path = %path, "No configuration file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Returns parse or validation errors.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::WriteError {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read a TOML file without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns read, parse, or validation errors.
    pub fn read_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.display().to_string())
            } else {
                ConfigError::ReadError {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;
        Self::from_toml_str(&text)
    }

    /// Check every section, collecting all problems.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] or
    /// [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        let scan = &self.scan;
        for (field, value) in [
            ("scan.liveness_window_ms", scan.liveness_window_ms),
            ("scan.evaluation_interval_ms", scan.evaluation_interval_ms),
            ("scan.scan_interval_ms", scan.scan_interval_ms),
        ] {
            if value == 0 {
                errors.push(ConfigError::invalid(field, "must be greater than 0"));
            }
        }
        if scan.registry_capacity == 0 {
            errors.push(ConfigError::invalid(
                "scan.registry_capacity",
                "must be greater than 0",
            ));
        }
        if scan.filter_window == 0 {
            errors.push(ConfigError::invalid(
                "scan.filter_window",
                "must be greater than 0",
            ));
        }

        let cal = &self.calibration;
        if !(cal.path_loss_exponent.is_finite() && cal.path_loss_exponent > 0.0) {
            errors.push(ConfigError::invalid(
                "calibration.path_loss_exponent",
                "must be a positive number",
            ));
        }
        if !(cal.tx_power_dbm.is_finite() && cal.tx_power_dbm < 0.0) {
            errors.push(ConfigError::invalid(
                "calibration.tx_power_dbm",
                "must be a negative dBm value",
            ));
        }
        if !(cal.contact_offset_m.is_finite() && cal.contact_offset_m >= 0.0) {
            errors.push(ConfigError::invalid(
                "calibration.contact_offset_m",
                "must not be negative",
            ));
        }
        if !(cal.max_distance_cm.is_finite() && cal.max_distance_cm > 0.0) {
            errors.push(ConfigError::invalid(
                "calibration.max_distance_cm",
                "must be a positive distance",
            ));
        }

        for (index, entry) in self.beacons.iter().enumerate() {
            errors.extend(entry.validation_errors(&format!("beacons[{index}].")));
            if self.beacons[..index]
                .iter()
                .any(|earlier| earlier.identity == entry.identity)
            {
                errors.push(ConfigError::invalid(
                    format!("beacons[{index}].identity"),
                    format!("'{}' is configured more than once", entry.identity),
                ));
            }
        }

        ConfigError::from_list(errors)
    }

    /// Default configuration file location.
    ///
    /// On the device: `/etc/proxima/config.toml`.
    /// For development: the platform config directory.
    ///
    /// # Errors
    ///
    /// Returns an error if no config directory can be determined.
    pub fn default_path() -> ConfigResult<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            Ok(PathBuf::from("/etc/proxima/config.toml"))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "proxima").ok_or_else(|| {
                ConfigError::NotFound("cannot determine config directory".into())
            })?;
            Ok(dirs.config_dir().join("config.toml"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[scan]
liveness_window_ms = 8000
registry_capacity = 12

[calibration]
tx_power_dbm = -62.0

[alerts]
actuator = "per_beacon"

[[beacons]]
identity = "AA:BB:CC:DD:EE:01"

[beacons.proximity]
trigger_distance_cm = 50
alert_mode = "buzzer"
alert_intensity = 4
cooldown_period_ms = 3000

[[beacons]]
identity = "kitchen"
matcher = { kind = "name_contains", value = "Kitchen" }

[beacons.proximity]
enable_entry_delay = true
entry_delay_ms = 2000
"#;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scan.registry_capacity, 20);
        assert_eq!(config.scan.filter_window, 5);
        assert_eq!(config.alerts.actuator, ActuatorPolicy::Shared);
    }

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.scan.liveness_window_ms, 8000);
        assert_eq!(config.scan.registry_capacity, 12);
        assert_eq!(config.scan.filter_window, 5);
        assert!((config.calibration.tx_power_dbm - -62.0).abs() < f32::EPSILON);
        assert!((config.calibration.path_loss_exponent - 1.8).abs() < f32::EPSILON);
        assert_eq!(config.alerts.actuator, ActuatorPolicy::PerBeacon);

        let first = &config.beacons[0];
        assert_eq!(first.matcher, BeaconMatcher::Identity);
        assert_eq!(first.proximity.alert_mode, AlertMode::Primary);
        assert!((first.proximity.trigger_distance_cm - 50.0).abs() < f32::EPSILON);
        assert_eq!(first.proximity.cooldown_period_ms, 3000);

        let second = &config.beacons[1];
        assert_eq!(second.matcher, BeaconMatcher::NameContains("Kitchen".into()));
        assert!(second.proximity.enable_entry_delay);
        assert_eq!(second.proximity.entry_delay_ms, 2000);
        assert_eq!(second.proximity.alert_mode, AlertMode::Both);
    }

    #[test]
    fn test_proximity_validation_collects_all_errors() {
        let bad = ProximityConfig {
            trigger_distance_cm: 0.0,
            alert_intensity: 9,
            alert_duration_ms: 0,
            ..ProximityConfig::default()
        };
        match bad.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_trigger_distance_is_rejected() {
        let bad = ProximityConfig {
            trigger_distance_cm: f32::NAN,
            ..ProximityConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "trigger_distance_cm"
        ));
    }

    #[test]
    fn test_duplicate_identity_is_rejected() {
        let mut config = Config::default();
        config.beacons.push(BeaconEntry::new("B1", ProximityConfig::default()));
        config.beacons.push(BeaconEntry::new("B1", ProximityConfig::default()));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_invalid_matcher_address() {
        let entry = BeaconEntry::new("collar", ProximityConfig::default())
            .with_matcher(BeaconMatcher::Address("not-a-mac".into()));
        assert!(entry.validate().is_err());
    }

    #[test]
    fn test_mac_address_validation() {
        assert!(is_valid_mac_address("AA:BB:CC:DD:EE:FF"));
        assert!(is_valid_mac_address("aa:bb:cc:dd:ee:0f"));
        assert!(!is_valid_mac_address("AA:BB:CC:DD:EE"));
        assert!(!is_valid_mac_address("AA-BB-CC-DD-EE-FF"));
    }

    #[test]
    fn test_store_upsert_replaces_whole_entry_in_place() {
        let mut store = ConfigStore::new();
        store.set("A", ProximityConfig::default()).unwrap();
        store.set("B", ProximityConfig::default()).unwrap();

        let replacement = ProximityConfig {
            trigger_distance_cm: 30.0,
            enable_entry_delay: true,
            entry_delay_ms: 1500,
            ..ProximityConfig::default()
        };
        let previous = store.set("A", replacement.clone()).unwrap();
        assert_eq!(previous, Some(ProximityConfig::default()));
        assert_eq!(store.get("A"), Some(&replacement));

        let order: Vec<_> = store.entries().map(|e| e.identity.as_str()).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn test_store_rejects_invalid_update_without_change() {
        let mut store = ConfigStore::new();
        store.set("A", ProximityConfig::default()).unwrap();
        let bad = ProximityConfig {
            alert_intensity: 0,
            ..ProximityConfig::default()
        };
        assert!(store.set("A", bad).is_err());
        assert_eq!(store.get("A"), Some(&ProximityConfig::default()));
    }

    #[test]
    fn test_store_remove() {
        let mut store = ConfigStore::new();
        store.set("A", ProximityConfig::default()).unwrap();
        assert!(store.remove("A").is_some());
        assert!(store.remove("A").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_keeps_existing_matcher() {
        let mut store = ConfigStore::new();
        store
            .upsert(
                BeaconEntry::new("kitchen", ProximityConfig::default())
                    .with_matcher(BeaconMatcher::NameContains("Kitchen".into())),
            )
            .unwrap();
        store.set("kitchen", ProximityConfig::default()).unwrap();
        assert_eq!(
            store.entry("kitchen").unwrap().matcher,
            BeaconMatcher::NameContains("Kitchen".into())
        );
    }

    #[test]
    fn test_resolve_by_matcher() {
        use crate::types::BeaconObservation;

        let mut registry = BeaconRegistry::default();
        registry.ingest(BeaconObservation::new("aa:bb:cc:dd:ee:01", -60, 0));
        registry.ingest(BeaconObservation::new("X1", -60, 0).with_name("PetZone-Kitchen-01"));
        registry.ingest(BeaconObservation::new("X2", -60, 50).with_name("PetZone-Kitchen-02"));

        let by_address = BeaconEntry::new("collar", ProximityConfig::default())
            .with_matcher(BeaconMatcher::Address("AA:BB:CC:DD:EE:01".into()));
        assert_eq!(
            by_address.resolve(&registry).map(|r| r.identity.as_str()),
            Some("aa:bb:cc:dd:ee:01")
        );

        let by_name = BeaconEntry::new("kitchen", ProximityConfig::default())
            .with_matcher(BeaconMatcher::NameContains("Kitchen".into()));
        assert_eq!(
            by_name.resolve(&registry).map(|r| r.identity.as_str()),
            Some("X2")
        );

        let missing = BeaconEntry::new("B9", ProximityConfig::default());
        assert!(missing.resolve(&registry).is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.scan.scan_interval_ms = 750;
        config.save(&path).unwrap();

        let reloaded = Config::read_file(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(Config::load(&path), Err(ConfigError::NotFound(_))));
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_load_through_layered_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.beacons.len(), 2);
        assert_eq!(config.beacons[0].proximity.alert_intensity, 4);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\nfilter_window = 0\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ValidationError { field, .. }) if field == "scan.filter_window"
        ));
    }
}

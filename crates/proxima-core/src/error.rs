//! Unified error types for the proxima core library.
//!
//! [`ProximaError`] covers every failure mode a host can see. Each module
//! keeps its own specific error type ([`ConfigError`](crate::config::ConfigError),
//! [`AlertError`](crate::alert::AlertError), [`ScanError`](crate::source::ScanError))
//! and converts into this one at the crate boundary.
//!
//! Nothing on the hot path (`ingest`, `sweep`, evaluation) returns these:
//! bad readings are clamped, capacity overflow is counted and actuator
//! failures are recorded in [`AlertFaults`](crate::alert::AlertFaults).
//!
//! # Example
//!
//! ```rust
//! use proxima_core::error::{ProximaError, Result};
//! use std::path::PathBuf;
//!
//! fn require_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(ProximaError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all proxima operations.
#[derive(Debug, Error)]
pub enum ProximaError {
    // =========================================================================
    // SCAN ERRORS
    // =========================================================================
    /// No radio adapter is available.
    #[error("Scan adapter unavailable: {0}. Ensure Bluetooth hardware is present and powered.")]
    ScanAdapterUnavailable(String),

    /// A scan pass failed.
    #[error("Scan failed: {0}")]
    ScanFailed(String),

    /// A recorded observation could not be decoded.
    #[error("Invalid observation record: {0}")]
    InvalidObservation(String),

    /// A finite scan source has been drained.
    #[error("Scan source exhausted")]
    ScanExhausted,

    // =========================================================================
    // ALERT ERRORS
    // =========================================================================
    /// The actuator is in use.
    #[error("Alert actuator is busy")]
    ActuatorBusy,

    /// The actuator is missing or failed.
    #[error("Alert actuator unavailable: {0}")]
    ActuatorUnavailable(String),

    /// The actuator refused the request.
    #[error("Alert request rejected: {0}")]
    AlertRejected(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    /// A beacon identity has no configuration.
    #[error("No configuration for beacon '{0}'")]
    BeaconNotConfigured(String),

    // =========================================================================
    // PERSISTENCE & I/O ERRORS
    // =========================================================================
    /// Data could not be persisted or read back.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for proxima operations.
pub type Result<T> = std::result::Result<T, ProximaError>;

impl ProximaError {
    /// Returns `true` if this error came from the scan source.
    #[inline]
    #[must_use]
    pub const fn is_scan_error(&self) -> bool {
        matches!(
            self,
            Self::ScanAdapterUnavailable(_)
                | Self::ScanFailed(_)
                | Self::InvalidObservation(_)
                | Self::ScanExhausted
        )
    }

    /// Returns `true` if this error came from the alert actuator.
    #[inline]
    #[must_use]
    pub const fn is_alert_error(&self) -> bool {
        matches!(
            self,
            Self::ActuatorBusy | Self::ActuatorUnavailable(_) | Self::AlertRejected(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::ConfigParseError(_)
                | Self::ConfigValidationError(_)
                | Self::BeaconNotConfigured(_)
        )
    }

    /// Returns `true` if this error is related to I/O or persistence.
    #[inline]
    #[must_use]
    pub const fn is_io_error(&self) -> bool {
        matches!(self, Self::PersistenceError(_) | Self::IoError(_))
    }

    /// Returns `true` if this error represents an expected operational state
    /// rather than a failure.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(self, Self::ScanExhausted | Self::ActuatorBusy)
    }

    /// Returns `true` if retrying later is likely to succeed without
    /// intervention.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ScanFailed(_) | Self::InvalidObservation(_) | Self::ActuatorBusy
        )
    }

    /// Returns a machine-readable error code for status reports.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ScanAdapterUnavailable(_) => "SCAN_ADAPTER_UNAVAILABLE",
            Self::ScanFailed(_) => "SCAN_FAILED",
            Self::InvalidObservation(_) => "INVALID_OBSERVATION",
            Self::ScanExhausted => "SCAN_EXHAUSTED",
            Self::ActuatorBusy => "ACTUATOR_BUSY",
            Self::ActuatorUnavailable(_) => "ACTUATOR_UNAVAILABLE",
            Self::AlertRejected(_) => "ALERT_REJECTED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::BeaconNotConfigured(_) => "BEACON_NOT_CONFIGURED",
            Self::PersistenceError(_) => "PERSISTENCE_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for ProximaError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path.into()),
            ConfigError::ReadError { path, source } => {
                Self::PersistenceError(format!("Failed to read {path}: {source}"))
            }
            ConfigError::WriteError { path, source } => {
                Self::PersistenceError(format!("Failed to write {path}: {source}"))
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::LoadError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::alert::AlertError> for ProximaError {
    fn from(err: crate::alert::AlertError) -> Self {
        use crate::alert::AlertError;
        match err {
            AlertError::Busy => Self::ActuatorBusy,
            AlertError::Unavailable { message } => Self::ActuatorUnavailable(message),
            AlertError::Rejected { message } => Self::AlertRejected(message),
        }
    }
}

impl From<crate::source::ScanError> for ProximaError {
    fn from(err: crate::source::ScanError) -> Self {
        use crate::source::ScanError;
        match err {
            ScanError::AdapterUnavailable { message } => Self::ScanAdapterUnavailable(message),
            ScanError::ScanFailed { message } => Self::ScanFailed(message),
            ScanError::InvalidRecord { line, message } => {
                Self::InvalidObservation(format!("line {line}: {message}"))
            }
            ScanError::Exhausted => Self::ScanExhausted,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::AlertError;
    use crate::config::ConfigError;
    use crate::source::ScanError;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_scan_error_classification() {
        assert!(ProximaError::ScanFailed("x".into()).is_scan_error());
        assert!(ProximaError::ScanExhausted.is_scan_error());
        assert!(!ProximaError::ActuatorBusy.is_scan_error());
    }

    #[test]
    fn test_alert_error_classification() {
        assert!(ProximaError::ActuatorBusy.is_alert_error());
        assert!(ProximaError::AlertRejected("intensity".into()).is_alert_error());
        assert!(!ProximaError::ConfigParseError("x".into()).is_alert_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(ProximaError::ConfigNotFound("/etc/proxima/config.toml".into()).is_config_error());
        assert!(ProximaError::BeaconNotConfigured("B1".into()).is_config_error());
        assert!(!ProximaError::IoError(IoErr::new(ErrorKind::Other, "x")).is_config_error());
    }

    #[test]
    fn test_expected_and_recoverable() {
        assert!(ProximaError::ScanExhausted.is_expected_state());
        assert!(!ProximaError::ScanExhausted.is_recoverable());
        assert!(ProximaError::ScanFailed("timeout".into()).is_recoverable());
        assert!(!ProximaError::ScanAdapterUnavailable("hci0".into()).is_recoverable());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ProximaError::ActuatorBusy.error_code(), "ACTUATOR_BUSY");
        assert_eq!(
            ProximaError::ConfigValidationError("x".into()).error_code(),
            "CONFIG_VALIDATION_ERROR"
        );
        assert_eq!(
            ProximaError::IoError(IoErr::new(ErrorKind::NotFound, "x")).error_code(),
            "IO_ERROR"
        );
    }

    #[test]
    fn test_from_config_error_joins_messages() {
        let err = ConfigError::MultipleValidationErrors(vec![
            ConfigError::ValidationError {
                field: "scan.filter_window".into(),
                message: "must be greater than 0".into(),
            },
            ConfigError::ValidationError {
                field: "beacons[0].identity".into(),
                message: "must not be empty".into(),
            },
        ]);
        let unified: ProximaError = err.into();
        assert!(unified.is_config_error());
        let text = unified.to_string();
        assert!(text.contains("scan.filter_window"));
        assert!(text.contains("; beacons[0].identity"));
    }

    #[test]
    fn test_from_alert_and_scan_errors() {
        let unified: ProximaError = AlertError::Unavailable {
            message: "gpio 17".into(),
        }
        .into();
        assert!(matches!(unified, ProximaError::ActuatorUnavailable(ref m) if m == "gpio 17"));

        let unified: ProximaError = ScanError::InvalidRecord {
            line: 4,
            message: "missing field".into(),
        }
        .into();
        assert_eq!(unified.error_code(), "INVALID_OBSERVATION");
        assert!(unified.to_string().contains("line 4"));
    }

    #[test]
    fn test_io_error_conversion() {
        let unified: ProximaError = IoErr::new(ErrorKind::PermissionDenied, "denied").into();
        assert!(unified.is_io_error());
    }
}

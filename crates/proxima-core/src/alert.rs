//! Alert actuator contract.
//!
//! The core never touches buzzer or vibration hardware. It drives an
//! [`AlertDriver`] supplied by the host, which must return immediately:
//! activation is fire-and-forget and the state machine polls for expiry
//! instead of waiting on the driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AlertMode;
use crate::types::Millis;

/// Whether configured beacons share one physical actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorPolicy {
    /// One actuator; a new alert preempts the running one.
    #[default]
    Shared,
    /// Independent output per beacon; alerts run side by side.
    PerBeacon,
}

/// Parameters of one activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRequest {
    /// Beacon the alert is for. Shared-actuator drivers may ignore it.
    pub identity: String,
    /// Actuators to drive.
    pub mode: AlertMode,
    /// Intensity, 1 to 5.
    pub intensity: u8,
    /// Intended run time. The state machine deactivates explicitly; drivers
    /// may use this as a safety cut-off.
    pub duration_hint_ms: Millis,
}

/// Errors a driver may report on activation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    /// The actuator is already in use and cannot be retargeted now.
    #[error("Alert actuator is busy")]
    Busy,

    /// The actuator is missing or failed to initialise.
    #[error("Alert actuator unavailable: {message}")]
    Unavailable {
        /// Driver-provided detail.
        message: String,
    },

    /// The driver refused the request parameters.
    #[error("Alert request rejected: {message}")]
    Rejected {
        /// Driver-provided detail.
        message: String,
    },
}

/// Result type for driver operations.
pub type AlertResult<T> = std::result::Result<T, AlertError>;

/// Output side of the alert system.
pub trait AlertDriver {
    /// Start driving the actuator. Must not block.
    ///
    /// # Errors
    ///
    /// Returns an [`AlertError`] if the actuator cannot be driven.
    fn activate(&mut self, request: &AlertRequest) -> AlertResult<()>;

    /// Stop the output started for `identity`. Must not block.
    fn deactivate(&mut self, identity: &str);
}

impl<D: AlertDriver + ?Sized> AlertDriver for Box<D> {
    fn activate(&mut self, request: &AlertRequest) -> AlertResult<()> {
        (**self).activate(request)
    }

    fn deactivate(&mut self, identity: &str) {
        (**self).deactivate(identity);
    }
}

/// Record of actuator failures, reported through the status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFaults {
    /// Number of failed activations.
    pub failures: u64,
    /// Message of the most recent failure.
    pub last_message: Option<String>,
    /// When the most recent failure happened.
    pub last_failure_at: Option<Millis>,
}

impl AlertFaults {
    /// Count a failure.
    pub fn record(&mut self, error: &AlertError, at: Millis) {
        self.failures += 1;
        self.last_message = Some(error.to_string());
        self.last_failure_at = Some(at);
    }
}

/// A driver call captured by [`RecordingDriver`].
#[cfg(any(test, feature = "mock-driver"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    /// `activate` was called.
    Activate(AlertRequest),
    /// `deactivate` was called.
    Deactivate(String),
}

/// In-memory driver that records every call and can be told to fail.
#[cfg(any(test, feature = "mock-driver"))]
#[derive(Debug, Default)]
pub struct RecordingDriver {
    calls: Vec<DriverCall>,
    fail_next: Vec<AlertError>,
}

#[cfg(any(test, feature = "mock-driver"))]
impl RecordingDriver {
    /// Empty driver that accepts every activation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next activation fail with `error`. Queued failures are used
    /// in order.
    pub fn fail_next(&mut self, error: AlertError) {
        self.fail_next.push(error);
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    /// Requests passed to `activate`, failed ones included.
    pub fn activations(&self) -> impl Iterator<Item = &AlertRequest> {
        self.calls.iter().filter_map(|c| match c {
            DriverCall::Activate(request) => Some(request),
            DriverCall::Deactivate(_) => None,
        })
    }

    /// Identities passed to `deactivate`.
    pub fn deactivations(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().filter_map(|c| match c {
            DriverCall::Deactivate(identity) => Some(identity.as_str()),
            DriverCall::Activate(_) => None,
        })
    }

    /// Forget recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }
}

#[cfg(any(test, feature = "mock-driver"))]
impl AlertDriver for RecordingDriver {
    fn activate(&mut self, request: &AlertRequest) -> AlertResult<()> {
        self.calls.push(DriverCall::Activate(request.clone()));
        if self.fail_next.is_empty() {
            Ok(())
        } else {
            Err(self.fail_next.remove(0))
        }
    }

    fn deactivate(&mut self, identity: &str) {
        self.calls.push(DriverCall::Deactivate(identity.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AlertRequest {
        AlertRequest {
            identity: "B1".into(),
            mode: AlertMode::Both,
            intensity: 3,
            duration_hint_ms: 1000,
        }
    }

    #[test]
    fn test_faults_record_count_and_last_message() {
        let mut faults = AlertFaults::default();
        faults.record(&AlertError::Busy, 10);
        faults.record(
            &AlertError::Unavailable {
                message: "pwm channel missing".into(),
            },
            20,
        );
        assert_eq!(faults.failures, 2);
        assert_eq!(faults.last_failure_at, Some(20));
        assert!(faults.last_message.unwrap().contains("pwm channel missing"));
    }

    #[test]
    fn test_recording_driver_fails_in_order() {
        let mut driver = RecordingDriver::new();
        driver.fail_next(AlertError::Busy);
        assert_eq!(driver.activate(&request()), Err(AlertError::Busy));
        assert_eq!(driver.activate(&request()), Ok(()));
        driver.deactivate("B1");

        assert_eq!(driver.activations().count(), 2);
        assert_eq!(driver.deactivations().collect::<Vec<_>>(), vec!["B1"]);
    }

    #[test]
    fn test_boxed_driver_delegates() {
        let mut boxed: Box<dyn AlertDriver> = Box::new(RecordingDriver::new());
        assert!(boxed.activate(&request()).is_ok());
        boxed.deactivate("B1");
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: ActuatorPolicy = serde_json::from_str("\"per_beacon\"").unwrap();
        assert_eq!(policy, ActuatorPolicy::PerBeacon);
    }
}

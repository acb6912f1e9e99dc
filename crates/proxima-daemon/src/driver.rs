//! Alert driver that reports actuator commands as structured logs.
//!
//! Stands in for the buzzer and vibration hardware. Every command is logged
//! under [`ACTUATOR_TARGET`], which production logging also routes to its
//! own file.

use std::collections::BTreeSet;

use proxima_core::{AlertDriver, AlertRequest, AlertResult};
use tracing::info;

use crate::logging::ACTUATOR_TARGET;

/// [`AlertDriver`] that logs instead of driving hardware.
#[derive(Debug, Default)]
pub struct LoggingDriver {
    engaged: BTreeSet<String>,
    activations: u64,
}

impl LoggingDriver {
    /// New driver with nothing engaged.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identities whose output is currently engaged.
    pub fn engaged(&self) -> impl Iterator<Item = &str> {
        self.engaged.iter().map(String::as_str)
    }

    /// Total activations accepted.
    #[must_use]
    pub const fn activations(&self) -> u64 {
        self.activations
    }
}

impl AlertDriver for LoggingDriver {
    fn activate(&mut self, request: &AlertRequest) -> AlertResult<()> {
        self.activations += 1;
        self.engaged.insert(request.identity.clone());
        info!(
            target: ACTUATOR_TARGET,
            identity = %request.identity,
            buzzer = request.mode.uses_primary(),
            vibration = request.mode.uses_secondary(),
            intensity = request.intensity,
            duration_ms = request.duration_hint_ms,
            "Actuator on"
        );
        Ok(())
    }

    fn deactivate(&mut self, identity: &str) {
        if self.engaged.remove(identity) {
            info!(target: ACTUATOR_TARGET, identity, "Actuator off");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_core::AlertMode;

    #[test]
    fn test_tracks_engaged_outputs() {
        let mut driver = LoggingDriver::new();
        let request = AlertRequest {
            identity: "B1".into(),
            mode: AlertMode::Secondary,
            intensity: 2,
            duration_hint_ms: 500,
        };
        assert!(driver.activate(&request).is_ok());
        assert_eq!(driver.engaged().collect::<Vec<_>>(), vec!["B1"]);

        driver.deactivate("B1");
        driver.deactivate("B1");
        assert_eq!(driver.engaged().count(), 0);
        assert_eq!(driver.activations(), 1);
    }
}

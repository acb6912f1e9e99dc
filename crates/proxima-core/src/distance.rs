//! RSSI to distance conversion.
//!
//! Distances come from the log-distance path-loss model
//!
//! ```text
//! distance_m = 10 ^ ((tx_power_dbm - rssi) / (10 * path_loss_exponent))
//! ```
//!
//! followed by a contact offset so that a beacon touching the collar reads
//! 0 cm. Every constant lives in [`Calibration`] and is tuned per beacon
//! model, never derived at runtime.

use serde::{Deserialize, Serialize};

/// Calibration constants for the path-loss model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Calibration {
    /// Expected RSSI at the 1 m reference distance, in dBm.
    pub tx_power_dbm: f32,

    /// Environment path-loss exponent (2.0 is free space).
    pub path_loss_exponent: f32,

    /// Metres subtracted from the raw model output so contact reads 0.
    pub contact_offset_m: f32,

    /// Upper bound on reported distances, in centimetres.
    pub max_distance_cm: f32,
}

impl Default for Calibration {
    /// Short-range indoor calibration for the stock collar beacons.
    fn default() -> Self {
        Self {
            tx_power_dbm: -65.0,
            path_loss_exponent: 1.8,
            contact_offset_m: 0.01,
            max_distance_cm: 1000.0,
        }
    }
}

/// Stateless converter from filtered RSSI to centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DistanceEstimator {
    calibration: Calibration,
}

impl DistanceEstimator {
    /// Create an estimator with the given calibration.
    #[must_use]
    pub const fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    /// The calibration in use.
    #[must_use]
    pub const fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Estimated distance in centimetres for a filtered RSSI value.
    ///
    /// The result is always finite and within `0..=max_distance_cm`. A
    /// non-negative or NaN input is physically meaningless and yields 0.
    #[must_use]
    pub fn estimate(&self, filtered_signal: f32) -> f32 {
        if filtered_signal.is_nan() || filtered_signal >= 0.0 {
            return 0.0;
        }

        let Calibration {
            tx_power_dbm,
            path_loss_exponent,
            contact_offset_m,
            max_distance_cm,
        } = self.calibration;

        let metres = 10f32.powf((tx_power_dbm - filtered_signal) / (10.0 * path_loss_exponent));
        let centimetres = (metres - contact_offset_m).max(0.0) * 100.0;

        if centimetres.is_nan() {
            return 0.0;
        }
        centimetres.min(max_distance_cm).max(0.0)
    }

    /// Inverse of [`estimate`](Self::estimate): the RSSI at which a beacon
    /// would read as `distance_cm`.
    ///
    /// Used to derive RSSI trigger levels from configured distances and to
    /// synthesise traces.
    #[must_use]
    pub fn signal_for_distance(&self, distance_cm: f32) -> f32 {
        let metres = distance_cm.max(0.0) / 100.0 + self.calibration.contact_offset_m;
        self.calibration.tx_power_dbm - 10.0 * self.calibration.path_loss_exponent * metres.log10()
    }
}

/// Rough confidence in a reading, from signal strength alone.
///
/// Strong signals are dominated by the direct path and estimate well; weak
/// ones are mostly multipath.
#[must_use]
pub fn confidence(filtered_signal: f32) -> f32 {
    match filtered_signal {
        s if s >= -30.0 => 1.0,
        s if s >= -60.0 => 0.8,
        s if s >= -80.0 => 0.6,
        s if s >= -90.0 => 0.3,
        _ => 0.1,
    }
}

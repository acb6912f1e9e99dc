//! Radio scan source contract.
//!
//! The BLE stack is owned by the host. It hands batches of observations to
//! the core through a [`ScanSource`], polled from the scan loop.

use thiserror::Error;

use crate::types::{BeaconObservation, Millis};

/// Errors reported by a scan source.
#[derive(Debug, Error)]
pub enum ScanError {
    /// No radio adapter is present or powered.
    #[error("Scan adapter unavailable: {message}")]
    AdapterUnavailable {
        /// Source-provided detail.
        message: String,
    },

    /// A scan pass failed; the next poll may succeed.
    #[error("Scan failed: {message}")]
    ScanFailed {
        /// Source-provided detail.
        message: String,
    },

    /// A recorded observation could not be decoded.
    #[error("Invalid observation record at line {line}: {message}")]
    InvalidRecord {
        /// 1-based line number in the trace.
        line: usize,
        /// Decoder detail.
        message: String,
    },

    /// The source has no more observations and never will.
    #[error("Scan source exhausted")]
    Exhausted,
}

impl ScanError {
    /// Whether polling again later may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::ScanFailed { .. } | Self::InvalidRecord { .. })
    }
}

/// Result type for scan operations.
pub type ScanResult<T> = std::result::Result<T, ScanError>;

/// Producer of beacon observations.
///
/// `next_batch` must not block: it returns whatever has been observed up to
/// `now`, possibly nothing.
pub trait ScanSource {
    /// Observations received since the previous poll, up to `now`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Exhausted`] once a finite source is drained, or
    /// another [`ScanError`] if the radio failed.
    fn next_batch(&mut self, now: Millis) -> ScanResult<Vec<BeaconObservation>>;
}

impl<S: ScanSource + ?Sized> ScanSource for Box<S> {
    fn next_batch(&mut self, now: Millis) -> ScanResult<Vec<BeaconObservation>> {
        (**self).next_batch(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<BeaconObservation>);

    impl ScanSource for Fixed {
        fn next_batch(&mut self, _now: Millis) -> ScanResult<Vec<BeaconObservation>> {
            if self.0.is_empty() {
                return Err(ScanError::Exhausted);
            }
            Ok(std::mem::take(&mut self.0))
        }
    }

    #[test]
    fn test_boxed_source_delegates() {
        let mut source: Box<dyn ScanSource> =
            Box::new(Fixed(vec![BeaconObservation::new("B1", -60, 0)]));
        assert_eq!(source.next_batch(0).unwrap().len(), 1);
        assert!(matches!(source.next_batch(1), Err(ScanError::Exhausted)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(ScanError::ScanFailed {
            message: "hci timeout".into()
        }
        .is_transient());
        assert!(!ScanError::Exhausted.is_transient());
        assert!(!ScanError::AdapterUnavailable {
            message: "hci0 down".into()
        }
        .is_transient());
    }
}

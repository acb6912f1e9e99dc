//! Shared types passed between the scan source, the registry and the state machine.

use serde::{Deserialize, Serialize};

/// Monotonic timestamp in milliseconds.
///
/// The origin is arbitrary (device boot, daemon start); only differences
/// between two values are meaningful.
pub type Millis = u64;

/// A single beacon sighting delivered by the radio scan source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconObservation {
    /// Opaque identity key, usually the beacon's MAC address.
    pub identity: String,

    /// Advertised local name, if the advertisement carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Received signal strength in dBm. Negative; closer to 0 is stronger.
    pub raw_signal: i16,

    /// When the advertisement was received.
    pub observed_at: Millis,
}

impl BeaconObservation {
    /// Create an observation without an advertised name.
    pub fn new(identity: impl Into<String>, raw_signal: i16, observed_at: Millis) -> Self {
        Self {
            identity: identity.into(),
            name: None,
            raw_signal,
            observed_at,
        }
    }

    /// Attach the advertised local name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Elapsed milliseconds from `since` to `now`, saturating at zero when the
/// clock appears to run backwards.
#[inline]
#[must_use]
pub const fn elapsed(now: Millis, since: Millis) -> Millis {
    now.saturating_sub(since)
}

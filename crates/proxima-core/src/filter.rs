//! Moving-average smoothing of raw RSSI readings.
//!
//! Each tracked beacon owns one [`SignalFilter`]. Readings are written into a
//! fixed-size circular buffer and the filter output is the arithmetic mean of
//! the slots filled so far.

/// Default number of samples averaged per beacon.
pub const DEFAULT_FILTER_WINDOW: usize = 5;

/// Fixed-capacity circular moving-average filter.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    samples: Box<[i16]>,
    next: usize,
    filled: usize,
}

impl SignalFilter {
    /// Create a filter averaging over `window` samples.
    ///
    /// A window of zero is treated as one.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            samples: vec![0; window.max(1)].into_boxed_slice(),
            next: 0,
            filled: 0,
        }
    }

    /// Number of slots in the buffer.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Number of samples currently contributing to the mean.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.filled
    }

    /// Whether no sample has been added since creation or the last reset.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Record a raw reading and return the updated mean.
    pub fn add_sample(&mut self, raw: i16) -> f32 {
        self.samples[self.next] = raw;
        self.next = (self.next + 1) % self.samples.len();
        if self.filled < self.samples.len() {
            self.filled += 1;
        }
        self.mean()
    }

    /// Current mean of the filled slots, or `None` before the first sample.
    #[must_use]
    pub fn current(&self) -> Option<f32> {
        (self.filled > 0).then(|| self.mean())
    }

    /// True once at least half the window (rounded up) has been filled.
    ///
    /// Output before this point is provisional.
    #[must_use]
    pub fn has_enough_samples(&self) -> bool {
        self.filled >= self.samples.len().div_ceil(2)
    }

    /// Forget every sample.
    pub fn reset(&mut self) {
        self.next = 0;
        self.filled = 0;
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self) -> f32 {
        // The oldest slots are overwritten first, so while the buffer is
        // still filling the valid samples are exactly the leading ones.
        let sum: i32 = self.samples[..self.filled].iter().map(|&s| i32::from(s)).sum();
        sum as f32 / self.filled as f32
    }
}

impl Default for SignalFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FILTER_WINDOW)
    }
}

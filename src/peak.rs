//! Rolling peak of recent switch power readings.
//!
//! The optimizer sizes the charge target against the worst load seen in the
//! last few seconds rather than the latest reading, so a kettle that cycles
//! on and off does not cause the target to oscillate.
//!
//! The window is cleared whenever the switch turns off or trips: a peak must
//! never blend load from before and after such an event.
//!
//! # Example
//!
//! ```rust
//! use ac_limiter::peak::RollingPeakTracker;
//!
//! let mut tracker = RollingPeakTracker::new(10_000);
//! tracker.record(900.0, 0);
//! tracker.record(400.0, 5_000);
//!
//! assert_eq!(tracker.prune_and_peak(9_000), 900.0);
//! // The 900 W sample is now older than the window
//! assert_eq!(tracker.prune_and_peak(10_001), 400.0);
//!
//! tracker.clear();
//! assert_eq!(tracker.prune_and_peak(10_001), 0.0);
//! ```

use std::collections::VecDeque;

/// A single power reading.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowerSample {
    /// When the reading arrived (milliseconds).
    pub at_ms: u64,
    /// Instantaneous power in watts.
    pub power_w: f64,
}

/// Time-windowed set of power samples.
#[derive(Clone, Debug)]
pub struct RollingPeakTracker {
    window_ms: u64,
    samples: VecDeque<PowerSample>,
}

impl RollingPeakTracker {
    /// Create an empty tracker keeping samples for `window_ms`.
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            samples: VecDeque::new(),
        }
    }

    /// Append a sample, evicting samples that fell out of the window.
    ///
    /// A reading identical to the previous one within the same second is
    /// dropped. Returns `true` if the sample was stored.
    pub fn record(&mut self, power_w: f64, now_ms: u64) -> bool {
        self.prune(now_ms);
        if let Some(last) = self.samples.back() {
            if last.power_w == power_w && last.at_ms / 1000 == now_ms / 1000 {
                return false;
            }
        }
        self.samples.push_back(PowerSample {
            at_ms: now_ms,
            power_w,
        });
        true
    }

    /// Discard samples older than the window and return the largest remaining
    /// power, or 0 if the window is empty.
    pub fn prune_and_peak(&mut self, now_ms: u64) -> f64 {
        self.prune(now_ms);
        self.samples
            .iter()
            .map(|s| s.power_w)
            .fold(None, |peak: Option<f64>, p| {
                Some(peak.map_or(p, |current| current.max(p)))
            })
            .unwrap_or(0.0)
    }

    fn prune(&mut self, now_ms: u64) {
        let window_ms = self.window_ms;
        self.samples
            .retain(|s| now_ms.saturating_sub(s.at_ms) <= window_ms);
    }

    /// Empty the window.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Number of samples held as of the last [`record`](Self::record) or
    /// [`prune_and_peak`](Self::prune_and_peak).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if no samples are held.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in arrival order.
    pub fn samples(&self) -> impl Iterator<Item = &PowerSample> {
        self.samples.iter()
    }
}

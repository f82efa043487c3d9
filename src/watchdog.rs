//! Liveness checks for the switch and telemetry subscriptions.
//!
//! A watchdog fires when neither activity nor a previous repair has happened
//! within its timeout, so a silent link is repaired once per timeout rather
//! than on every tick. Watchdogs only report; the controller performs the
//! re-subscription.

/// One staleness check.
#[derive(Clone, Debug)]
pub struct Watchdog {
    name: &'static str,
    timeout_ms: u64,
    last_repair_at: u64,
}

impl Watchdog {
    /// Create a watchdog that considers `now_ms` its last repair.
    pub fn new(name: &'static str, timeout_ms: u64, now_ms: u64) -> Self {
        Self {
            name,
            timeout_ms,
            last_repair_at: now_ms,
        }
    }

    /// Label used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Time since the later of `last_activity_ms` and the last repair.
    pub fn silence(&self, last_activity_ms: u64, now_ms: u64) -> u64 {
        now_ms.saturating_sub(last_activity_ms.max(self.last_repair_at))
    }

    /// Returns true if a repair is due and records it as done.
    pub fn check(&mut self, last_activity_ms: u64, now_ms: u64) -> bool {
        if self.silence(last_activity_ms, now_ms) >= self.timeout_ms {
            self.last_repair_at = now_ms;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_timeout_while_silent() {
        let mut dog = Watchdog::new("switch", 10_000, 0);
        assert!(!dog.check(0, 9_999));
        assert!(dog.check(0, 10_000));
        // Repaired: quiet until another full timeout passes
        assert!(!dog.check(0, 11_000));
        assert!(!dog.check(0, 19_999));
        assert!(dog.check(0, 20_000));
    }

    #[test]
    fn keeps_its_label() {
        assert_eq!(Watchdog::new("switch", 1_000, 0).name(), "switch");
    }

    #[test]
    fn activity_postpones() {
        let mut dog = Watchdog::new("telemetry", 10_000, 0);
        assert!(!dog.check(8_000, 15_000));
        assert_eq!(dog.silence(8_000, 15_000), 7_000);
        assert!(dog.check(8_000, 18_000));
    }
}

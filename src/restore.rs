//! Re-energizing the switch after an overcurrent trip.
//!
//! Restoring power and clearing the fault are separate things. A restore
//! commands a conservative charge target and turns the relay back on; the
//! latch stays set until the switch itself reports the clear.
//!
//! # Checks, in order
//!
//! | # | Condition | Result |
//! |---|-----------|--------|
//! | 0 | relay on and `init_charge_w` already commanded | [`RestoreDecision::AlreadyRestored`] |
//! | 1 | trip younger than `restore_delay_ms` | [`RestoreDecision::TooSoon`] |
//! | 2 | last attempt younger than [`RESTORE_PACING_MS`] | [`RestoreDecision::Paced`] |
//! | 3 | telemetry older than `quota_max_age_ms` | [`RestoreDecision::StaleTelemetry`] |
//! | 4 | `init + ac_out + standby >= limit` | [`RestoreDecision::NoHeadroom`] |
//! | 5 | otherwise | [`RestoreDecision::Proceed`] |

use crate::config::ControlConfig;
use crate::state::ControlState;

/// Minimum spacing between restore attempts, independent of the restore delay.
pub const RESTORE_PACING_MS: u64 = 3_000;

/// Outcome of a restore evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RestoreDecision {
    /// The relay is back on and the station already runs at the restore
    /// target; nothing left to do until the clear arrives.
    AlreadyRestored,
    /// Still inside the post-trip delay.
    TooSoon {
        /// Time left in the delay.
        remaining_ms: u64,
    },
    /// A previous attempt was too recent.
    Paced {
        /// Time left until the next attempt.
        remaining_ms: u64,
    },
    /// Station telemetry is too old to decide on.
    StaleTelemetry {
        /// Age of the last telemetry receipt.
        age_ms: u64,
    },
    /// Restoring at the initial charge power would exceed the limit.
    NoHeadroom {
        /// Projected draw after restore.
        expected_draw_w: f64,
        /// Switch limit.
        limit_w: f64,
    },
    /// Safe to restore.
    Proceed {
        /// Projected draw after restore.
        expected_draw_w: f64,
        /// Switch limit.
        limit_w: f64,
    },
}

/// Evaluates whether a latched system may be re-energized.
#[derive(Clone, Debug)]
pub struct RestoreController {
    restore_delay_ms: u64,
    quota_max_age_ms: u64,
    init_charge_w: u32,
}

impl RestoreController {
    /// Build from the control thresholds.
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            restore_delay_ms: config.restore_delay_ms,
            quota_max_age_ms: config.quota_max_age_ms,
            init_charge_w: config.init_charge_w,
        }
    }

    /// Charge target used for a restore.
    pub fn init_charge_w(&self) -> u32 {
        self.init_charge_w
    }

    /// Run the checks against the current state. Pure; the caller acts on
    /// [`RestoreDecision::Proceed`].
    pub fn evaluate(&self, state: &ControlState, now_ms: u64) -> RestoreDecision {
        if state.switch_on && state.station_charge_w == self.init_charge_w {
            return RestoreDecision::AlreadyRestored;
        }

        let since_trip = state.time_since_trip(now_ms);
        if since_trip < self.restore_delay_ms {
            return RestoreDecision::TooSoon {
                remaining_ms: self.restore_delay_ms - since_trip,
            };
        }

        let since_attempt = now_ms.saturating_sub(state.last_restore_attempt_at);
        if since_attempt < RESTORE_PACING_MS {
            return RestoreDecision::Paced {
                remaining_ms: RESTORE_PACING_MS - since_attempt,
            };
        }

        let age_ms = state.telemetry_age(now_ms);
        if age_ms > self.quota_max_age_ms {
            return RestoreDecision::StaleTelemetry { age_ms };
        }

        let expected_draw_w =
            f64::from(self.init_charge_w) + state.station_ac_out_w + state.station_standby_w;
        let limit_w = state.limit_w();
        if expected_draw_w >= limit_w {
            RestoreDecision::NoHeadroom {
                expected_draw_w,
                limit_w,
            }
        } else {
            RestoreDecision::Proceed {
                expected_draw_w,
                limit_w,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latched(ac_out_w: f64) -> (RestoreController, ControlState) {
        let control = ControlConfig::default()
            .with_init_charge_w(400)
            .with_restore_delay_ms(30_000)
            .with_quota_max_age_ms(30_000);
        let mut state = ControlState::new(&control, 0);
        state.current_limit_amps = 6.0;
        state.voltage = 230.0;
        state.station_ac_out_w = ac_out_w;
        state.station_standby_w = 20.0;
        state.trip(1_000);
        (RestoreController::new(&control), state)
    }

    #[test]
    fn proceeds_with_headroom() {
        let (restore, mut state) = latched(200.0);
        state.last_quota_at = 40_000;
        assert_eq!(
            restore.evaluate(&state, 41_000),
            RestoreDecision::Proceed {
                expected_draw_w: 620.0,
                limit_w: 1380.0
            }
        );
    }

    #[test]
    fn no_headroom_is_a_noop() {
        let (restore, mut state) = latched(1000.0);
        state.last_quota_at = 40_000;
        assert_eq!(
            restore.evaluate(&state, 41_000),
            RestoreDecision::NoHeadroom {
                expected_draw_w: 1420.0,
                limit_w: 1380.0
            }
        );
    }

    #[test]
    fn exactly_at_limit_is_no_headroom() {
        let (restore, mut state) = latched(960.0);
        state.last_quota_at = 40_000;
        assert!(matches!(
            restore.evaluate(&state, 41_000),
            RestoreDecision::NoHeadroom { .. }
        ));
    }

    #[test]
    fn waits_for_restore_delay() {
        let (restore, mut state) = latched(0.0);
        state.last_quota_at = 30_000;
        assert_eq!(
            restore.evaluate(&state, 30_999),
            RestoreDecision::TooSoon { remaining_ms: 1 }
        );
    }

    #[test]
    fn attempts_are_paced() {
        let (restore, mut state) = latched(0.0);
        state.last_quota_at = 40_000;
        state.last_restore_attempt_at = 39_000;
        assert_eq!(
            restore.evaluate(&state, 41_000),
            RestoreDecision::Paced { remaining_ms: 1_000 }
        );
    }

    #[test]
    fn stale_telemetry_blocks() {
        let (restore, mut state) = latched(0.0);
        state.last_quota_at = 5_000;
        assert_eq!(
            restore.evaluate(&state, 41_000),
            RestoreDecision::StaleTelemetry { age_ms: 36_000 }
        );
    }

    #[test]
    fn unknown_limit_never_proceeds() {
        let (restore, mut state) = latched(0.0);
        state.current_limit_amps = 0.0;
        state.last_quota_at = 40_000;
        assert!(matches!(
            restore.evaluate(&state, 41_000),
            RestoreDecision::NoHeadroom { .. }
        ));
    }

    #[test]
    fn relay_on_at_restore_target_is_done() {
        let (restore, mut state) = latched(0.0);
        state.last_quota_at = 40_000;
        state.switch_on = true;
        state.station_charge_w = 400;
        assert_eq!(restore.evaluate(&state, 41_000), RestoreDecision::AlreadyRestored);
    }

    #[test]
    fn relay_on_above_restore_target_still_restores() {
        // Relay came back on by itself while the pre-trip target is still active
        let (restore, mut state) = latched(0.0);
        state.last_quota_at = 40_000;
        state.switch_on = true;
        state.station_charge_w = 1200;
        assert!(matches!(
            restore.evaluate(&state, 41_000),
            RestoreDecision::Proceed { .. }
        ));
    }
}

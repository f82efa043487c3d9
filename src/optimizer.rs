//! Headroom-based charge target selection.
//!
//! While the latch is clear and the switch is on, the optimizer runs once per
//! `optimize_interval_ms` and sizes the charge target to the room left under
//! the switch limit:
//!
//! ```text
//! other  = estimate_other_load(...)            (>= 0, whole watts)
//! target = clamp(quantize(limit - other - buffer), min, max)
//! send if |target - station_charge_w| >= min_delta
//! ```
//!
//! # Load estimate
//!
//! | Condition | Estimate |
//! |-----------|----------|
//! | peak > 0, switch on, `0 <= peak - charge <= 2000` | `peak - charge` (metered) |
//! | anything else | `ac_out + standby` (telemetry) |

use crate::config::ControlConfig;
use crate::gateway::CommandGateway;
use crate::state::ControlState;

/// A metered "other load" above this is treated as a bad reading.
pub const IMPLAUSIBLE_OTHER_LOAD_W: f64 = 2000.0;

/// Where the other-load figure came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoadSource {
    /// Rolling peak minus the commanded charge power.
    Metered,
    /// Station telemetry only.
    Telemetry,
}

/// Estimated load on the circuit that is not the station's own charging.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadEstimate {
    /// Non-negative whole watts.
    pub other_w: f64,
    /// How it was obtained.
    pub source: LoadSource,
}

/// Estimate other load from the rolling peak, falling back to telemetry when
/// the metered figure is missing or implausible.
pub fn estimate_other_load(
    peak_w: f64,
    switch_on: bool,
    station_charge_w: u32,
    station_ac_out_w: f64,
    station_standby_w: f64,
) -> LoadEstimate {
    let telemetry = station_ac_out_w + station_standby_w;

    let (raw, source) = if peak_w > 0.0 && switch_on {
        let metered = peak_w - f64::from(station_charge_w);
        if (0.0..=IMPLAUSIBLE_OTHER_LOAD_W).contains(&metered) {
            (metered, LoadSource::Metered)
        } else {
            (telemetry, LoadSource::Telemetry)
        }
    } else {
        (telemetry, LoadSource::Telemetry)
    };

    LoadEstimate {
        other_w: raw.max(0.0).round(),
        source,
    }
}

/// What one optimizer run concluded.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OptimizerPlan {
    /// The switch limit has not been read yet.
    LimitUnknown,
    /// Target differs too little from the current command.
    Hold {
        /// Computed target.
        target_w: u32,
        /// Signed difference from the current command.
        delta_w: i64,
    },
    /// Target worth commanding.
    Adjust {
        /// Computed target.
        target_w: u32,
        /// Signed difference from the current command.
        delta_w: i64,
    },
}

/// Optimizer thresholds.
#[derive(Clone, Debug)]
pub struct Optimizer {
    interval_ms: u64,
    safety_buffer_w: u32,
    min_delta_w: u32,
}

impl Optimizer {
    /// Build from the control thresholds.
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            interval_ms: config.optimize_interval_ms,
            safety_buffer_w: config.safety_buffer_w,
            min_delta_w: config.min_delta_w,
        }
    }

    /// Returns true if the optimizer should run on this tick.
    pub fn due(&self, state: &ControlState, now_ms: u64) -> bool {
        !state.overcurrent()
            && state.switch_on
            && now_ms.saturating_sub(state.last_optimize_at) >= self.interval_ms
    }

    /// Compute the target for the current state.
    pub fn plan(&self, state: &ControlState, gateway: &CommandGateway) -> (LoadEstimate, OptimizerPlan) {
        let estimate = estimate_other_load(
            state.peak_w,
            state.switch_on,
            state.station_charge_w,
            state.station_ac_out_w,
            state.station_standby_w,
        );

        let limit_w = state.limit_w();
        if limit_w <= 0.0 {
            return (estimate, OptimizerPlan::LimitUnknown);
        }

        let raw = limit_w - estimate.other_w - f64::from(self.safety_buffer_w);
        let target_w = gateway.clamp_target(raw);
        let delta_w = i64::from(target_w) - i64::from(state.station_charge_w);

        let plan = if delta_w.unsigned_abs() >= u64::from(self.min_delta_w) {
            OptimizerPlan::Adjust { target_w, delta_w }
        } else {
            OptimizerPlan::Hold { target_w, delta_w }
        };
        (estimate, plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;

    fn fixture(charge_w: u32) -> (Optimizer, CommandGateway, ControlState) {
        let control = ControlConfig::default();
        let mut state = ControlState::new(&control, 0);
        state.switch_on = true;
        state.current_limit_amps = 6.0;
        state.voltage = 230.0;
        state.station_charge_w = charge_w;
        (
            Optimizer::new(&control),
            CommandGateway::new(&control, &StationConfig::default(), 1),
            state,
        )
    }

    // ========================================================================
    // Load estimate
    // ========================================================================

    #[test]
    fn metered_estimate_subtracts_charge() {
        let e = estimate_other_load(1260.4, true, 960, 50.0, 20.0);
        assert_eq!(e, LoadEstimate { other_w: 300.0, source: LoadSource::Metered });
    }

    #[test]
    fn negative_metered_estimate_falls_back() {
        // Meter has not caught up with a freshly raised command
        let e = estimate_other_load(400.0, true, 960, 250.0, 20.0);
        assert_eq!(e, LoadEstimate { other_w: 270.0, source: LoadSource::Telemetry });
    }

    #[test]
    fn implausible_metered_estimate_falls_back() {
        let e = estimate_other_load(3500.0, true, 400, 100.0, 20.0);
        assert_eq!(e.source, LoadSource::Telemetry);
        assert_eq!(e.other_w, 120.0);

        let edge = estimate_other_load(2400.0, true, 400, 100.0, 20.0);
        assert_eq!(edge, LoadEstimate { other_w: 2000.0, source: LoadSource::Metered });
    }

    #[test]
    fn no_peak_or_switch_off_uses_telemetry() {
        assert_eq!(estimate_other_load(0.0, true, 400, 80.4, 20.0).source, LoadSource::Telemetry);
        assert_eq!(estimate_other_load(900.0, false, 400, 80.4, 20.0).other_w, 100.0);
    }

    // ========================================================================
    // Plan
    // ========================================================================

    #[test]
    fn delta_at_threshold_adjusts() {
        let (opt, gw, mut state) = fixture(960);
        state.station_ac_out_w = 280.0;
        state.station_standby_w = 20.0;
        let (estimate, plan) = opt.plan(&state, &gw);
        assert_eq!(estimate.other_w, 300.0);
        assert_eq!(plan, OptimizerPlan::Adjust { target_w: 980, delta_w: 20 });
    }

    #[test]
    fn small_delta_holds() {
        let (opt, gw, mut state) = fixture(975);
        state.station_ac_out_w = 280.0;
        state.station_standby_w = 20.0;
        let (_, plan) = opt.plan(&state, &gw);
        assert_eq!(plan, OptimizerPlan::Hold { target_w: 980, delta_w: 5 });
    }

    #[test]
    fn heavy_other_load_drives_target_to_minimum() {
        let (opt, gw, mut state) = fixture(800);
        state.station_ac_out_w = 1500.0;
        let (_, plan) = opt.plan(&state, &gw);
        assert_eq!(plan, OptimizerPlan::Adjust { target_w: 200, delta_w: -600 });
    }

    #[test]
    fn unknown_limit_skips() {
        let (opt, gw, mut state) = fixture(400);
        state.current_limit_amps = 0.0;
        assert_eq!(opt.plan(&state, &gw).1, OptimizerPlan::LimitUnknown);
    }

    #[test]
    fn due_requires_clear_latch_switch_on_and_interval() {
        let (opt, _, mut state) = fixture(400);
        assert!(!opt.due(&state, 4_999));
        assert!(opt.due(&state, 5_000));

        state.switch_on = false;
        assert!(!opt.due(&state, 10_000));

        state.switch_on = true;
        state.trip(6_000);
        state.switch_on = true;
        assert!(!opt.due(&state, 20_000));
    }
}

//! The single mutable aggregate owned by the control loop.
//!
//! `ControlState` is only ever touched from inside one handler at a time, so
//! it carries no locks. The overcurrent latch is private: the only ways to
//! change it are [`ControlState::trip`] and [`ControlState::clear_trip`],
//! which the controller calls for the matching switch notifications and
//! nothing else.

use crate::config::ControlConfig;
use crate::peak::RollingPeakTracker;

/// Voltage assumed until the switch reports one.
pub const NOMINAL_VOLTAGE: f64 = 230.0;

/// Controller state: switch model, latch, rolling window, station figures and
/// pacing timestamps (all in milliseconds).
#[derive(Clone, Debug)]
pub struct ControlState {
    /// Last known relay state.
    pub switch_on: bool,
    overcurrent: bool,
    /// AC voltage reported by the switch.
    pub voltage: f64,
    /// Current limit configured on the switch (0 until read).
    pub current_limit_amps: f64,

    /// Last notification from the configured switch component.
    pub last_switch_event_at: u64,
    /// When the latch was last set.
    pub overcurrent_since: u64,

    /// Recent switch power readings.
    pub window: RollingPeakTracker,
    /// Peak of `window` as of the last tick.
    pub peak_w: f64,

    /// Consumer load on the station's AC output (non-negative).
    pub station_ac_out_w: f64,
    /// Station internal overhead (floored).
    pub station_standby_w: f64,
    /// Last commanded charge target.
    pub station_charge_w: u32,

    /// Last telemetry receipt.
    pub last_quota_at: u64,
    /// Last charge command sent.
    pub last_set_at: u64,
    /// Last optimizer run.
    pub last_optimize_at: u64,
    /// Last restore attempt.
    pub last_restore_attempt_at: u64,
}

impl ControlState {
    /// Fresh state with every timestamp set to `now_ms`.
    pub fn new(config: &ControlConfig, now_ms: u64) -> Self {
        Self {
            switch_on: false,
            overcurrent: false,
            voltage: NOMINAL_VOLTAGE,
            current_limit_amps: 0.0,
            last_switch_event_at: now_ms,
            overcurrent_since: now_ms,
            window: RollingPeakTracker::new(config.peak_window_ms),
            peak_w: 0.0,
            station_ac_out_w: 0.0,
            station_standby_w: f64::from(config.standby_floor_w),
            station_charge_w: config.init_charge_w,
            last_quota_at: now_ms,
            last_set_at: now_ms,
            last_optimize_at: now_ms,
            last_restore_attempt_at: now_ms,
        }
    }

    /// The overcurrent latch.
    pub fn overcurrent(&self) -> bool {
        self.overcurrent
    }

    /// Set the latch after a trip notification.
    ///
    /// A trip also means the relay is open, and any buffered power readings
    /// predate it, so both are reset. Repeated trips re-stamp
    /// `overcurrent_since`.
    pub fn trip(&mut self, now_ms: u64) {
        self.overcurrent = true;
        self.overcurrent_since = now_ms;
        self.switch_on = false;
        self.window.clear();
        self.peak_w = 0.0;
    }

    /// Clear the latch after a clear notification. Returns true if it was set.
    pub fn clear_trip(&mut self) -> bool {
        std::mem::replace(&mut self.overcurrent, false)
    }

    /// Update the relay state. Turning off empties the rolling window.
    ///
    /// Returns true if the state changed.
    pub fn set_switch_on(&mut self, on: bool) -> bool {
        let changed = self.switch_on != on;
        self.switch_on = on;
        if !on {
            self.window.clear();
            self.peak_w = 0.0;
        }
        changed
    }

    /// Record a power reading.
    ///
    /// Recorded whatever the modeled relay state; the window is emptied on
    /// every on to off transition and on trip.
    pub fn record_power(&mut self, power_w: f64, now_ms: u64) -> bool {
        self.window.record(power_w, now_ms)
    }

    /// Prune the window and refresh `peak_w`.
    pub fn refresh_peak(&mut self, now_ms: u64) -> f64 {
        self.peak_w = self.window.prune_and_peak(now_ms);
        self.peak_w
    }

    /// Switch limit in whole watts: `floor(current_limit_amps * voltage)`.
    pub fn limit_w(&self) -> f64 {
        (self.current_limit_amps * self.voltage).floor()
    }

    /// Time since the last telemetry receipt.
    pub fn telemetry_age(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_quota_at)
    }

    /// Time since the latch was last set.
    pub fn time_since_trip(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.overcurrent_since)
    }
}

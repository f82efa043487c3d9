//! The controller that ties state, decisions and ports together.
//!
//! [`Controller`] owns the [`ControlState`] and both outbound ports. Every
//! handler runs to completion without blocking; outbound calls are queued and
//! their results come back through [`Controller::on_switch_reply`].
//!
//! # Tick order
//!
//! 1. Watchdogs (switch, telemetry)
//! 2. Rolling window maintenance
//! 3. Restore (while latched) **or** optimize (while clear and on)
//!
//! # Example
//!
//! ```rust
//! use ac_limiter::config::Config;
//! use ac_limiter::controller::Controller;
//! use ac_limiter::events::{SwitchEventKind, SwitchNotification};
//! use ac_limiter::hal::{MockMqtt, MockSwitch};
//!
//! let mut controller = Controller::new(Config::default(), MockSwitch::new(), MockMqtt::new(), 0);
//! controller.start(0);
//!
//! let trip = SwitchNotification::new("switch:0", SwitchEventKind::Overcurrent);
//! controller.on_switch_notification(&trip, 1_000);
//! assert!(controller.state().overcurrent());
//!
//! // Ticks never clear the latch
//! for t in 1..100 {
//!     controller.on_tick(1_000 + t * 1_000);
//! }
//! assert!(controller.state().overcurrent());
//! ```

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{Config, StationConfig};
use crate::events::{SwitchEventKind, SwitchNotification, SwitchReply};
use crate::gateway::{CommandGateway, SetOutcome};
use crate::messages::SetReply;
use crate::optimizer::{Optimizer, OptimizerPlan};
use crate::restore::{RestoreController, RestoreDecision};
use crate::state::ControlState;
use crate::telemetry::TelemetryIngestor;
use crate::traits::{MqttClient, SwitchPort};
use crate::watchdog::Watchdog;

/// AC-input current limit controller.
///
/// # Type Parameters
///
/// - `S`: the current-limited switch ([`SwitchPort`])
/// - `C`: the station's MQTT channel ([`MqttClient`])
pub struct Controller<S: SwitchPort, C: MqttClient> {
    config: Config,
    state: ControlState,
    switch: S,
    station: C,
    gateway: CommandGateway,
    optimizer: Optimizer,
    restore: RestoreController,
    telemetry: TelemetryIngestor,
    switch_watchdog: Watchdog,
    telemetry_watchdog: Watchdog,
}

impl<S: SwitchPort, C: MqttClient> Controller<S, C> {
    /// Create a controller. All timestamps start at `now_ms`.
    pub fn new(config: Config, switch: S, station: C, now_ms: u64) -> Self {
        let control = &config.control;
        Self {
            state: ControlState::new(control, now_ms),
            gateway: CommandGateway::new(control, &config.station, 1),
            optimizer: Optimizer::new(control),
            restore: RestoreController::new(control),
            telemetry: TelemetryIngestor::new(control),
            switch_watchdog: Watchdog::new("switch", control.event_timeout_ms, now_ms),
            telemetry_watchdog: Watchdog::new("telemetry", control.mqtt_timeout_ms, now_ms),
            config,
            switch,
            station,
        }
    }

    /// Start station command ids at `first_id` instead of 1.
    pub fn with_first_request_id(mut self, first_id: u64) -> Self {
        self.gateway = CommandGateway::new(&self.config.control, &self.config.station, first_id);
        self
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Subscribe everything and re-read switch status and config.
    ///
    /// Used at startup and after every broker reconnect; state is kept.
    pub fn start(&mut self, now_ms: u64) {
        info!(now_ms, "subscribing and synchronizing");
        let station = self.config.station.clone();
        self.resubscribe_station(&station);
        if let Err(e) = self.switch.resubscribe() {
            warn!(error = %e, "switch subscription failed");
        }
        self.request_status();
        self.request_config();
    }

    /// Tear down all subscriptions.
    pub fn shutdown(&mut self) {
        info!("shutting down");
        for topic in [self.config.station.quota_topic(), self.config.station.set_reply_topic()] {
            if let Err(e) = self.station.unsubscribe(&topic) {
                warn!(error = %e, "station unsubscribe failed");
            }
        }
        if let Err(e) = self.switch.unsubscribe() {
            warn!(error = %e, "switch unsubscribe failed");
        }
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Periodic tick.
    pub fn on_tick(&mut self, now_ms: u64) {
        self.run_watchdogs(now_ms);
        self.state.refresh_peak(now_ms);

        if self.state.overcurrent() {
            self.try_restore(now_ms);
        } else if self.optimizer.due(&self.state, now_ms) {
            self.optimize(now_ms);
        }
    }

    fn run_watchdogs(&mut self, now_ms: u64) {
        if self.switch_watchdog.check(self.state.last_switch_event_at, now_ms) {
            warn!(
                watchdog = self.switch_watchdog.name(),
                silent_ms = now_ms.saturating_sub(self.state.last_switch_event_at),
                "no notifications, resubscribing"
            );
            if let Err(e) = self.switch.resubscribe() {
                warn!(error = %e, "switch resubscribe failed");
            }
            self.request_status();
        }

        if self.telemetry_watchdog.check(self.state.last_quota_at, now_ms) {
            warn!(
                watchdog = self.telemetry_watchdog.name(),
                silent_ms = self.state.telemetry_age(now_ms),
                "no messages, resubscribing"
            );
            let station = self.config.station.clone();
            self.resubscribe_station(&station);
        }
    }

    fn try_restore(&mut self, now_ms: u64) {
        let decision = self.restore.evaluate(&self.state, now_ms);
        let RestoreDecision::Proceed {
            expected_draw_w,
            limit_w,
        } = decision
        else {
            debug!(?decision, "restore skipped");
            return;
        };

        self.state.last_restore_attempt_at = now_ms;
        info!(expected_draw_w, limit_w, "restoring after overcurrent");

        let target = f64::from(self.restore.init_charge_w());
        match self.gateway.set(&mut self.state, &mut self.station, target, now_ms) {
            SetOutcome::Sent { .. } => {
                if let Err(e) = self.switch.set_output(true) {
                    warn!(error = %e, "switch-on request failed");
                }
            }
            outcome => debug!(?outcome, "restore command not sent, switch left off"),
        }
    }

    fn optimize(&mut self, now_ms: u64) {
        self.state.last_optimize_at = now_ms;
        let (estimate, plan) = self.optimizer.plan(&self.state, &self.gateway);
        debug!(
            snapshot = ?self.snapshot(),
            other_w = estimate.other_w,
            source = ?estimate.source,
            ?plan,
            "optimizer"
        );

        if let OptimizerPlan::Adjust { target_w, .. } = plan {
            self.gateway
                .set(&mut self.state, &mut self.station, f64::from(target_w), now_ms);
        }
    }

    // ========================================================================
    // Switch input
    // ========================================================================

    /// Handle a switch notification.
    ///
    /// Notifications for other components are ignored entirely.
    pub fn on_switch_notification(&mut self, notification: &SwitchNotification, now_ms: u64) {
        if notification.component != self.config.switch.component {
            debug!(component = %notification.component, "ignoring other component");
            return;
        }
        self.state.last_switch_event_at = now_ms;

        match notification.kind {
            SwitchEventKind::Toggle { on } => {
                if self.state.set_switch_on(on) {
                    info!(on, "switch toggled");
                }
            }
            SwitchEventKind::PowerUpdate { power_w } => {
                self.state.record_power(power_w, now_ms);
            }
            SwitchEventKind::Overcurrent => {
                self.state.trip(now_ms);
                warn!(now_ms, "overcurrent trip latched");
            }
            SwitchEventKind::OvercurrentClear => {
                if self.state.clear_trip() {
                    info!("overcurrent cleared");
                }
            }
            SwitchEventKind::ConfigChanged => {
                info!("switch config changed, re-reading limit");
                self.request_config();
            }
            SwitchEventKind::Unknown(ref name) => debug!(event = %name, "ignoring switch event"),
        }
    }

    /// Handle the result of an earlier switch request.
    pub fn on_switch_reply(&mut self, reply: SwitchReply, now_ms: u64) {
        match reply {
            SwitchReply::Status(Ok(status)) => {
                if let Some(voltage) = status.voltage.filter(|v| *v > 0.0) {
                    self.state.voltage = voltage;
                }
                if let Some(on) = status.output {
                    if self.state.set_switch_on(on) {
                        info!(on, "switch state resynchronized");
                    }
                }
                debug!(voltage = self.state.voltage, on = self.state.switch_on, "switch status");
            }
            SwitchReply::Config(Ok(settings)) => {
                if let Some(amps) = settings.current_limit_amps.filter(|a| *a > 0.0) {
                    self.state.current_limit_amps = amps;
                    info!(amps, limit_w = self.state.limit_w(), "current limit read");
                }
            }
            SwitchReply::SetOutput { on, result: Ok(()) } => {
                self.state.set_switch_on(on);
                if on {
                    self.state.last_optimize_at = now_ms;
                    self.state.last_set_at = now_ms;
                    info!("switch back on");
                }
            }
            SwitchReply::Status(Err(e)) => warn!(error = %e, "switch status request failed"),
            SwitchReply::Config(Err(e)) => warn!(error = %e, "switch config request failed"),
            SwitchReply::SetOutput { on, result: Err(e) } => {
                warn!(error = %e, on, "switch output request failed")
            }
        }
    }

    // ========================================================================
    // Station input
    // ========================================================================

    /// Handle a telemetry payload.
    pub fn on_quota(&mut self, payload: &[u8], now_ms: u64) {
        match self.telemetry.ingest_quota(&mut self.state, payload, now_ms) {
            Ok(report) => debug!(
                ac_out_w = self.state.station_ac_out_w,
                standby_w = self.state.station_standby_w,
                empty = report.is_empty(),
                "telemetry"
            ),
            Err(e) => warn!(error = %e, "discarding malformed telemetry"),
        }
    }

    /// Handle a command acknowledgement (logged only).
    pub fn on_set_reply(&mut self, payload: &[u8]) {
        match self.telemetry.parse_set_reply(payload) {
            Ok(SetReply::Accepted { id, watts }) => debug!(?id, watts, "charge command accepted"),
            Ok(SetReply::Rejected { id, reason }) => {
                warn!(?id, %reason, "charge command rejected")
            }
            Ok(SetReply::Unrecognized) => debug!("unrecognized command reply"),
            Err(e) => warn!(error = %e, "discarding malformed command reply"),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn resubscribe_station(&mut self, station: &StationConfig) {
        for topic in [station.quota_topic(), station.set_reply_topic()] {
            if let Err(e) = self.station.resubscribe(&topic) {
                warn!(error = %e, "station subscription failed");
            }
        }
    }

    fn request_status(&mut self) {
        if let Err(e) = self.switch.request_status() {
            warn!(error = %e, "switch status request failed");
        }
    }

    fn request_config(&mut self) {
        if let Err(e) = self.switch.request_config() {
            warn!(error = %e, "switch config request failed");
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Current state.
    pub fn state(&self) -> &ControlState {
        &self.state
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Switch port.
    pub fn switch(&self) -> &S {
        &self.switch
    }

    /// Switch port (mutable).
    pub fn switch_mut(&mut self) -> &mut S {
        &mut self.switch
    }

    /// Station channel.
    pub fn station(&self) -> &C {
        &self.station
    }

    /// Station channel (mutable).
    pub fn station_mut(&mut self) -> &mut C {
        &mut self.station
    }

    /// Serializable summary of the state.
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            switch_on: self.state.switch_on,
            overcurrent: self.state.overcurrent(),
            voltage: self.state.voltage,
            current_limit_amps: self.state.current_limit_amps,
            limit_w: self.state.limit_w(),
            peak_w: self.state.peak_w,
            samples: self.state.window.len(),
            station_ac_out_w: self.state.station_ac_out_w,
            station_standby_w: self.state.station_standby_w,
            station_charge_w: self.state.station_charge_w,
            last_set_at: self.state.last_set_at,
        }
    }
}

/// Point-in-time view of the controller.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ControlSnapshot {
    /// Relay state.
    pub switch_on: bool,
    /// Overcurrent latch.
    pub overcurrent: bool,
    /// AC voltage.
    pub voltage: f64,
    /// Switch current limit.
    pub current_limit_amps: f64,
    /// Switch limit in watts.
    pub limit_w: f64,
    /// Rolling peak power.
    pub peak_w: f64,
    /// Samples in the rolling window as of the last reading or tick.
    pub samples: usize,
    /// Station consumer load.
    pub station_ac_out_w: f64,
    /// Station overhead.
    pub station_standby_w: f64,
    /// Last commanded charge power.
    pub station_charge_w: u32,
    /// When the last command went out.
    pub last_set_at: u64,
}

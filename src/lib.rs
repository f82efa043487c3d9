//! # ac-limiter
//!
//! Closed-loop governor that keeps a power station's AC-input draw under the
//! limit of a current-limited switch (a campsite breaker, a Shelly with an
//! overcurrent limit) while charging as fast as that limit allows.
//!
//! ## Features
//!
//! - **Overcurrent latch**: set only by a trip notification, cleared only by a
//!   clear notification
//! - **Restore after trip**: conservative charge target plus switch-on, only
//!   with fresh telemetry and real headroom
//! - **Headroom optimizer**: sizes the charge target from a rolling power peak
//!   with hysteresis
//! - **Throttled commands**: one outbound path, quantized and clamped
//! - **Watchdogs**: re-subscribe silent switch or telemetry links
//!
//! ## Architecture
//!
//! - `traits` - Switch, clock and MQTT ports
//! - `state` - The single mutable aggregate
//! - `peak`, `optimizer`, `restore`, `gateway`, `watchdog`, `telemetry` - Decision parts
//! - `controller` - Tick and event handlers tying the parts together
//! - `switch`, `events`, `messages` - Wire formats and the Shelly RPC adapter
//! - `hal` - Mocks for testing
//! - `services` - `rumqttc`/`tokio` runtime (feature `mqtt`)
//!
//! ## Example
//!
//! ```rust
//! use ac_limiter::{
//!     config::Config,
//!     controller::Controller,
//!     events::{SwitchReply, SwitchSettings, SwitchStatus},
//!     hal::{MockMqtt, MockSwitch},
//! };
//!
//! let mut controller = Controller::new(Config::default(), MockSwitch::new(), MockMqtt::new(), 0);
//! controller.start(0);
//!
//! // Switch reports 230 V, relay on, 6 A limit
//! controller.on_switch_reply(
//!     SwitchReply::Status(Ok(SwitchStatus { voltage: Some(230.0), output: Some(true) })),
//!     100,
//! );
//! controller.on_switch_reply(
//!     SwitchReply::Config(Ok(SwitchSettings { current_limit_amps: Some(6.0) })),
//!     100,
//! );
//! controller.on_quota(br#"{"params":{"inv.outputWatts":280,"inv.standbyWatts":20}}"#, 4_000);
//!
//! // 1380 W limit - 300 W other load - 100 W buffer = 980 W
//! controller.on_tick(5_000);
//! assert_eq!(controller.state().station_charge_w, 980);
//! ```

#![warn(missing_docs)]

/// Load-once configuration.
pub mod config;
/// Tick and event handlers.
pub mod controller;
/// Switch notifications and RPC replies.
pub mod events;
/// Throttled outbound charge commands.
pub mod gateway;
/// Hardware abstraction layer with mock implementations for testing.
pub mod hal;
/// Station wire formats.
pub mod messages;
/// Headroom-based charge target selection.
pub mod optimizer;
/// Rolling peak power window.
pub mod peak;
/// Restore-after-trip policy.
pub mod restore;
/// Controller state.
pub mod state;
/// Shelly Gen2 RPC switch adapter.
pub mod switch;
/// Station telemetry intake.
pub mod telemetry;
/// Core traits for the switch, clock and broker.
pub mod traits;
/// Staleness checks.
pub mod watchdog;

/// Broker runtime.
#[cfg(feature = "mqtt")]
pub mod services;

pub use config::{Config, ConfigError};
pub use controller::{ControlSnapshot, Controller};
pub use state::ControlState;

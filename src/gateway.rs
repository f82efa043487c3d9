//! Rate-limited outbound charge power commands.
//!
//! [`CommandGateway::set`] is the only path by which a charge target reaches
//! the station. It never blocks: a call inside the throttle interval is
//! refused and the caller simply tries again on a later tick.
//!
//! # Example
//!
//! ```rust
//! use ac_limiter::config::{ControlConfig, StationConfig};
//! use ac_limiter::gateway::{CommandGateway, SetOutcome};
//! use ac_limiter::hal::MockMqtt;
//! use ac_limiter::state::ControlState;
//!
//! let control = ControlConfig::default();
//! let mut gateway = CommandGateway::new(&control, &StationConfig::default(), 1);
//! let mut state = ControlState::new(&control, 0);
//! let mut mqtt = MockMqtt::new();
//!
//! let now = control.set_throttle_ms;
//! assert!(matches!(gateway.set(&mut state, &mut mqtt, 987.0, now), SetOutcome::Sent { watts: 990, .. }));
//! assert!(matches!(gateway.set(&mut state, &mut mqtt, 500.0, now + 1), SetOutcome::Throttled { .. }));
//! assert_eq!(state.station_charge_w, 990);
//! ```

use tracing::{debug, info, warn};

use crate::config::{ControlConfig, StationConfig};
use crate::messages::SetCommand;
use crate::state::ControlState;
use crate::traits::{MqttClient, TransportError};

/// Result of a [`CommandGateway::set`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum SetOutcome {
    /// Exactly one command was published.
    Sent {
        /// Request id carried by the command.
        id: u64,
        /// Quantized, clamped value that was sent.
        watts: u32,
    },
    /// Refused: the previous command is too recent.
    Throttled {
        /// Time until the next command is allowed.
        remaining_ms: u64,
    },
    /// The transport refused the command; nothing was recorded.
    Failed(TransportError),
}

impl SetOutcome {
    /// Returns true if a command went out.
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Round `power_w` to the nearest multiple of `step_w`.
pub fn quantize(power_w: f64, step_w: u32) -> f64 {
    let step = f64::from(step_w.max(1));
    (power_w / step).round() * step
}

/// Throttled sender of charge power commands.
#[derive(Clone, Debug)]
pub struct CommandGateway {
    min_w: u32,
    max_w: u32,
    quant_w: u32,
    throttle_ms: u64,
    station: StationConfig,
    next_id: u64,
}

impl CommandGateway {
    /// Create a gateway. Request ids start at `first_id` and increase by one.
    pub fn new(control: &ControlConfig, station: &StationConfig, first_id: u64) -> Self {
        Self {
            min_w: control.min_charge_w,
            max_w: control.max_charge_w,
            quant_w: control.quant_step_w,
            throttle_ms: control.set_throttle_ms,
            station: station.clone(),
            next_id: first_id,
        }
    }

    /// Quantize and clamp an arbitrary raw target into the commandable range.
    ///
    /// Non-finite and negative inputs end up at the minimum.
    pub fn clamp_target(&self, raw_w: f64) -> u32 {
        if raw_w.is_nan() {
            return self.min_w;
        }
        let quantized = quantize(raw_w, self.quant_w);
        quantized.clamp(f64::from(self.min_w), f64::from(self.max_w)) as u32
    }

    /// Milliseconds until a command would be accepted.
    pub fn throttle_remaining(&self, state: &ControlState, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(state.last_set_at);
        self.throttle_ms.saturating_sub(elapsed)
    }

    /// Send `target_w` (quantized and clamped) unless throttled.
    ///
    /// On success the value is recorded as `station_charge_w` and
    /// `last_set_at` is stamped. Throttled or failed calls leave the state
    /// untouched.
    pub fn set<C: MqttClient>(
        &mut self,
        state: &mut ControlState,
        client: &mut C,
        target_w: f64,
        now_ms: u64,
    ) -> SetOutcome {
        let remaining_ms = self.throttle_remaining(state, now_ms);
        if remaining_ms > 0 {
            debug!(target_w, remaining_ms, "charge command throttled");
            return SetOutcome::Throttled { remaining_ms };
        }

        let watts = self.clamp_target(target_w);
        let id = self.next_id;
        let topic = self.station.set_topic();
        let command = SetCommand::charge_power(id, watts, &self.station);

        let published = command
            .to_json()
            .map_err(|e| TransportError::Publish {
                topic: topic.clone(),
                reason: e.to_string(),
            })
            .and_then(|payload| client.publish(&topic, &payload, false));

        match published {
            Ok(()) => {
                self.next_id = self.next_id.wrapping_add(1);
                let previous_w = state.station_charge_w;
                state.station_charge_w = watts;
                state.last_set_at = now_ms;
                info!(id, watts, previous_w, "charge power command sent");
                SetOutcome::Sent { id, watts }
            }
            Err(e) => {
                warn!(error = %e, watts, "charge power command not sent");
                SetOutcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockMqtt;
    use proptest::prelude::*;

    fn setup() -> (CommandGateway, ControlState, MockMqtt, ControlConfig) {
        let control = ControlConfig::default()
            .with_min_charge_w(200)
            .with_max_charge_w(1200)
            .with_quant_step_w(10)
            .with_set_throttle_ms(3_000);
        let gateway = CommandGateway::new(&control, &StationConfig::default(), 100);
        let state = ControlState::new(&control, 0);
        (gateway, state, MockMqtt::new(), control)
    }

    #[test]
    fn quantize_rounds_to_nearest_step() {
        assert_eq!(quantize(984.0, 10), 980.0);
        assert_eq!(quantize(985.0, 10), 990.0);
        assert_eq!(quantize(-14.0, 10), -10.0);
        assert_eq!(quantize(123.0, 0), 123.0);
    }

    #[test]
    fn first_command_waits_for_startup_throttle() {
        let (mut gateway, mut state, mut mqtt, _) = setup();
        assert_eq!(
            gateway.set(&mut state, &mut mqtt, 500.0, 1_000),
            SetOutcome::Throttled { remaining_ms: 2_000 }
        );
        assert!(mqtt.published.is_empty());
    }

    #[test]
    fn sends_and_records_one_command() {
        let (mut gateway, mut state, mut mqtt, _) = setup();
        let outcome = gateway.set(&mut state, &mut mqtt, 654.0, 3_000);
        assert_eq!(outcome, SetOutcome::Sent { id: 100, watts: 650 });
        assert_eq!(state.station_charge_w, 650);
        assert_eq!(state.last_set_at, 3_000);

        let sent = mqtt.published_json("station/set");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["params"]["chgWatts"], 650);
        assert_eq!(sent[0]["id"], 100);
    }

    #[test]
    fn second_call_inside_throttle_is_rejected() {
        let (mut gateway, mut state, mut mqtt, _) = setup();
        assert!(gateway.set(&mut state, &mut mqtt, 600.0, 3_000).is_sent());
        assert_eq!(
            gateway.set(&mut state, &mut mqtt, 900.0, 5_999),
            SetOutcome::Throttled { remaining_ms: 1 }
        );
        assert_eq!(state.station_charge_w, 600);
        assert_eq!(state.last_set_at, 3_000);
        assert_eq!(mqtt.published.len(), 1);

        // Exactly one interval later it goes through with a fresh id
        assert_eq!(
            gateway.set(&mut state, &mut mqtt, 900.0, 6_000),
            SetOutcome::Sent { id: 101, watts: 900 }
        );
    }

    #[test]
    fn transport_failure_records_nothing() {
        let (mut gateway, mut state, mut mqtt, _) = setup();
        mqtt.fail_publish = true;
        let before = state.clone();
        let outcome = gateway.set(&mut state, &mut mqtt, 600.0, 3_000);
        assert!(matches!(outcome, SetOutcome::Failed(_)));
        assert_eq!(state.station_charge_w, before.station_charge_w);
        assert_eq!(state.last_set_at, before.last_set_at);

        // The id is not consumed by a failed send
        mqtt.fail_publish = false;
        assert_eq!(
            gateway.set(&mut state, &mut mqtt, 600.0, 3_000),
            SetOutcome::Sent { id: 100, watts: 600 }
        );
    }

    #[test]
    fn extreme_inputs_are_clamped() {
        let (gateway, _, _, _) = setup();
        assert_eq!(gateway.clamp_target(1e12), 1200);
        assert_eq!(gateway.clamp_target(-1e12), 200);
        assert_eq!(gateway.clamp_target(f64::INFINITY), 1200);
        assert_eq!(gateway.clamp_target(f64::NEG_INFINITY), 200);
        assert_eq!(gateway.clamp_target(f64::NAN), 200);
    }

    proptest! {
        #[test]
        fn commanded_value_is_quantized_and_in_range(raw in proptest::num::f64::ANY) {
            let (mut gateway, mut state, mut mqtt, control) = setup();
            let outcome = gateway.set(&mut state, &mut mqtt, raw, 10_000);
            match outcome {
                SetOutcome::Sent { watts, .. } => {
                    prop_assert!(watts >= control.min_charge_w && watts <= control.max_charge_w);
                    prop_assert_eq!(watts % control.quant_step_w, 0);
                    prop_assert_eq!(state.station_charge_w, watts);
                }
                other => prop_assert!(false, "unexpected outcome {:?}", other),
            }
        }
    }
}

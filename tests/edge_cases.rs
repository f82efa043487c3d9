//! Edge case and boundary condition tests for the controller

mod common;

use ac_limiter::config::{Config, ControlConfig};
use ac_limiter::controller::Controller;
use ac_limiter::events::{RpcFailure, SwitchEventKind, SwitchNotification, SwitchReply};
use ac_limiter::hal::{MockClock, MockMqtt, MockSwitch};
use ac_limiter::services::{ControlEvent, Runner};
use common::{commands, notify, online, online_with, power, quota};
use proptest::prelude::*;

// ============================================================================
// Command throttle boundaries
// ============================================================================

#[test]
fn no_command_before_first_throttle_interval() {
    let control = ControlConfig::default().with_optimize_interval_ms(1_000);
    let mut c = online_with(control, true);
    quota(&mut c, 0.0, 20.0, 500);
    c.on_tick(1_000);
    c.on_tick(2_000);
    c.on_tick(2_999);
    assert!(commands(&c).is_empty());
    c.on_tick(3_000);
    assert_eq!(commands(&c).len(), 1);
}

#[test]
fn commands_spaced_by_throttle_even_with_fast_optimizer() {
    let control = ControlConfig::default().with_optimize_interval_ms(1_000);
    let mut c = online_with(control, true);
    let mut ac_out = 0.0;
    for t in (3_000..20_000).step_by(1_000) {
        // Swing the load so every run wants a new target
        ac_out = if ac_out == 0.0 { 600.0 } else { 0.0 };
        quota(&mut c, ac_out, 20.0, t);
        c.on_tick(t);
    }

    // One command every 3 s from t=3000: 3, 6, 9, 12, 15, 18
    assert_eq!(commands(&c), vec![660, 1200, 660, 1200, 660, 1200]);

    let ids: Vec<u64> = c
        .station()
        .published_json("station/set")
        .iter()
        .filter_map(|v| v["id"].as_u64())
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn failed_publish_is_retried_on_a_later_run() {
    let mut c = online();
    quota(&mut c, 0.0, 20.0, 1_000);
    c.station_mut().fail_publish = true;
    c.on_tick(5_000);
    assert_eq!(c.state().station_charge_w, 400);

    c.station_mut().fail_publish = false;
    c.on_tick(10_000);
    assert_eq!(commands(&c), vec![1200]);
}

// ============================================================================
// Clamping
// ============================================================================

#[test]
fn huge_other_load_commands_minimum() {
    let mut c = online_with(ControlConfig::default().with_init_charge_w(800), true);
    quota(&mut c, 5_000.0, 20.0, 1_000);
    c.on_tick(5_000);
    assert_eq!(commands(&c), vec![200]);
}

#[test]
fn no_other_load_commands_maximum() {
    let mut c = online();
    quota(&mut c, 0.0, 0.0, 1_000);
    c.on_tick(5_000);
    assert_eq!(commands(&c), vec![1200]);
}

#[test]
fn unknown_limit_sends_nothing() {
    let config = Config::default();
    let mut c = Controller::new(config, MockSwitch::new(), MockMqtt::new(), 0);
    c.start(0);
    notify(&mut c, SwitchEventKind::Toggle { on: true }, 100);
    quota(&mut c, 0.0, 20.0, 1_000);
    c.on_tick(5_000);
    assert!(commands(&c).is_empty());
}

// ============================================================================
// Latch edge cases
// ============================================================================

#[test]
fn clear_without_trip_is_harmless() {
    let mut c = online();
    notify(&mut c, SwitchEventKind::OvercurrentClear, 1_000);
    assert!(!c.state().overcurrent());
    assert!(c.state().switch_on);
}

#[test]
fn repeated_trip_restarts_restore_delay() {
    let mut c = online();
    notify(&mut c, SwitchEventKind::Overcurrent, 1_000);
    notify(&mut c, SwitchEventKind::Overcurrent, 20_000);
    quota(&mut c, 0.0, 20.0, 31_000);
    c.on_tick(31_000);
    assert!(commands(&c).is_empty());

    quota(&mut c, 0.0, 20.0, 50_000);
    c.on_tick(50_000);
    assert_eq!(commands(&c), vec![400]);
}

#[test]
fn trip_empties_window_and_later_readings_start_fresh() {
    let mut c = online();
    power(&mut c, 1_300.0, 500);
    notify(&mut c, SwitchEventKind::Overcurrent, 1_000);
    assert_eq!(c.snapshot().samples, 0);

    // Open relay reports zero draw
    power(&mut c, 0.0, 1_500);
    c.on_tick(2_000);
    assert_eq!(c.state().peak_w, 0.0);
    assert_eq!(c.snapshot().samples, 1);
}

#[test]
fn readings_before_first_status_reply_are_kept() {
    let mut c = Controller::new(Config::default(), MockSwitch::new(), MockMqtt::new(), 0);
    c.start(0);
    power(&mut c, 640.0, 500);
    c.on_tick(1_000);
    assert_eq!(c.state().peak_w, 640.0);
}

#[test]
fn expired_samples_leave_the_window_on_the_next_reading() {
    let mut c = online();
    power(&mut c, 1_100.0, 1_000);
    power(&mut c, 500.0, 11_500);
    // No tick in between
    assert_eq!(c.snapshot().samples, 1);
}

#[test]
fn failed_switch_on_leaves_switch_off() {
    let mut c = online();
    notify(&mut c, SwitchEventKind::Overcurrent, 1_000);
    quota(&mut c, 0.0, 20.0, 31_000);
    c.on_tick(31_000);
    c.on_switch_reply(
        SwitchReply::SetOutput {
            on: true,
            result: Err(RpcFailure {
                code: -108,
                message: "overcurrent".to_string(),
            }),
        },
        31_100,
    );
    assert!(!c.state().switch_on);
    assert_eq!(c.state().last_set_at, 31_000);
}

#[test]
fn switch_request_failure_is_not_fatal() {
    let mut c = online();
    c.switch_mut().fail_requests = true;
    notify(&mut c, SwitchEventKind::Overcurrent, 1_000);
    quota(&mut c, 0.0, 20.0, 31_000);
    c.on_tick(31_000);
    // Command went out, switch-on could not be queued; retried after pacing
    assert_eq!(commands(&c), vec![400]);
    assert!(c.switch().output_requests.is_empty());

    c.switch_mut().fail_requests = false;
    quota(&mut c, 0.0, 20.0, 34_000);
    c.on_tick(34_000);
    assert_eq!(c.switch().output_requests, vec![true]);
}

// ============================================================================
// Malformed input
// ============================================================================

#[test]
fn malformed_telemetry_keeps_values_but_counts_as_alive() {
    let mut c = online();
    quota(&mut c, 300.0, 40.0, 1_000);
    c.on_quota(b"{\"params\":", 2_000);
    c.on_quota(b"\"just a string\"", 3_000);

    let state = c.state();
    assert_eq!(state.station_ac_out_w, 300.0);
    assert_eq!(state.station_standby_w, 40.0);
    assert_eq!(state.last_quota_at, 3_000);
}

#[test]
fn standby_is_floored_and_ac_out_made_positive() {
    let mut c = online();
    quota(&mut c, -250.0, 3.0, 1_000);
    assert_eq!(c.state().station_ac_out_w, 250.0);
    assert_eq!(c.state().station_standby_w, 20.0);
}

#[test]
fn unknown_switch_events_only_refresh_liveness() {
    let mut c = online();
    let before = c.snapshot();
    c.on_switch_notification(
        &SwitchNotification::new("switch:0", SwitchEventKind::Unknown("btn_down".into())),
        7_000,
    );
    assert_eq!(c.snapshot(), before);
    assert_eq!(c.state().last_switch_event_at, 7_000);
}

// ============================================================================
// End to end through the runner
// ============================================================================

fn publish(topic: &str, payload: &str) -> ControlEvent {
    ControlEvent::Mqtt {
        topic: topic.to_string(),
        payload: payload.as_bytes().to_vec(),
    }
}

#[test]
fn trip_restore_clear_over_the_wire() {
    let mut r = Runner::new(Config::default(), MockMqtt::new(), MockClock::new());
    r.handle(ControlEvent::Connected);
    r.handle(publish(
        "ac-limiter/rpc",
        r#"{"id":1,"result":{"voltage":230.0,"output":true}}"#,
    ));
    r.handle(publish("ac-limiter/rpc", r#"{"id":2,"result":{"current_limit":6.0}}"#));

    r.clock_mut().set(1_000);
    r.handle(publish(
        "shelly-campsite/events/rpc",
        r#"{"method":"NotifyEvent","params":{"events":[{"component":"switch:0","event":"overcurrent"}]}}"#,
    ));
    assert!(r.controller().state().overcurrent());

    r.clock_mut().set(31_000);
    r.handle(publish(
        "station/quota",
        r#"{"params":{"inv.outputWatts":150,"inv.standbyWatts":25}}"#,
    ));
    r.handle(ControlEvent::Tick);

    let station = r.controller().station();
    let set = station.published_json("station/set");
    assert_eq!(set.len(), 1);
    assert_eq!(set[0]["params"]["chgWatts"], 400);

    let rpc = r.controller().switch().client().published_json("shelly-campsite/rpc");
    let switch_on = rpc.last().unwrap();
    assert_eq!(switch_on["method"], "Switch.Set");
    assert_eq!(switch_on["params"]["on"], true);
    let id = switch_on["id"].as_u64().unwrap();

    r.handle(publish(
        "ac-limiter/rpc",
        &format!(r#"{{"id":{id},"result":{{"was_on":false}}}}"#),
    ));
    assert!(r.controller().state().switch_on);
    assert!(r.controller().state().overcurrent());

    r.handle(publish(
        "shelly-campsite/events/rpc",
        r#"{"method":"NotifyEvent","params":{"events":[{"component":"switch:0","event":"overcurrent_clear"}]}}"#,
    ));
    assert!(!r.controller().state().overcurrent());

    r.handle(publish("station/set_reply", r#"{"id":1,"data":{"ack":0,"chgWatts":400}}"#));
    assert_eq!(r.controller().state().station_charge_w, 400);
}

// ============================================================================
// Latch property
// ============================================================================

#[derive(Clone, Debug)]
enum Input {
    Tick,
    Power(f64),
    Toggle(bool),
    Quota(f64),
    SwitchOnConfirmed,
    ConfigChanged,
}

fn input() -> impl Strategy<Value = Input> {
    prop_oneof![
        Just(Input::Tick),
        (0.0f64..4_000.0).prop_map(Input::Power),
        any::<bool>().prop_map(Input::Toggle),
        (-2_000.0f64..2_000.0).prop_map(Input::Quota),
        Just(Input::SwitchOnConfirmed),
        Just(Input::ConfigChanged),
    ]
}

proptest! {
    #[test]
    fn latch_only_clears_on_clear_notification(
        inputs in proptest::collection::vec((input(), 1u64..20_000), 1..200)
    ) {
        let mut c = online();
        notify(&mut c, SwitchEventKind::Overcurrent, 0);

        let mut now = 0;
        for (input, step) in inputs {
            now += step;
            match input {
                Input::Tick => c.on_tick(now),
                Input::Power(p) => power(&mut c, p, now),
                Input::Toggle(on) => notify(&mut c, SwitchEventKind::Toggle { on }, now),
                Input::Quota(w) => quota(&mut c, w, 20.0, now),
                Input::SwitchOnConfirmed => c.on_switch_reply(
                    SwitchReply::SetOutput { on: true, result: Ok(()) },
                    now,
                ),
                Input::ConfigChanged => notify(&mut c, SwitchEventKind::ConfigChanged, now),
            }
            prop_assert!(c.state().overcurrent());
        }

        notify(&mut c, SwitchEventKind::OvercurrentClear, now);
        prop_assert!(!c.state().overcurrent());
    }

    #[test]
    fn every_command_is_in_range_and_quantized(
        loads in proptest::collection::vec((-3_000.0f64..6_000.0, 0.0f64..3_000.0), 1..40)
    ) {
        let control = ControlConfig::default();
        let mut c = online();
        let mut now = 0;
        for (ac_out, peak) in loads {
            now += 5_000;
            quota(&mut c, ac_out, 20.0, now);
            power(&mut c, peak, now);
            c.on_tick(now);
        }
        for w in commands(&c) {
            prop_assert!(w >= u64::from(control.min_charge_w));
            prop_assert!(w <= u64::from(control.max_charge_w));
            prop_assert_eq!(w % u64::from(control.quant_step_w), 0);
        }
    }
}

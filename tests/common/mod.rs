//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ac_limiter::config::{Config, ControlConfig};
use ac_limiter::controller::Controller;
use ac_limiter::events::{
    SwitchEventKind, SwitchNotification, SwitchReply, SwitchSettings, SwitchStatus,
};
use ac_limiter::hal::{MockMqtt, MockSwitch};

pub type TestController = Controller<MockSwitch, MockMqtt>;

/// Controller that has started and learned 230 V, relay state and a 6 A limit.
pub fn online_with(control: ControlConfig, switch_on: bool) -> TestController {
    let config = Config::default().with_control(control);
    let mut c = Controller::new(config, MockSwitch::new(), MockMqtt::new(), 0);
    c.start(0);
    c.on_switch_reply(
        SwitchReply::Status(Ok(SwitchStatus {
            voltage: Some(230.0),
            output: Some(switch_on),
        })),
        0,
    );
    c.on_switch_reply(
        SwitchReply::Config(Ok(SwitchSettings {
            current_limit_amps: Some(6.0),
        })),
        0,
    );
    c
}

pub fn online() -> TestController {
    online_with(ControlConfig::default(), true)
}

pub fn notify(c: &mut TestController, kind: SwitchEventKind, now: u64) {
    c.on_switch_notification(&SwitchNotification::new("switch:0", kind), now);
}

pub fn power(c: &mut TestController, power_w: f64, now: u64) {
    notify(c, SwitchEventKind::PowerUpdate { power_w }, now);
}

pub fn quota(c: &mut TestController, ac_out_w: f64, standby_w: f64, now: u64) {
    let payload = format!(
        r#"{{"params":{{"inv.outputWatts":{ac_out_w},"inv.standbyWatts":{standby_w}}}}}"#
    );
    c.on_quota(payload.as_bytes(), now);
}

/// Charge targets sent to the station, in order.
pub fn commands(c: &TestController) -> Vec<u64> {
    c.station()
        .published_json("station/set")
        .iter()
        .filter_map(|v| v["params"]["chgWatts"].as_u64())
        .collect()
}

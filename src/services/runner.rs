//! Single-consumer control loop.
//!
//! All inputs (ticks, broker connects, inbound messages) are funneled into one
//! `mpsc` queue and handled strictly one at a time by [`Runner::handle`], so
//! the controller needs no locking.
//!
//! ```text
//! ticker ────────┐
//!                ├──> mpsc<ControlEvent> ──> Runner ──> Controller
//! rumqttc pump ──┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use ac_limiter::config::Config;
//! use ac_limiter::hal::{MockClock, MockMqtt};
//! use ac_limiter::services::{ControlEvent, Runner};
//!
//! let mut runner = Runner::new(Config::default(), MockMqtt::new(), MockClock::new());
//! runner.handle(ControlEvent::Connected);
//! runner.handle(ControlEvent::Mqtt {
//!     topic: "station/quota".to_string(),
//!     payload: br#"{"params":{"inv.outputWatts":150}}"#.to_vec(),
//! });
//! assert_eq!(runner.controller().state().station_ac_out_w, 150.0);
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::Controller;
use crate::switch::ShellyRpcSwitch;
use crate::traits::{Clock, MqttClient};

/// Input to the control loop.
#[derive(Clone, Debug, PartialEq)]
pub enum ControlEvent {
    /// Periodic tick.
    Tick,
    /// The broker connection was (re)established.
    Connected,
    /// Inbound message on a subscribed topic.
    Mqtt {
        /// Topic.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
}

/// Monotonic clock measured from construction.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Start counting from now.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[derive(Debug)]
struct Topics {
    quota: String,
    set_reply: String,
    switch_events: String,
    switch_replies: String,
}

/// Owns the controller and dispatches events to it.
pub struct Runner<K: Clock, C: MqttClient> {
    clock: K,
    controller: Controller<ShellyRpcSwitch<C>, C>,
    topics: Topics,
}

impl<K: Clock, C: MqttClient + Clone> Runner<K, C> {
    /// Build a runner. The switch and the station share one broker client.
    pub fn new(config: Config, client: C, clock: K) -> Self {
        let topics = Topics {
            quota: config.station.quota_topic(),
            set_reply: config.station.set_reply_topic(),
            switch_events: config.switch.events_topic(),
            switch_replies: config.switch.reply_topic(),
        };
        let switch = ShellyRpcSwitch::new(client.clone(), config.switch.clone());
        let now_ms = clock.now_ms();
        Self {
            controller: Controller::new(config, switch, client, now_ms),
            clock,
            topics,
        }
    }
}

impl<K: Clock, C: MqttClient> Runner<K, C> {
    /// Start station command ids at `first_id`.
    pub fn with_first_request_id(mut self, first_id: u64) -> Self {
        self.controller = self.controller.with_first_request_id(first_id);
        self
    }

    /// The controller.
    pub fn controller(&self) -> &Controller<ShellyRpcSwitch<C>, C> {
        &self.controller
    }

    /// The clock.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// The clock (mutable).
    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    /// Handle one event to completion.
    pub fn handle(&mut self, event: ControlEvent) {
        let now_ms = self.clock.now_ms();
        match event {
            ControlEvent::Tick => self.controller.on_tick(now_ms),
            ControlEvent::Connected => self.controller.start(now_ms),
            ControlEvent::Mqtt { topic, payload } => self.dispatch(&topic, &payload, now_ms),
        }
    }

    fn dispatch(&mut self, topic: &str, payload: &[u8], now_ms: u64) {
        if topic == self.topics.quota {
            self.controller.on_quota(payload, now_ms);
        } else if topic == self.topics.set_reply {
            self.controller.on_set_reply(payload);
        } else if topic == self.topics.switch_events {
            let decoded = self.controller.switch().decode_notifications(payload);
            match decoded {
                Ok(notifications) => {
                    for notification in &notifications {
                        self.controller.on_switch_notification(notification, now_ms);
                    }
                }
                Err(e) => warn!(error = %e, "discarding malformed switch notification"),
            }
        } else if topic == self.topics.switch_replies {
            let decoded = self.controller.switch_mut().decode_reply(payload);
            match decoded {
                Ok(Some(reply)) => self.controller.on_switch_reply(reply, now_ms),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "discarding malformed switch reply"),
            }
        } else {
            debug!(topic, "message on unexpected topic");
        }
    }

    /// Tear down subscriptions.
    pub fn shutdown(&mut self) {
        self.controller.shutdown();
    }
}

/// Post [`ControlEvent::Tick`] every `tick_ms` until the queue closes.
pub fn spawn_ticker(tx: mpsc::Sender<ControlEvent>, tick_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            if tx.send(ControlEvent::Tick).await.is_err() {
                return;
            }
        }
    })
}

/// Process events until the queue closes or `shutdown` resolves, then tear
/// down subscriptions. Returns the runner for inspection.
pub async fn run<K, C, F>(
    mut runner: Runner<K, C>,
    mut rx: mpsc::Receiver<ControlEvent>,
    shutdown: F,
) -> Runner<K, C>
where
    K: Clock,
    C: MqttClient,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => runner.handle(event),
                None => {
                    info!("event queue closed");
                    break;
                }
            },
            () = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }
    runner.shutdown();
    runner
}

//! Mock implementations for testing without a broker or a switch.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockSwitch`] | [`SwitchPort`] | Records relay and status/config requests |
//! | [`MockMqtt`] | [`MqttClient`] | Captures publish/subscribe operations |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//!
//! # Example
//!
//! ```rust
//! use ac_limiter::config::Config;
//! use ac_limiter::controller::Controller;
//! use ac_limiter::hal::{MockMqtt, MockSwitch};
//!
//! let mut controller = Controller::new(Config::default(), MockSwitch::new(), MockMqtt::new(), 0);
//! controller.start(0);
//!
//! assert_eq!(controller.switch().status_requests, 1);
//! assert!(controller.station().is_subscribed("station/quota"));
//! ```
//!
//! [`SwitchPort`]: crate::traits::SwitchPort
//! [`MqttClient`]: crate::traits::MqttClient
//! [`Clock`]: crate::traits::Clock

use crate::traits::{Clock, MqttClient, SwitchError, SwitchPort, TransportError};

// ============================================================================
// Hardware Mocks
// ============================================================================

/// Mock switch for testing.
///
/// Records every request for verification. Set `fail_requests` to make all
/// requests fail at the transport level.
///
/// # Example
///
/// ```rust
/// use ac_limiter::hal::MockSwitch;
/// use ac_limiter::traits::SwitchPort;
///
/// let mut switch = MockSwitch::new();
/// switch.fail_requests = true;
/// assert!(switch.set_output(true).is_err());
/// assert!(switch.output_requests.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MockSwitch {
    /// Relay requests in order (`true` = on).
    pub output_requests: Vec<bool>,
    /// Number of status requests.
    pub status_requests: usize,
    /// Number of config requests.
    pub config_requests: usize,
    /// Number of resubscribe requests.
    pub resubscribes: usize,
    /// Number of unsubscribe requests.
    pub unsubscribes: usize,
    /// Fail every request with a transport error.
    pub fail_requests: bool,
}

impl MockSwitch {
    /// Creates a new mock switch that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> Result<(), SwitchError> {
        if self.fail_requests {
            Err(SwitchError::Transport(TransportError::Publish {
                topic: "mock/rpc".to_string(),
                reason: "injected failure".to_string(),
            }))
        } else {
            Ok(())
        }
    }
}

impl SwitchPort for MockSwitch {
    fn request_status(&mut self) -> Result<(), SwitchError> {
        self.check()?;
        self.status_requests += 1;
        Ok(())
    }

    fn request_config(&mut self) -> Result<(), SwitchError> {
        self.check()?;
        self.config_requests += 1;
        Ok(())
    }

    fn set_output(&mut self, on: bool) -> Result<(), SwitchError> {
        self.check()?;
        self.output_requests.push(on);
        Ok(())
    }

    fn resubscribe(&mut self) -> Result<(), SwitchError> {
        self.check()?;
        self.resubscribes += 1;
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), SwitchError> {
        self.check()?;
        self.unsubscribes += 1;
        Ok(())
    }
}

/// Mock clock for testing.
///
/// Time only moves when the test moves it.
#[derive(Debug)]
pub struct MockClock {
    current_ms: u64,
}

impl MockClock {
    /// Creates a new mock clock starting at time 0.
    pub fn new() -> Self {
        Self { current_ms: 0 }
    }

    /// Sets the current time in milliseconds.
    pub fn set(&mut self, ms: u64) {
        self.current_ms = ms;
    }

    /// Advances the clock by the given duration.
    pub fn advance(&mut self, ms: u64) {
        self.current_ms += ms;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms
    }
}

// ============================================================================
// Network Mocks
// ============================================================================

/// Mock MQTT client for testing.
///
/// Records all publish/subscribe operations. Subscriptions behave like a
/// set: unsubscribing removes the topic again.
///
/// # Example
///
/// ```rust
/// use ac_limiter::hal::MockMqtt;
/// use ac_limiter::traits::MqttClient;
///
/// let mut mqtt = MockMqtt::new();
///
/// mqtt.subscribe("station/quota").unwrap();
/// assert!(mqtt.is_subscribed("station/quota"));
///
/// mqtt.publish("station/set", b"{}", false).unwrap();
/// assert_eq!(mqtt.published_to("station/set").len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MockMqtt {
    /// Messages that have been published (topic, payload, retain).
    pub published: Vec<(String, Vec<u8>, bool)>,
    /// Topics currently subscribed to.
    pub subscriptions: Vec<String>,
    /// Every subscribe call, including repeats.
    pub subscribe_calls: Vec<String>,
    /// Every unsubscribe call.
    pub unsubscribe_calls: Vec<String>,
    /// Fail every publish with a transport error.
    pub fail_publish: bool,
}

impl MockMqtt {
    /// Creates a new mock MQTT client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a topic is currently subscribed
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.iter().any(|t| t == topic)
    }

    /// Get published messages for a topic
    pub fn published_to(&self, topic: &str) -> Vec<&(String, Vec<u8>, bool)> {
        self.published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .collect()
    }

    /// Decode the published payloads for a topic as JSON
    pub fn published_json(&self, topic: &str) -> Vec<serde_json::Value> {
        self.published_to(topic)
            .into_iter()
            .filter_map(|(_, payload, _)| serde_json::from_slice(payload).ok())
            .collect()
    }
}

impl MqttClient for MockMqtt {
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), TransportError> {
        if self.fail_publish {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        self.published.push((topic.into(), payload.to_vec(), retain));
        Ok(())
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.subscribe_calls.push(topic.into());
        if !self.is_subscribed(topic) {
            self.subscriptions.push(topic.into());
        }
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.unsubscribe_calls.push(topic.into());
        self.subscriptions.retain(|t| t != topic);
        Ok(())
    }
}

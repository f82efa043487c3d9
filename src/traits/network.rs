//! Network abstraction for the MQTT broker.
//!
//! Station telemetry, station commands and (via [`ShellyRpcSwitch`]) switch RPC
//! all travel over one broker connection:
//!
//! ```text
//! <station>quota        - station telemetry (inbound)
//! <station>set          - charge power command (outbound)
//! <station>set_reply    - command acknowledgement (inbound)
//! <switch>/rpc          - switch RPC requests (outbound)
//! <switch>/events/rpc   - switch notifications (inbound)
//! <source>/rpc          - switch RPC replies (inbound)
//! ```
//!
//! [`ShellyRpcSwitch`]: crate::switch::ShellyRpcSwitch

use thiserror::Error;

/// Failure to hand a request to the MQTT client.
///
/// These are transient: the caller logs them and the next tick (or the next
/// watchdog cycle) retries naturally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The outbound request queue is full or closed.
    #[error("MQTT publish to `{topic}` failed: {reason}")]
    Publish {
        /// Destination topic
        topic: String,
        /// Client-reported reason
        reason: String,
    },

    /// Subscribe or unsubscribe could not be queued.
    #[error("MQTT subscription change for `{topic}` failed: {reason}")]
    Subscribe {
        /// Affected topic
        topic: String,
        /// Client-reported reason
        reason: String,
    },
}

/// MQTT client port.
///
/// All methods must be non-blocking: they queue the request and return.
/// Delivery problems surface later as missing traffic, which the watchdogs
/// detect.
///
/// # Example
///
/// ```rust
/// use ac_limiter::traits::MqttClient;
/// use ac_limiter::hal::MockMqtt;
///
/// let mut mqtt = MockMqtt::new();
/// mqtt.subscribe("station/quota").unwrap();
/// mqtt.resubscribe("station/quota").unwrap();
/// assert!(mqtt.is_subscribed("station/quota"));
/// ```
pub trait MqttClient {
    /// Queue a publish.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool)
        -> Result<(), TransportError>;

    /// Queue a subscription.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Queue an unsubscribe.
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Replace an existing subscription with a fresh one.
    ///
    /// Unsubscribe failures are ignored: the old subscription may already be
    /// gone, and only the new one matters.
    fn resubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        let _ = self.unsubscribe(topic);
        self.subscribe(topic)
    }
}

//! Hardware abstraction for the current-limited switch and the time source.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`SwitchPort`] | Relay control and status/config reads on the switch |
//! | [`Clock`] | Monotonic milliseconds for all pacing decisions |
//!
//! For tests use the mocks in [`crate::hal::mock`]. The production switch is
//! [`ShellyRpcSwitch`](crate::switch::ShellyRpcSwitch).
//!
//! # Example
//!
//! ```rust
//! use ac_limiter::traits::SwitchPort;
//! use ac_limiter::hal::MockSwitch;
//!
//! let mut switch = MockSwitch::new();
//! switch.set_output(true).unwrap();
//! switch.request_status().unwrap();
//! assert_eq!(switch.output_requests, vec![true]);
//! assert_eq!(switch.status_requests, 1);
//! ```

use thiserror::Error;

use crate::traits::TransportError;

/// Failure to issue a switch request.
///
/// Only covers problems handing the request to the transport. A request the
/// device rejects comes back later as an error reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    /// The underlying transport refused the request.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request could not be encoded.
    #[error("failed to encode switch request: {0}")]
    Encode(String),
}

/// Current-limited switch port.
///
/// Every method is fire-and-forget. Replies are delivered later as
/// [`SwitchReply`](crate::events::SwitchReply) values and notifications as
/// [`SwitchNotification`](crate::events::SwitchNotification) values.
pub trait SwitchPort {
    /// Ask for `{voltage, output}`.
    fn request_status(&mut self) -> Result<(), SwitchError>;

    /// Ask for `{current_limit}`.
    fn request_config(&mut self) -> Result<(), SwitchError>;

    /// Ask the relay to turn on or off.
    fn set_output(&mut self, on: bool) -> Result<(), SwitchError>;

    /// Replace the notification subscription (and the reply subscription).
    fn resubscribe(&mut self) -> Result<(), SwitchError>;

    /// Drop all subscriptions (shutdown).
    fn unsubscribe(&mut self) -> Result<(), SwitchError>;
}

/// Time source.
///
/// Provides monotonic time in milliseconds. Every handler receives `now_ms`
/// from the same clock so pacing decisions are consistent.
///
/// # Example
///
/// ```rust
/// use ac_limiter::traits::Clock;
/// use ac_limiter::hal::MockClock;
///
/// let mut clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.advance(100);
/// assert_eq!(clock.now_ms(), 100);
/// ```
pub trait Clock {
    /// Returns current time in milliseconds since an arbitrary epoch.
    ///
    /// Must be monotonically increasing.
    fn now_ms(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_passes_through() {
        let err: SwitchError = TransportError::Publish {
            topic: "shelly/rpc".to_string(),
            reason: "closed".to_string(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "MQTT publish to `shelly/rpc` failed: closed"
        );
    }

    #[test]
    fn encode_error_display() {
        let err = SwitchError::Encode("bad id".to_string());
        assert!(err.to_string().contains("bad id"));
    }
}

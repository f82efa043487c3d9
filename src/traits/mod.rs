//! Trait definitions for the controller's collaborators.
//!
//! The decision core never talks to a broker or a device directly. It goes
//! through these ports so the whole control loop can run against mocks:
//!
//! - `hardware`: the current-limited switch and the time source
//! - `network`: the MQTT client used for station telemetry and commands
//!
//! # Fire-and-forget
//!
//! Every outbound call returns as soon as the request is queued. Results of
//! switch RPCs come back later as separate inbound messages, never as the
//! return value of the call.

pub mod hardware;
pub mod network;

pub use hardware::*;
pub use network::*;

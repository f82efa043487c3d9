//! Inbound switch traffic: notifications and RPC replies.
//!
//! Notifications are the only way the overcurrent latch can change, so their
//! decoding is deliberately strict about *kind* and lenient about everything
//! else. An unknown kind or a missing payload field yields
//! [`SwitchEventKind::Unknown`], which the controller ignores.
//!
//! # Notification record
//!
//! ```json
//! {"component": "switch:0", "event": "toggle", "state": true}
//! {"component": "switch:0", "event": "power_update", "apower": 812.4}
//! {"component": "switch:0", "event": "overcurrent"}
//! {"component": "switch:0", "event": "overcurrent_clear"}
//! {"component": "switch:0", "event": "config_changed"}
//! ```

use serde_json::Value;

/// What a switch notification reports.
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchEventKind {
    /// Relay changed state.
    Toggle {
        /// New relay state.
        on: bool,
    },
    /// New instantaneous power reading.
    PowerUpdate {
        /// Active power in watts.
        power_w: f64,
    },
    /// The switch tripped on overcurrent.
    Overcurrent,
    /// The overcurrent condition was cleared.
    OvercurrentClear,
    /// Device configuration changed; the current limit must be re-read.
    ConfigChanged,
    /// Anything else (ignored).
    Unknown(String),
}

impl SwitchEventKind {
    /// Short name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Toggle { .. } => "toggle",
            Self::PowerUpdate { .. } => "power_update",
            Self::Overcurrent => "overcurrent",
            Self::OvercurrentClear => "overcurrent_clear",
            Self::ConfigChanged => "config_changed",
            Self::Unknown(name) => name,
        }
    }
}

/// A notification from one switch component.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchNotification {
    /// Component id, e.g. `switch:0`.
    pub component: String,
    /// What happened.
    pub kind: SwitchEventKind,
}

impl SwitchNotification {
    /// Create a notification.
    pub fn new(component: impl Into<String>, kind: SwitchEventKind) -> Self {
        Self {
            component: component.into(),
            kind,
        }
    }

    /// Decode one notification record.
    ///
    /// Returns `None` when the record has no component or no event name.
    ///
    /// ```rust
    /// use ac_limiter::events::{SwitchEventKind, SwitchNotification};
    ///
    /// let value = serde_json::json!({"component": "switch:0", "event": "toggle", "state": false});
    /// let n = SwitchNotification::from_value(&value).unwrap();
    /// assert_eq!(n.kind, SwitchEventKind::Toggle { on: false });
    /// ```
    pub fn from_value(value: &Value) -> Option<Self> {
        let component = value.get("component")?.as_str()?;
        let event = value.get("event")?.as_str()?;

        let kind = match event {
            "toggle" => match value.get("state").and_then(Value::as_bool) {
                Some(on) => SwitchEventKind::Toggle { on },
                None => SwitchEventKind::Unknown(event.to_string()),
            },
            "power_update" => match value
                .get("apower")
                .or_else(|| value.get("power"))
                .and_then(Value::as_f64)
            {
                Some(power_w) => SwitchEventKind::PowerUpdate { power_w },
                None => SwitchEventKind::Unknown(event.to_string()),
            },
            "overcurrent" => SwitchEventKind::Overcurrent,
            "overcurrent_clear" => SwitchEventKind::OvercurrentClear,
            "config_changed" => SwitchEventKind::ConfigChanged,
            other => SwitchEventKind::Unknown(other.to_string()),
        };

        Some(Self::new(component, kind))
    }
}

// ============================================================================
// RPC replies
// ============================================================================

/// Error returned by the device for an RPC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcFailure {
    /// Device error code.
    pub code: i64,
    /// Device error message.
    pub message: String,
}

impl core::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

/// Result of a status read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SwitchStatus {
    /// AC voltage in volts.
    pub voltage: Option<f64>,
    /// Relay state.
    pub output: Option<bool>,
}

/// Result of a configuration read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SwitchSettings {
    /// Configured current limit in amps.
    pub current_limit_amps: Option<f64>,
}

/// A completed switch RPC.
#[derive(Clone, Debug, PartialEq)]
pub enum SwitchReply {
    /// Reply to a status read.
    Status(Result<SwitchStatus, RpcFailure>),
    /// Reply to a configuration read.
    Config(Result<SwitchSettings, RpcFailure>),
    /// Reply to a relay request.
    SetOutput {
        /// State that was requested.
        on: bool,
        /// Device outcome.
        result: Result<(), RpcFailure>,
    },
}

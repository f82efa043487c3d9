//! Shelly Gen2 switch over MQTT JSON-RPC.
//!
//! Requests go to `<prefix>/rpc` carrying `src = <rpc_source>`; the device
//! answers on `<rpc_source>/rpc` with the same `id`. Spontaneous traffic
//! arrives on `<prefix>/events/rpc`.
//!
//! # Frames
//!
//! ```json
//! {"id": 7, "src": "ac-limiter", "method": "Switch.Set", "params": {"id": 0, "on": true}}
//! {"id": 7, "src": "shellypro1pm-a8032ab1", "dst": "ac-limiter", "result": {"was_on": false}}
//! {"id": 8, "src": "shellypro1pm-a8032ab1", "dst": "ac-limiter", "error": {"code": -103, "message": "..."}}
//!
//! {"method": "NotifyStatus", "params": {"ts": 1.7e9, "switch:0": {"apower": 812.4, "output": true}}}
//! {"method": "NotifyEvent", "params": {"ts": 1.7e9, "events": [{"component": "switch:0", "event": "overcurrent"}]}}
//! ```
//!
//! Replies are matched to the method that produced them through a table of
//! pending request ids; replies with an unknown id are dropped.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::config::SwitchConfig;
use crate::events::{
    RpcFailure, SwitchEventKind, SwitchNotification, SwitchReply, SwitchSettings, SwitchStatus,
};
use crate::messages::{parse_object, PayloadError};
use crate::traits::{MqttClient, SwitchError, SwitchPort};

/// Outstanding requests kept for correlation; the oldest is dropped beyond this.
pub const MAX_PENDING_REQUESTS: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
enum PendingCall {
    Status,
    Config,
    SetOutput { on: bool },
}

/// [`SwitchPort`] implementation speaking Shelly RPC through an [`MqttClient`].
#[derive(Debug)]
pub struct ShellyRpcSwitch<C> {
    client: C,
    config: SwitchConfig,
    switch_id: u32,
    next_id: u64,
    pending: BTreeMap<u64, PendingCall>,
}

impl<C: MqttClient> ShellyRpcSwitch<C> {
    /// Create an adapter for the configured component.
    ///
    /// A component that does not name a switch falls back to id 0;
    /// [`Config::validate`](crate::config::Config::validate) rejects such
    /// configurations up front.
    pub fn new(client: C, config: SwitchConfig) -> Self {
        let switch_id = config.switch_id().unwrap_or(0);
        Self {
            client,
            config,
            switch_id,
            next_id: 1,
            pending: BTreeMap::new(),
        }
    }

    /// Underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Underlying client (mutable).
    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    /// Switch configuration.
    pub fn config(&self) -> &SwitchConfig {
        &self.config
    }

    /// Number of requests awaiting a reply.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn call(&mut self, method: &str, params: Value, kind: PendingCall) -> Result<(), SwitchError> {
        let id = self.next_id;
        let frame = json!({
            "id": id,
            "src": self.config.rpc_source,
            "method": method,
            "params": params,
        });
        let payload = serde_json::to_vec(&frame).map_err(|e| SwitchError::Encode(e.to_string()))?;

        self.client.publish(&self.config.rpc_topic(), &payload, false)?;
        self.next_id = self.next_id.wrapping_add(1);

        if self.pending.len() >= MAX_PENDING_REQUESTS {
            if let Some((&oldest, _)) = self.pending.iter().next() {
                debug!(id = oldest, "dropping unanswered switch request");
                self.pending.remove(&oldest);
            }
        }
        self.pending.insert(id, kind);
        debug!(id, method, "switch request sent");
        Ok(())
    }

    /// Decode a frame from the reply topic.
    ///
    /// Returns `Ok(None)` for replies that do not match a pending request.
    pub fn decode_reply(&mut self, payload: &[u8]) -> Result<Option<SwitchReply>, PayloadError> {
        let frame = parse_object(payload)?;
        let Some(id) = frame.get("id").and_then(Value::as_u64) else {
            return Ok(None);
        };
        let Some(kind) = self.pending.remove(&id) else {
            debug!(id, "reply for unknown switch request");
            return Ok(None);
        };

        let outcome = match frame.get("error").and_then(Value::as_object) {
            Some(error) => Err(RpcFailure {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            None => Ok(frame
                .get("result")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()),
        };

        let reply = match kind {
            PendingCall::Status => SwitchReply::Status(outcome.map(|r| SwitchStatus {
                voltage: r.get("voltage").and_then(Value::as_f64),
                output: r.get("output").and_then(Value::as_bool),
            })),
            PendingCall::Config => SwitchReply::Config(outcome.map(|r| SwitchSettings {
                current_limit_amps: r.get("current_limit").and_then(Value::as_f64),
            })),
            PendingCall::SetOutput { on } => SwitchReply::SetOutput {
                on,
                result: outcome.map(|_| ()),
            },
        };
        Ok(Some(reply))
    }

    /// Decode a frame from the events topic into notifications.
    ///
    /// `NotifyStatus` changes become toggle and power updates; `NotifyEvent`
    /// entries and bare `{component, event}` records are decoded directly.
    /// Other frames yield nothing.
    pub fn decode_notifications(
        &self,
        payload: &[u8],
    ) -> Result<Vec<SwitchNotification>, PayloadError> {
        let frame = parse_object(payload)?;
        let params = frame.get("params").and_then(Value::as_object);

        let notifications = match (frame.get("method").and_then(Value::as_str), params) {
            (Some("NotifyEvent"), Some(params)) => params
                .get("events")
                .and_then(Value::as_array)
                .map(|events| events.iter().filter_map(SwitchNotification::from_value).collect())
                .unwrap_or_default(),
            (Some("NotifyStatus"), Some(params)) => status_changes(params),
            _ => SwitchNotification::from_value(&Value::Object(frame))
                .into_iter()
                .collect(),
        };
        Ok(notifications)
    }
}

fn status_changes(params: &Map<String, Value>) -> Vec<SwitchNotification> {
    let mut out = Vec::new();
    for (component, status) in params {
        let Some(status) = status.as_object() else {
            continue;
        };
        if let Some(on) = status.get("output").and_then(Value::as_bool) {
            out.push(SwitchNotification::new(component.as_str(), SwitchEventKind::Toggle { on }));
        }
        if let Some(power_w) = status.get("apower").and_then(Value::as_f64) {
            out.push(SwitchNotification::new(
                component.as_str(),
                SwitchEventKind::PowerUpdate { power_w },
            ));
        }
    }
    out
}

impl<C: MqttClient> SwitchPort for ShellyRpcSwitch<C> {
    fn request_status(&mut self) -> Result<(), SwitchError> {
        let params = json!({ "id": self.switch_id });
        self.call("Switch.GetStatus", params, PendingCall::Status)
    }

    fn request_config(&mut self) -> Result<(), SwitchError> {
        let params = json!({ "id": self.switch_id });
        self.call("Switch.GetConfig", params, PendingCall::Config)
    }

    fn set_output(&mut self, on: bool) -> Result<(), SwitchError> {
        let params = json!({ "id": self.switch_id, "on": on });
        self.call("Switch.Set", params, PendingCall::SetOutput { on })
    }

    fn resubscribe(&mut self) -> Result<(), SwitchError> {
        self.client.resubscribe(&self.config.events_topic())?;
        self.client.resubscribe(&self.config.reply_topic())?;
        Ok(())
    }

    fn unsubscribe(&mut self) -> Result<(), SwitchError> {
        self.pending.clear();
        self.client.unsubscribe(&self.config.events_topic())?;
        self.client.unsubscribe(&self.config.reply_topic())?;
        Ok(())
    }
}

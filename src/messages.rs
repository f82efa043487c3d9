//! Station wire formats: telemetry, charge command and command reply.
//!
//! Inbound payloads are parsed permissively. Unknown fields are ignored and
//! missing or wrong-typed fields are treated as absent. Only a payload that
//! is not a JSON object at all is an error.
//!
//! # Telemetry (`<prefix>quota`)
//!
//! ```json
//! {"params": {"inv.outputWatts": -215, "inv.standbyWatts": 18, "bms.soc": 71}}
//! ```
//!
//! # Command (`<prefix>set`)
//!
//! ```json
//! {"id": 17, "version": "1.0", "moduleType": 5, "operateType": "acChgCfg",
//!  "params": {"chgWatts": 400, "chgPauseFlag": 255}}
//! ```
//!
//! # Reply (`<prefix>set_reply`)
//!
//! ```json
//! {"id": 17, "data": {"ack": 0, "chgWatts": 400}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::StationConfig;

/// Field names accepted for AC output power, in order of preference.
pub const AC_OUT_FIELDS: [&str; 2] = ["inv.outputWatts", "inv.acOutWatts"];

/// Field name for standby/inverter overhead power.
pub const STANDBY_FIELD: &str = "inv.standbyWatts";

/// `chgPauseFlag` value that leaves the station's pause setting untouched.
pub const PAUSE_FLAG_UNCHANGED: u8 = 255;

/// An inbound payload that could not be used at all.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Parse bytes into a top-level JSON object.
pub(crate) fn parse_object(payload: &[u8]) -> Result<Map<String, Value>, PayloadError> {
    match serde_json::from_slice::<Value>(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(PayloadError::NotAnObject),
    }
}

// ============================================================================
// Telemetry
// ============================================================================

/// Load figures extracted from one telemetry message.
///
/// Fields are raw: normalization (absolute value, standby floor) is applied by
/// the [`TelemetryIngestor`](crate::telemetry::TelemetryIngestor).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct QuotaReport {
    /// AC output power as reported (may be negative).
    pub ac_out_w: Option<f64>,
    /// Standby/inverter overhead as reported.
    pub standby_w: Option<f64>,
}

impl QuotaReport {
    /// Parse a telemetry payload.
    ///
    /// ```rust
    /// use ac_limiter::messages::QuotaReport;
    ///
    /// let report = QuotaReport::parse(br#"{"params":{"inv.acOutWatts":120,"x":1}}"#).unwrap();
    /// assert_eq!(report.ac_out_w, Some(120.0));
    /// assert_eq!(report.standby_w, None);
    /// ```
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        let root = parse_object(payload)?;
        let Some(params) = root.get("params").and_then(Value::as_object) else {
            return Ok(Self::default());
        };

        let ac_out_w = AC_OUT_FIELDS
            .iter()
            .find_map(|field| params.get(*field).and_then(Value::as_f64));
        let standby_w = params.get(STANDBY_FIELD).and_then(Value::as_f64);

        Ok(Self {
            ac_out_w,
            standby_w,
        })
    }

    /// Returns true if the message carried neither figure.
    pub fn is_empty(&self) -> bool {
        self.ac_out_w.is_none() && self.standby_w.is_none()
    }
}

// ============================================================================
// Command
// ============================================================================

/// Payload of a "set AC-in charge power" command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeParams {
    /// Target charge power in watts.
    pub chg_watts: u32,
    /// Pause flag; always [`PAUSE_FLAG_UNCHANGED`].
    pub chg_pause_flag: u8,
}

/// Outbound charge power command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCommand {
    /// Unique request id.
    pub id: u64,
    /// Protocol version tag.
    pub version: String,
    /// Module identifier.
    pub module_type: u8,
    /// Operation identifier.
    pub operate_type: String,
    /// Command payload.
    pub params: ChargeParams,
}

impl SetCommand {
    /// Build a charge power command using the station's identifiers.
    pub fn charge_power(id: u64, watts: u32, station: &StationConfig) -> Self {
        Self {
            id,
            version: station.version.clone(),
            module_type: station.module_type,
            operate_type: station.operate_type.clone(),
            params: ChargeParams {
                chg_watts: watts,
                chg_pause_flag: PAUSE_FLAG_UNCHANGED,
            },
        }
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

// ============================================================================
// Command reply
// ============================================================================

/// Outcome reported by the station for a charge command.
#[derive(Clone, Debug, PartialEq)]
pub enum SetReply {
    /// The station accepted the command and echoes the value it applied.
    Accepted {
        /// Request id, if echoed.
        id: Option<u64>,
        /// Charge power applied.
        watts: f64,
    },
    /// The station refused the command.
    Rejected {
        /// Request id, if echoed.
        id: Option<u64>,
        /// Error indicator as reported.
        reason: String,
    },
    /// Neither success nor failure could be recognized.
    Unrecognized,
}

impl SetReply {
    /// Parse a reply payload.
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        let root = parse_object(payload)?;
        let id = root.get("id").and_then(Value::as_u64);
        let Some(data) = root.get("data").and_then(Value::as_object) else {
            return Ok(Self::Unrecognized);
        };

        if let Some(error) = data.get("error").filter(|v| !v.is_null()) {
            let reason = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Ok(Self::Rejected { id, reason });
        }

        match data.get("ack").and_then(Value::as_i64) {
            Some(ack) if ack != 0 => {
                return Ok(Self::Rejected {
                    id,
                    reason: format!("ack={ack}"),
                })
            }
            _ => {}
        }

        match data.get("chgWatts").and_then(Value::as_f64) {
            Some(watts) => Ok(Self::Accepted { id, watts }),
            None => Ok(Self::Unrecognized),
        }
    }
}

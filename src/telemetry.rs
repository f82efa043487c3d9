//! Station telemetry and command acknowledgement intake.
//!
//! Receipt of a telemetry message counts as proof of life even when the
//! payload is unusable, so `last_quota_at` is stamped before parsing.

use crate::config::ControlConfig;
use crate::messages::{PayloadError, QuotaReport, SetReply};
use crate::state::ControlState;

/// Normalizes station payloads into [`ControlState`] fields.
#[derive(Clone, Debug)]
pub struct TelemetryIngestor {
    standby_floor_w: f64,
}

impl TelemetryIngestor {
    /// Build from the control thresholds.
    pub fn new(config: &ControlConfig) -> Self {
        Self {
            standby_floor_w: f64::from(config.standby_floor_w),
        }
    }

    /// Apply one telemetry payload.
    ///
    /// On a parse error the state is left untouched apart from
    /// `last_quota_at`. Absent fields keep their previous values.
    pub fn ingest_quota(
        &self,
        state: &mut ControlState,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<QuotaReport, PayloadError> {
        state.last_quota_at = now_ms;
        let report = QuotaReport::parse(payload)?;

        if let Some(ac_out) = report.ac_out_w {
            state.station_ac_out_w = ac_out.abs();
        }
        if let Some(standby) = report.standby_w {
            state.station_standby_w = standby.max(self.standby_floor_w);
        }
        Ok(report)
    }

    /// Parse a command acknowledgement. Never touches control state.
    pub fn parse_set_reply(&self, payload: &[u8]) -> Result<SetReply, PayloadError> {
        SetReply::parse(payload)
    }
}

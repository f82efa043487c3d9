//! Load-once configuration for the controller and its transports.
//!
//! Every section has sensible defaults and a builder so tests and the binary
//! can construct exactly what they need. Files are loaded with `figment`: a TOML
//! file merged with `AC_LIMITER__`-prefixed environment variables.
//!
//! # Example
//!
//! ```rust
//! use ac_limiter::config::{Config, ControlConfig, MqttConfig};
//!
//! // Use defaults
//! let config = Config::default();
//! assert!(config.validate().is_ok());
//!
//! // Or customize
//! let config = Config::default()
//!     .with_mqtt(MqttConfig::default().with_host("192.168.1.100"))
//!     .with_control(ControlConfig::default().with_max_charge_w(800));
//! assert_eq!(config.control.max_charge_w, 800);
//! ```

use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix for overrides (`AC_LIMITER__CONTROL__MAX_CHARGE_W=900`).
pub const ENV_PREFIX: &str = "AC_LIMITER__";

/// Shortest keep-alive the MQTT client accepts.
pub const MIN_KEEP_ALIVE_SECS: u16 = 5;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file or environment could not be parsed into a [`Config`].
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A value is out of range.
    #[error("invalid configuration: {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

// ============================================================================
// Main Config
// ============================================================================

/// Complete application configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Decision thresholds and pacing
    pub control: ControlConfig,
    /// Power station telemetry/command channel
    pub station: StationConfig,
    /// Current-limited switch (Shelly Gen2 over MQTT)
    pub switch: SwitchConfig,
    /// MQTT broker connection
    pub mqtt: MqttConfig,
    /// Raise the crate's log level to `debug`
    pub debug: bool,
}

impl Config {
    /// Load from a TOML file merged with `AC_LIMITER__*` environment overrides.
    ///
    /// The file is optional; a missing file yields defaults plus overrides.
    /// The result is validated before it is returned.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Config = Figment::from(figment::providers::Serialized::defaults(
            Config::default(),
        ))
        .merge(Toml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (no environment overrides).
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = Figment::from(figment::providers::Serialized::defaults(
            Config::default(),
        ))
        .merge(Toml::string(toml))
        .extract()
        .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control.validate()?;
        if self.station.topic_prefix.is_empty() {
            return Err(invalid("station.topic_prefix", "must not be empty"));
        }
        if self.switch.topic_prefix.is_empty() {
            return Err(invalid("switch.topic_prefix", "must not be empty"));
        }
        if self.switch.switch_id().is_none() {
            return Err(invalid(
                "switch.component",
                format!("expected `switch:<id>`, got `{}`", self.switch.component),
            ));
        }
        if self.mqtt.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(invalid(
                "mqtt.keep_alive_secs",
                format!("must be at least {MIN_KEEP_ALIVE_SECS}"),
            ));
        }
        Ok(())
    }

    /// Set control configuration
    pub fn with_control(mut self, control: ControlConfig) -> Self {
        self.control = control;
        self
    }

    /// Set station configuration
    pub fn with_station(mut self, station: StationConfig) -> Self {
        self.station = station;
        self
    }

    /// Set switch configuration
    pub fn with_switch(mut self, switch: SwitchConfig) -> Self {
        self.switch = switch;
        self
    }

    /// Set MQTT configuration
    pub fn with_mqtt(mut self, mqtt: MqttConfig) -> Self {
        self.mqtt = mqtt;
        self
    }

    /// Enable or disable debug logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

// ============================================================================
// Control Config
// ============================================================================

/// Decision thresholds, powers in watts and durations in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Conservative charge target used when restoring after a trip
    pub init_charge_w: u32,
    /// Lowest charge target ever commanded
    pub min_charge_w: u32,
    /// Highest charge target ever commanded
    pub max_charge_w: u32,
    /// Margin kept below the switch limit
    pub safety_buffer_w: u32,
    /// Commanded targets are rounded to multiples of this
    pub quant_step_w: u32,
    /// Smallest target change worth commanding
    pub min_delta_w: u32,
    /// Length of the rolling peak-power window
    pub peak_window_ms: u64,
    /// Spacing between optimizer runs
    pub optimize_interval_ms: u64,
    /// Minimum time after a trip before a restore is considered
    pub restore_delay_ms: u64,
    /// Switch notification silence that triggers a re-subscribe
    pub event_timeout_ms: u64,
    /// Station telemetry silence that triggers a re-subscribe
    pub mqtt_timeout_ms: u64,
    /// Telemetry older than this is too stale for restore decisions
    pub quota_max_age_ms: u64,
    /// Minimum spacing between outbound charge commands
    pub set_throttle_ms: u64,
    /// Control loop tick
    pub tick_ms: u64,
    /// Floor applied to reported standby/inverter overhead
    pub standby_floor_w: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            init_charge_w: 400,
            min_charge_w: 200,
            max_charge_w: 1200,
            safety_buffer_w: 100,
            quant_step_w: 10,
            min_delta_w: 20,
            peak_window_ms: 10_000,
            optimize_interval_ms: 5_000,
            restore_delay_ms: 30_000,
            event_timeout_ms: 120_000,
            mqtt_timeout_ms: 120_000,
            quota_max_age_ms: 30_000,
            set_throttle_ms: 3_000,
            tick_ms: 1_000,
            standby_floor_w: 20,
        }
    }
}

impl ControlConfig {
    /// Check ranges and ordering of the thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 14] = [
            ("control.init_charge_w", self.init_charge_w.into()),
            ("control.min_charge_w", self.min_charge_w.into()),
            ("control.max_charge_w", self.max_charge_w.into()),
            ("control.safety_buffer_w", self.safety_buffer_w.into()),
            ("control.quant_step_w", self.quant_step_w.into()),
            ("control.min_delta_w", self.min_delta_w.into()),
            ("control.peak_window_ms", self.peak_window_ms),
            ("control.optimize_interval_ms", self.optimize_interval_ms),
            ("control.restore_delay_ms", self.restore_delay_ms),
            ("control.event_timeout_ms", self.event_timeout_ms),
            ("control.mqtt_timeout_ms", self.mqtt_timeout_ms),
            ("control.quota_max_age_ms", self.quota_max_age_ms),
            ("control.set_throttle_ms", self.set_throttle_ms),
            ("control.tick_ms", self.tick_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(invalid(field, "must be positive"));
            }
        }
        if !(self.min_charge_w <= self.init_charge_w && self.init_charge_w <= self.max_charge_w) {
            return Err(invalid(
                "control.init_charge_w",
                format!(
                    "must satisfy min ({}) <= init ({}) <= max ({})",
                    self.min_charge_w, self.init_charge_w, self.max_charge_w
                ),
            ));
        }
        if self.min_charge_w % self.quant_step_w != 0 {
            return Err(invalid(
                "control.min_charge_w",
                format!("must be a multiple of quant_step_w ({})", self.quant_step_w),
            ));
        }
        if self.max_charge_w % self.quant_step_w != 0 {
            return Err(invalid(
                "control.max_charge_w",
                format!("must be a multiple of quant_step_w ({})", self.quant_step_w),
            ));
        }
        Ok(())
    }

    /// Set the restore charge target
    pub fn with_init_charge_w(mut self, w: u32) -> Self {
        self.init_charge_w = w;
        self
    }

    /// Set the minimum charge target
    pub fn with_min_charge_w(mut self, w: u32) -> Self {
        self.min_charge_w = w;
        self
    }

    /// Set the maximum charge target
    pub fn with_max_charge_w(mut self, w: u32) -> Self {
        self.max_charge_w = w;
        self
    }

    /// Set the safety buffer
    pub fn with_safety_buffer_w(mut self, w: u32) -> Self {
        self.safety_buffer_w = w;
        self
    }

    /// Set the quantization step
    pub fn with_quant_step_w(mut self, w: u32) -> Self {
        self.quant_step_w = w;
        self
    }

    /// Set the minimum meaningful delta
    pub fn with_min_delta_w(mut self, w: u32) -> Self {
        self.min_delta_w = w;
        self
    }

    /// Set the rolling window length
    pub fn with_peak_window_ms(mut self, ms: u64) -> Self {
        self.peak_window_ms = ms;
        self
    }

    /// Set the optimizer interval
    pub fn with_optimize_interval_ms(mut self, ms: u64) -> Self {
        self.optimize_interval_ms = ms;
        self
    }

    /// Set the restore delay
    pub fn with_restore_delay_ms(mut self, ms: u64) -> Self {
        self.restore_delay_ms = ms;
        self
    }

    /// Set the switch notification timeout
    pub fn with_event_timeout_ms(mut self, ms: u64) -> Self {
        self.event_timeout_ms = ms;
        self
    }

    /// Set the telemetry timeout
    pub fn with_mqtt_timeout_ms(mut self, ms: u64) -> Self {
        self.mqtt_timeout_ms = ms;
        self
    }

    /// Set the maximum telemetry age for restore decisions
    pub fn with_quota_max_age_ms(mut self, ms: u64) -> Self {
        self.quota_max_age_ms = ms;
        self
    }

    /// Set the command throttle interval
    pub fn with_set_throttle_ms(mut self, ms: u64) -> Self {
        self.set_throttle_ms = ms;
        self
    }

    /// Set the tick interval
    pub fn with_tick_ms(mut self, ms: u64) -> Self {
        self.tick_ms = ms;
        self
    }

    /// Set the standby overhead floor
    pub fn with_standby_floor_w(mut self, w: u32) -> Self {
        self.standby_floor_w = w;
        self
    }
}

// ============================================================================
// Station Config
// ============================================================================

/// Power station channel configuration.
///
/// Topics are formed by plain concatenation: `<topic_prefix>quota`,
/// `<topic_prefix>set`, `<topic_prefix>set_reply`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Prefix shared by the station topics (usually ends with `/`)
    pub topic_prefix: String,
    /// Protocol version tag carried in every command
    pub version: String,
    /// Module identifier for the AC charging configuration
    pub module_type: u8,
    /// Operation identifier for "set AC-in charge power"
    pub operate_type: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "station/".to_string(),
            version: "1.0".to_string(),
            module_type: 5,
            operate_type: "acChgCfg".to_string(),
        }
    }
}

impl StationConfig {
    /// Set the topic prefix
    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = prefix.to_string();
        self
    }

    /// Build a topic string with the configured prefix
    pub fn topic(&self, suffix: &str) -> String {
        format!("{}{}", self.topic_prefix, suffix)
    }

    /// Telemetry topic
    pub fn quota_topic(&self) -> String {
        self.topic("quota")
    }

    /// Outbound command topic
    pub fn set_topic(&self) -> String {
        self.topic("set")
    }

    /// Command acknowledgement topic
    pub fn set_reply_topic(&self) -> String {
        self.topic("set_reply")
    }
}

// ============================================================================
// Switch Config
// ============================================================================

/// Shelly Gen2 switch reachable over MQTT RPC.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Device topic prefix (the Shelly "MQTT prefix" setting)
    pub topic_prefix: String,
    /// Component whose notifications are consumed (`switch:<id>`)
    pub component: String,
    /// Source id for RPC requests; replies arrive on `<rpc_source>/rpc`
    pub rpc_source: String,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            topic_prefix: "shelly-campsite".to_string(),
            component: "switch:0".to_string(),
            rpc_source: "ac-limiter".to_string(),
        }
    }
}

impl SwitchConfig {
    /// Set the device topic prefix
    pub fn with_topic_prefix(mut self, prefix: &str) -> Self {
        self.topic_prefix = prefix.to_string();
        self
    }

    /// Set the consumed component
    pub fn with_component(mut self, component: &str) -> Self {
        self.component = component.to_string();
        self
    }

    /// Set the RPC source id
    pub fn with_rpc_source(mut self, source: &str) -> Self {
        self.rpc_source = source.to_string();
        self
    }

    /// Numeric id of the configured switch component
    pub fn switch_id(&self) -> Option<u32> {
        self.component.strip_prefix("switch:")?.parse().ok()
    }

    /// Topic RPC requests are published to
    pub fn rpc_topic(&self) -> String {
        format!("{}/rpc", self.topic_prefix)
    }

    /// Topic the device publishes notifications to
    pub fn events_topic(&self) -> String {
        format!("{}/events/rpc", self.topic_prefix)
    }

    /// Topic the device publishes RPC replies to
    pub fn reply_topic(&self) -> String {
        format!("{}/rpc", self.rpc_source)
    }
}

// ============================================================================
// MQTT Config
// ============================================================================

/// MQTT client configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker hostname or IP
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client ID (should be unique per broker)
    pub client_id: String,
    /// Username for authentication (empty = no auth)
    pub username: String,
    /// Password for authentication
    pub password: String,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "ac-limiter".to_string(),
            username: String::new(),
            password: String::new(),
            keep_alive_secs: 30,
        }
    }
}

impl MqttConfig {
    /// Set the broker host
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the broker port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the client ID
    pub fn with_client_id(mut self, id: &str) -> Self {
        self.client_id = id.to_string();
        self
    }

    /// Set authentication credentials
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Check if authentication is configured
    pub fn has_auth(&self) -> bool {
        !self.username.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

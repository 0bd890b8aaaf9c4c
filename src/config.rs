use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default obs-websocket host
pub const DEFAULT_ADDRESS: &str = "localhost";

/// Default obs-websocket port
pub const DEFAULT_PORT: u16 = 4455;

/// Where and how to open the obs-websocket session
///
/// Any change to these fields means a new session: see
/// [`ObsController::reconfigure`](crate::ObsController::reconfigure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Server password, if authentication is enabled in OBS
    #[serde(default)]
    pub password: Option<String>,
}

impl SessionConfig {
    /// WebSocket URL of the server
    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.address, self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            password: None,
        }
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Timing constants and attempt budgets
///
/// Durations are stored as milliseconds so the policy can be read from any
/// serde format without a duration adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Pause between failed connect attempts
    pub connect_retry_ms: u64,
    /// Pause after an unexpected close before reconnecting
    pub reconnect_delay_ms: u64,
    /// Granularity of the wait-for-session poll
    pub session_poll_ms: u64,
    /// Pause between applying state and reading it back
    pub settle_delay_ms: u64,
    /// Device-side sleep before triggering a studio mode transition
    pub transition_pause_ms: u64,
    /// Upper bound for a single request round trip
    pub request_timeout_ms: u64,
    pub preview_attempts: u32,
    pub transition_attempts: u32,
    pub volume_attempts: u32,
}

impl RetryPolicy {
    pub fn connect_retry(&self) -> Duration {
        Duration::from_millis(self.connect_retry_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn session_poll(&self) -> Duration {
        Duration::from_millis(self.session_poll_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            connect_retry_ms: 250,
            reconnect_delay_ms: 500,
            session_poll_ms: 250,
            settle_delay_ms: 250,
            transition_pause_ms: 100,
            request_timeout_ms: 10_000,
            preview_attempts: 5,
            transition_attempts: 10,
            volume_attempts: 5,
        }
    }
}

/// Everything an [`ObsController`](crate::ObsController) is built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Narrate reconciliation progress at debug level
    #[serde(default)]
    pub debug: bool,

    #[serde(flatten)]
    pub session: SessionConfig,

    #[serde(default)]
    pub timing: RetryPolicy,
}

impl ControllerConfig {
    /// Build a config from page-style query parameters.
    ///
    /// Recognized keys are `addr`, `port`, `pwd` and `debug`. A port that is
    /// not a positive number falls back to the default, and any non-empty
    /// `debug` value turns narration on. Unknown keys are ignored.
    ///
    /// ```
    /// use obs_local_controller::ControllerConfig;
    ///
    /// let config = ControllerConfig::from_params([("addr", "10.0.0.2"), ("port", "4456")]);
    /// assert_eq!(config.session.url(), "ws://10.0.0.2:4456");
    /// ```
    pub fn from_params<'a, I>(params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::default();
        for (key, value) in params {
            match key {
                "addr" if !value.is_empty() => config.session.address = value.to_string(),
                "port" => {
                    config.session.port = match value.trim().parse::<u16>() {
                        Ok(port) if port > 0 => port,
                        _ => DEFAULT_PORT,
                    }
                }
                "pwd" => config.session.password = Some(value.to_string()),
                "debug" => config.debug = !value.is_empty(),
                _ => {}
            }
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_obs() {
        let config = ControllerConfig::default();
        assert!(!config.debug);
        assert_eq!(config.session.url(), "ws://localhost:4455");
        assert_eq!(config.session.password, None);
        assert_eq!(config.timing.preview_attempts, 5);
        assert_eq!(config.timing.transition_attempts, 10);
        assert_eq!(config.timing.volume_attempts, 5);
        assert_eq!(config.timing.connect_retry(), Duration::from_millis(250));
        assert_eq!(config.timing.reconnect_delay(), Duration::from_millis(500));
    }

    #[test]
    fn deserializes_with_missing_fields() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"address": "obs.lan", "timing": {"volume_attempts": 2}}"#)
                .unwrap();
        assert_eq!(config.session.address, "obs.lan");
        assert_eq!(config.session.port, DEFAULT_PORT);
        assert_eq!(config.timing.volume_attempts, 2);
        assert_eq!(config.timing.settle_delay_ms, 250);
    }

    #[test]
    fn from_params_reads_page_parameters() {
        let config = ControllerConfig::from_params([
            ("addr", "192.168.1.20"),
            ("port", "4460"),
            ("pwd", "hunter2"),
            ("debug", "1"),
            ("theme", "dark"),
        ]);
        assert!(config.debug);
        assert_eq!(config.session.address, "192.168.1.20");
        assert_eq!(config.session.port, 4460);
        assert_eq!(config.session.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn from_params_falls_back_on_bad_port() {
        for bad in ["", "0", "abc", "70000"] {
            let config = ControllerConfig::from_params([("port", bad)]);
            assert_eq!(config.session.port, DEFAULT_PORT, "port {:?}", bad);
        }
    }

    #[test]
    fn from_params_ignores_empty_address_and_debug() {
        let config = ControllerConfig::from_params([("addr", ""), ("debug", "")]);
        assert_eq!(config.session.address, DEFAULT_ADDRESS);
        assert!(!config.debug);
    }
}

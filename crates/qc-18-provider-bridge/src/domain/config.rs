//! Bridge configuration with validation.

use crate::domain::methods::DenialPolicy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Main bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// WebSocket endpoint the page-side provider connects to
    pub websocket: WebSocketConfig,
    /// Approval round lifecycle
    pub approval: ApprovalConfig,
    /// Per-method overrides
    pub methods: MethodsConfig,
    /// Permission persistence
    pub storage: StorageConfig,
}

impl BridgeConfig {
    /// Parse a TOML document. Missing sections fall back to defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ws = &self.websocket;
        if ws.rate_limit == 0 {
            return Err(ConfigError::InvalidLimit("rate_limit cannot be 0".into()));
        }
        if ws.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }
        if ws.outbound_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "outbound_buffer cannot be 0".into(),
            ));
        }
        if ws.max_connections == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_connections cannot be 0".into(),
            ));
        }
        if !ws.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "websocket path must start with '/': {:?}",
                ws.path
            )));
        }
        if self.approval.round_ttl.is_zero() {
            return Err(ConfigError::InvalidTimeout("round_ttl cannot be 0".into()));
        }
        if self.approval.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "sweep_interval cannot be 0".into(),
            ));
        }
        if self.approval.prompt_buffer == 0 {
            return Err(ConfigError::InvalidLimit("prompt_buffer cannot be 0".into()));
        }
        Ok(())
    }

    /// Get WebSocket server bind address
    pub fn ws_addr(&self) -> SocketAddr {
        SocketAddr::new(self.websocket.host, self.websocket.port)
    }
}

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Bind address (localhost only by default)
    pub host: IpAddr,
    /// Port (default: 8547)
    pub port: u16,
    /// Enable WebSocket server
    pub enabled: bool,
    /// Upgrade path
    pub path: String,
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
    /// Messages per second per connection
    pub rate_limit: u32,
    /// Disconnect if no frame arrives for this long
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Responses buffered per connection before senders wait
    pub outbound_buffer: usize,
    /// Maximum concurrently registered connections
    pub max_connections: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8547,
            enabled: true,
            path: "/provider".to_string(),
            max_message_size: 1024 * 1024, // 1MB
            rate_limit: 100,
            idle_timeout: Duration::from_secs(300),
            outbound_buffer: 256,
            max_connections: 1024,
        }
    }
}

/// Approval round configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// A round older than this is released as denied (reason `expired`)
    #[serde(with = "humantime_serde")]
    pub round_ttl: Duration,
    /// How often the sweeper looks for expired rounds
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Prompts queued towards the UI before new ones are refused
    pub prompt_buffer: usize,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            round_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(5),
            prompt_buffer: 64,
        }
    }
}

/// Method overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodsConfig {
    /// Override the registry's answer-on-refusal for privileged methods
    pub denial_policies: HashMap<String, DenialPolicy>,
    /// Methods answered as method-not-found even if registered
    pub disabled_methods: HashSet<String>,
}

/// Permission persistence configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file for permission records (None = in-memory only)
    pub permissions_path: Option<PathBuf>,
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Duration (de)serialization as "30s" / "500ms" / "5m"
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}

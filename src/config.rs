//! Application configuration
//!
//! Loaded from a TOML file; every section and field falls back to its
//! default when absent.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};

/// Config file name inside the project config directory
pub const CONFIG_FILE_NAME: &str = "relay.toml";

/// Environment variable overriding the config path
pub const CONFIG_ENV_VAR: &str = "RELAY_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub status: StatusConfig,
    pub ui: UiConfig,
    pub client: ClientConfig,
}

/// Relay server sockets and framing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both sockets bind to
    pub bind_address: String,
    /// Host announced in discovery replies; detected when unset
    pub advertise_host: Option<String>,
    pub discovery_port: u16,
    pub stream_port: u16,
    /// Samples per frame
    pub buffer_size: usize,
    /// Bytes in the handshake region
    pub handshake_size: usize,
    pub handshake_timeout_ms: u64,
    pub listen_backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            advertise_host: None,
            discovery_port: DEFAULT_DISCOVERY_PORT,
            stream_port: DEFAULT_STREAM_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            handshake_size: DEFAULT_HANDSHAKE_SIZE,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            listen_backlog: DEFAULT_LISTEN_BACKLOG,
        }
    }
}

impl ServerConfig {
    /// Loopback config on ephemeral ports
    pub fn loopback() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            advertise_host: Some("127.0.0.1".to_string()),
            discovery_port: 0,
            stream_port: 0,
            ..Default::default()
        }
    }

    pub fn bind_ip(&self) -> Result<IpAddr> {
        self.bind_address
            .parse()
            .map_err(|_| Error::Config(format!("invalid bind_address: {}", self.bind_address)))
    }

    pub fn stream_bind_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.stream_port))
    }

    pub fn discovery_bind_addr(&self) -> Result<SocketAddr> {
        Ok(SocketAddr::new(self.bind_ip()?, self.discovery_port))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Bytes per frame on the wire
    pub fn frame_bytes(&self) -> usize {
        self.buffer_size * BYTES_PER_SAMPLE
    }
}

/// Periodic status rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_STATUS_INTERVAL_MS,
        }
    }
}

impl StatusConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// HTTP status API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Probe client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub broadcast_address: String,
    pub discovery_port: u16,
    pub discovery_timeout_ms: u64,
    pub discovery_attempts: u32,
    pub buffer_size: usize,
    pub handshake_size: usize,
    pub io_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broadcast_address: "255.255.255.255".to_string(),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_timeout_ms: 1000,
            discovery_attempts: 3,
            buffer_size: DEFAULT_BUFFER_SIZE,
            handshake_size: DEFAULT_HANDSHAKE_SIZE,
            io_timeout_ms: 2000,
        }
    }
}

impl ClientConfig {
    pub fn discovery_target(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.broadcast_address.parse().map_err(|_| {
            Error::Config(format!("invalid broadcast_address: {}", self.broadcast_address))
        })?;
        Ok(SocketAddr::new(ip, self.discovery_port))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }
}

impl AppConfig {
    /// Parse a TOML document
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
    }

    /// Load from `path`, or from the default location, or fall back to defaults
    ///
    /// An explicitly given path must exist; a missing default file is not an
    /// error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "Loading config");
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "Loading config");
                Self::load(&path)
            }
            _ => {
                tracing::debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Serialize back to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// `<config dir>/lan-voice-relay/relay.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lan-voice-relay")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Reject values the relay cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.buffer_size == 0 {
            return Err(Error::Config("server.buffer_size must be > 0".into()));
        }
        if self.server.handshake_size < 16 {
            return Err(Error::Config("server.handshake_size must be >= 16".into()));
        }
        if self.server.handshake_timeout_ms == 0 {
            return Err(Error::Config("server.handshake_timeout_ms must be > 0".into()));
        }
        if self.status.interval_ms == 0 {
            return Err(Error::Config("status.interval_ms must be > 0".into()));
        }
        if self.client.buffer_size == 0 {
            return Err(Error::Config("client.buffer_size must be > 0".into()));
        }
        self.server.bind_ip()?;
        Ok(())
    }
}

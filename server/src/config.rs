//! Server configuration types and defaults.
//!
//! Values come from an optional TOML file and are then overridden by
//! command-line flags in `main`. Everything here is read once at start-up.

use crate::error::ConfigError;
use crate::gamemode::Gamemode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-IP cap on concurrent connections.
///
/// Serialized as a plain integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum ConnectionLimit {
    Unlimited,
    PerIp(u32),
}

impl From<i64> for ConnectionLimit {
    fn from(value: i64) -> Self {
        if value < 0 {
            ConnectionLimit::Unlimited
        } else {
            ConnectionLimit::PerIp(value.min(u32::MAX as i64) as u32)
        }
    }
}

impl From<ConnectionLimit> for i64 {
    fn from(limit: ConnectionLimit) -> Self {
        match limit {
            ConnectionLimit::Unlimited => -1,
            ConnectionLimit::PerIp(max) => max as i64,
        }
    }
}

/// Deployment mode. Development trusts forwarded address headers as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Production,
    Development,
}

impl RunMode {
    pub fn trusts_forwarded_headers(self) -> bool {
        self == RunMode::Development
    }
}

/// Configuration for the game server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the WebSocket listener to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Name of the hosted gamemode, see [`Gamemode`]
    pub gamemode: String,

    /// Milliseconds per tick
    pub mspt: u64,

    /// Concurrent connections allowed per IP, `-1` for unlimited
    pub connections_per_ip: ConnectionLimit,

    /// Largest accepted WebSocket message in bytes
    pub max_payload_size: usize,

    pub mode: RunMode,

    /// Round length in ticks; the arena closes and the instance restarts
    /// when it elapses. Ignored by sandbox.
    pub round_ticks: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            gamemode: "ffa".to_string(),
            mspt: 40,
            connections_per_ip: ConnectionLimit::PerIp(1),
            max_payload_size: 4096,
            mode: RunMode::Production,
            round_ticks: None,
        }
    }
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Checks value ranges and resolves the gamemode.
    pub fn validate(&self) -> Result<Gamemode, ConfigError> {
        if self.mspt == 0 {
            return Err(ConfigError::Invalid("mspt must be greater than zero".into()));
        }
        if self.max_payload_size == 0 {
            return Err(ConfigError::Invalid(
                "max_payload_size must be greater than zero".into(),
            ));
        }
        if self.round_ticks == Some(0) {
            return Err(ConfigError::Invalid(
                "round_ticks must be greater than zero".into(),
            ));
        }

        let gamemode: Gamemode = self.gamemode.parse()?;
        if !gamemode.is_available() {
            return Err(ConfigError::UnavailableGamemode(self.gamemode.clone()));
        }
        Ok(gamemode)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn instance_config(&self) -> InstanceConfig {
        InstanceConfig {
            tick_period: Duration::from_millis(self.mspt),
            connection_limit: self.connections_per_ip,
            mode: self.mode,
        }
    }
}

/// The part of the configuration a game instance consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceConfig {
    pub tick_period: Duration,
    pub connection_limit: ConnectionLimit,
    pub mode: RunMode,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        ServerConfig::default().instance_config()
    }
}

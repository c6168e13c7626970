//! Error types for the server crate.
//!
//! Each concern gets its own enum so callers can tell expected conditions
//! (a refused connection, a closed socket) from genuine failures.

use crate::session::ClientId;
use std::path::PathBuf;

/// Failures while loading or validating the server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown gamemode \"{0}\"")]
    UnknownGamemode(String),

    #[error("unable to load gamemode \"{0}\": no arena is available for it")]
    UnavailableGamemode(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level server failures.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding, accepting or handshaking failures
    #[error("Network error: {0}")]
    Network(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Reasons a connection is refused before a session exists.
///
/// Every variant is terminal for that connection attempt and leaves the
/// instance untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("arena is not open")]
    ArenaNotOpen,

    #[error("client ips dont match (forwarded for {forwarded}, resolved {candidate})")]
    AddressMismatch { forwarded: String, candidate: String },

    #[error("client ip could not be determined")]
    MissingAddress,

    #[error("ip {0} is banned")]
    Banned(String),

    #[error("ip {ip} reached its connection limit ({count}/{limit})")]
    ConnectionLimit { ip: String, count: u32, limit: u32 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl AdmissionError {
    /// Whether the connection should be failed with a protocol-level close
    /// frame rather than having its transport dropped.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            AdmissionError::AddressMismatch { .. } | AdmissionError::MissingAddress
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("session {0} is already registered")]
    DuplicateSession(ClientId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport is closed")]
    Closed,

    /// The peer is not reading fast enough to drain its queue
    #[error("transport queue is full")]
    Backlogged,
}

//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, UplinkError>;

/// Crate error enumeration covering all internal failure modes.
///
/// Caller-facing call failures are expressed as
/// [`ErrorDetail`](crate::classify::ErrorDetail) values instead; `UplinkError`
/// is the plumbing-level error used between the crate's own components.
#[derive(Debug)]
pub enum UplinkError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Subordinate process could not be spawned or probed.
    Spawn(String),
    /// Stream channel failure between client and subordinate.
    Channel(String),
    /// Malformed or unexpected wire message.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for UplinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Channel(msg) => write!(f, "channel: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for UplinkError {}

impl From<toml::de::Error> for UplinkError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for UplinkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

//! Client configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::timeout::TimeoutTable;
use crate::{Result, UplinkError};

fn default_degradation_threshold() -> u32 {
    3
}

fn default_max_call_attempts() -> u32 {
    3
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

/// Client configuration parsed from `uplink.toml`.
///
/// The crate consumes this surface but does not own its discovery: callers
/// decide where the file lives (or build the value directly) and hand it to
/// [`UplinkClient::new`](crate::client::UplinkClient::new).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UplinkConfig {
    /// Subordinate service binary (e.g., `agent-service`).
    pub command: String,
    /// Arguments passed to the subordinate binary.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory the subordinate starts in.
    pub working_dir: PathBuf,
    /// Extra environment variables forwarded to the subordinate, on top of
    /// the built-in safe allowlist. Everything else is stripped.
    #[serde(default)]
    pub env_passthrough: Vec<String>,
    /// Per-operation-class timeout budgets.
    #[serde(default)]
    pub timeouts: TimeoutTable,
    /// Consecutive classified failures before the client degrades.
    #[serde(default = "default_degradation_threshold")]
    pub degradation_threshold: u32,
    /// Maximum attempts per call chain before a retryable failure is surfaced.
    #[serde(default = "default_max_call_attempts")]
    pub max_call_attempts: u32,
    /// Maximum spawn-and-probe attempts per connection effort before the
    /// effort is declared fatal for the current call chain.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Interval between proactive health probes, in seconds; 0 disables the
    /// probe task.
    #[serde(default)]
    pub health_check_interval_secs: u64,
}

impl UplinkConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `UplinkError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| UplinkError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `UplinkError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field constraints and canonicalize the working directory.
    ///
    /// # Errors
    ///
    /// Returns `UplinkError::Config` naming the first violated constraint.
    pub fn validate(&mut self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(UplinkError::Config("command must not be empty".into()));
        }

        if self.degradation_threshold == 0 {
            return Err(UplinkError::Config(
                "degradation_threshold must be greater than zero".into(),
            ));
        }

        if self.max_call_attempts == 0 {
            return Err(UplinkError::Config(
                "max_call_attempts must be greater than zero".into(),
            ));
        }

        if self.max_reconnect_attempts == 0 {
            return Err(UplinkError::Config(
                "max_reconnect_attempts must be greater than zero".into(),
            ));
        }

        for (name, entry) in [
            ("connection", &self.timeouts.connection),
            ("request", &self.timeouts.request),
            ("tool_call", &self.timeouts.tool_call),
            ("health_check", &self.timeouts.health_check),
            ("reconnect", &self.timeouts.reconnect),
        ] {
            if entry.base_ms == 0 {
                return Err(UplinkError::Config(format!(
                    "timeouts.{name}.base_ms must be greater than zero"
                )));
            }
            if entry.base_ms > entry.max_ms {
                return Err(UplinkError::Config(format!(
                    "timeouts.{name}.base_ms must not exceed max_ms"
                )));
            }
            if entry.multiplier < 1.0 {
                return Err(UplinkError::Config(format!(
                    "timeouts.{name}.multiplier must be at least 1.0"
                )));
            }
        }

        let canonical = self
            .working_dir
            .canonicalize()
            .map_err(|err| UplinkError::Config(format!("working_dir invalid: {err}")))?;
        self.working_dir = canonical;

        Ok(())
    }
}

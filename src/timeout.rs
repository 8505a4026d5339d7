//! Per-operation-class timeout policy.
//!
//! Every call carries an [`OperationClass`] that selects its timeout budget
//! from the [`TimeoutTable`]. Budgets grow exponentially with the retry
//! attempt and saturate at a per-class maximum: early attempts fail fast on
//! clearly-dead connections, later retries tolerate slow recovery such as a
//! process restart.

use std::time::Duration;

use serde::Deserialize;

/// Category of call used to select timeout policy.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// Initial connection and handshake probe.
    Connection,
    /// Ordinary request/response exchange.
    Request,
    /// Long-running tool invocation.
    ToolCall,
    /// Liveness probe against an already-connected subordinate.
    HealthCheck,
    /// Reconnection attempt after an unexpected disconnect.
    Reconnect,
}

/// Timeout budget parameters for one operation class.
///
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClassTimeout {
    /// Budget for the first attempt, in milliseconds.
    pub base_ms: u64,
    /// Upper bound the budget saturates at, in milliseconds.
    pub max_ms: u64,
    /// Per-attempt growth factor; must be at least 1.0.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_connection() -> ClassTimeout {
    ClassTimeout {
        base_ms: 2_000,
        max_ms: 10_000,
        multiplier: 2.0,
    }
}

fn default_request() -> ClassTimeout {
    ClassTimeout {
        base_ms: 5_000,
        max_ms: 30_000,
        multiplier: 2.0,
    }
}

fn default_tool_call() -> ClassTimeout {
    ClassTimeout {
        base_ms: 10_000,
        max_ms: 60_000,
        multiplier: 2.0,
    }
}

fn default_health_check() -> ClassTimeout {
    ClassTimeout {
        base_ms: 1_000,
        max_ms: 5_000,
        multiplier: 2.0,
    }
}

fn default_reconnect() -> ClassTimeout {
    ClassTimeout {
        base_ms: 1_000,
        max_ms: 15_000,
        multiplier: 2.0,
    }
}

/// Per-class timeout table. One entry per [`OperationClass`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TimeoutTable {
    /// Budget parameters for [`OperationClass::Connection`].
    #[serde(default = "default_connection")]
    pub connection: ClassTimeout,
    /// Budget parameters for [`OperationClass::Request`].
    #[serde(default = "default_request")]
    pub request: ClassTimeout,
    /// Budget parameters for [`OperationClass::ToolCall`].
    #[serde(default = "default_tool_call")]
    pub tool_call: ClassTimeout,
    /// Budget parameters for [`OperationClass::HealthCheck`].
    #[serde(default = "default_health_check")]
    pub health_check: ClassTimeout,
    /// Budget parameters for [`OperationClass::Reconnect`].
    #[serde(default = "default_reconnect")]
    pub reconnect: ClassTimeout,
}

impl Default for TimeoutTable {
    fn default() -> Self {
        Self {
            connection: default_connection(),
            request: default_request(),
            tool_call: default_tool_call(),
            health_check: default_health_check(),
            reconnect: default_reconnect(),
        }
    }
}

impl TimeoutTable {
    /// Budget parameters for the given class.
    #[must_use]
    pub fn get(&self, class: OperationClass) -> &ClassTimeout {
        match class {
            OperationClass::Connection => &self.connection,
            OperationClass::Request => &self.request,
            OperationClass::ToolCall => &self.tool_call,
            OperationClass::HealthCheck => &self.health_check,
            OperationClass::Reconnect => &self.reconnect,
        }
    }

    /// Timeout budget for `class` on retry `attempt` (starting at 1).
    ///
    /// Computes `min(base * multiplier^(attempt - 1), max)`. The result is
    /// monotonic non-decreasing in `attempt` (given `multiplier >= 1.0`,
    /// enforced at configuration validation) and saturates at `max_ms`, also
    /// on numeric overflow. `calculate(class, 1)` equals `base_ms` exactly.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn calculate(&self, class: OperationClass, attempt: u32) -> Duration {
        let entry = self.get(class);
        let exponent = f64::from(attempt.saturating_sub(1));
        let grown = (entry.base_ms as f64) * entry.multiplier.powf(exponent);

        let millis = if grown.is_finite() {
            grown.min(entry.max_ms as f64) as u64
        } else {
            entry.max_ms
        };

        Duration::from_millis(millis)
    }
}

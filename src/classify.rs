//! Failure classification.
//!
//! Maps raw failure signals (process exit, stream error, timeout, malformed
//! frame) onto a fixed taxonomy with a retryability flag and a user-facing
//! message. [`classify`] is total: it never fails and always returns a fully
//! populated [`ErrorDetail`].

use serde::{Deserialize, Serialize};

/// Classified failure code.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A request exceeded its deadline.
    Timeout,
    /// The subordinate process exited or its stream closed.
    ProcessExit,
    /// A frame could not be decoded or violated the wire contract.
    ProtocolError,
    /// The subordinate could not be spawned or probed.
    ConnectionRefused,
    /// Unclassifiable failure, including error payloads returned by the
    /// subordinate itself.
    Unknown,
    /// Deterministic degraded-mode fallback. Produced only by the degradation
    /// short-circuit, never by [`classify`] from a raw signal.
    Degraded,
}

/// Structured description of a single classified failure.
///
/// Produced fresh per failure and never mutated after construction.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Classified failure code.
    pub code: ErrorCode,
    /// Raw diagnostic message from the failing layer.
    pub raw_message: String,
    /// Whether the failure is worth retrying with a fresh attempt.
    pub retryable: bool,
    /// Short message suitable for surfacing to an end user.
    pub user_message: String,
}

/// Map a raw failure signal to a fully populated [`ErrorDetail`].
///
/// The mapping is fixed:
///
/// | code                | retryable | user message theme                    |
/// |---------------------|-----------|---------------------------------------|
/// | `Timeout`           | yes       | request took too long, retrying       |
/// | `ProcessExit`       | yes       | service restarting                    |
/// | `ProtocolError`     | no        | unexpected response                   |
/// | `ConnectionRefused` | yes       | service unavailable, retrying         |
/// | `Unknown`           | no        | generic failure                       |
#[must_use]
pub fn classify(code: ErrorCode, raw: &str) -> ErrorDetail {
    let (retryable, user_message) = match code {
        ErrorCode::Timeout => (
            true,
            "The request is taking longer than expected; retrying.",
        ),
        ErrorCode::ProcessExit => (true, "The service is restarting; please retry shortly."),
        ErrorCode::ProtocolError => (
            false,
            "The service returned an unexpected response.",
        ),
        ErrorCode::ConnectionRefused => (
            true,
            "The service is unavailable right now; retrying.",
        ),
        ErrorCode::Unknown | ErrorCode::Degraded => {
            (false, "The request could not be completed.")
        }
    };

    ErrorDetail {
        code,
        raw_message: raw.to_owned(),
        retryable,
        user_message: user_message.to_owned(),
    }
}

impl ErrorDetail {
    /// Deterministic degraded-mode fallback.
    ///
    /// Returned synchronously when the client deliberately avoids contacting
    /// an unhealthy subordinate. Not a failure classification: the caller can
    /// treat it as "service temporarily unavailable, try later".
    #[must_use]
    pub fn degraded() -> Self {
        Self {
            code: ErrorCode::Degraded,
            raw_message: "degraded mode active, subordinate not contacted".to_owned(),
            retryable: false,
            user_message: "The service is temporarily unavailable; please try again later."
                .to_owned(),
        }
    }

    /// Terminal-shutdown rejection, used once the client is closed.
    #[must_use]
    pub fn closed() -> Self {
        Self {
            code: ErrorCode::Unknown,
            raw_message: "client is shut down".to_owned(),
            retryable: false,
            user_message: "The service client has been shut down.".to_owned(),
        }
    }
}

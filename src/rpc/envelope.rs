//! Wire message envelopes.
//!
//! Each outbound frame carries a method name, parameters, and a correlation
//! id; each inbound frame echoes a correlation id with either a result
//! payload or a structured error payload. Frames without a correlation id are
//! notifications the client does not consume and are skipped.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Result, UplinkError};

/// Outbound request frame (client → subordinate).
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    /// Correlation id echoed by the subordinate's response.
    pub id: String,
    /// Method name, e.g. `task/plan` or `health/ping`.
    pub method: String,
    /// Method-specific parameters.
    pub params: Value,
}

/// Structured error payload inside an inbound response.
///
/// Subordinate-defined fields beyond `message` are ignored; the client does
/// not interpret method-level error semantics.
#[derive(Debug, Deserialize)]
struct ErrorPayload {
    /// Human-readable failure description.
    message: Option<String>,
}

/// Raw inbound frame (subordinate → client).
#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    id: Option<String>,
    result: Option<Value>,
    error: Option<ErrorPayload>,
}

/// Decoded inbound message relevant to the client.
#[derive(Debug)]
pub enum InboundMessage {
    /// Successful response for the given correlation id.
    Response {
        /// Correlation id of the originating request.
        id: String,
        /// Result payload.
        result: Value,
    },
    /// Subordinate-reported failure for the given correlation id.
    Failure {
        /// Correlation id of the originating request.
        id: String,
        /// Failure description from the subordinate's error payload.
        message: String,
    },
}

/// Parse a single NDJSON line from the subordinate's stdout.
///
/// # Return value
///
/// - `Ok(Some(msg))` — a complete response or failure with a correlation id.
/// - `Ok(None)` — blank line, or valid JSON without a correlation id
///   (a notification; silently skipped, logged at `DEBUG`).
/// - `Err(UplinkError::Protocol(...))` — not valid JSON, or a correlated
///   frame carrying neither `result` nor `error`.
pub fn parse_inbound_line(line: &str) -> Result<Option<InboundMessage>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let envelope: ResponseEnvelope = serde_json::from_str(line)
        .map_err(|e| UplinkError::Protocol(format!("malformed json: {e}")))?;

    let Some(id) = envelope.id else {
        debug!("wire: skipping inbound frame without correlation id");
        return Ok(None);
    };

    if let Some(result) = envelope.result {
        return Ok(Some(InboundMessage::Response { id, result }));
    }

    if let Some(error) = envelope.error {
        let message = error
            .message
            .unwrap_or_else(|| "subordinate returned an error without a message".to_owned());
        return Ok(Some(InboundMessage::Failure { id, message }));
    }

    Err(UplinkError::Protocol(format!(
        "response {id} carries neither result nor error"
    )))
}

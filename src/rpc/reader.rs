//! Subordinate stream reader task.
//!
//! Reads newline-delimited JSON frames from the subordinate's stdout, parses
//! each line into an [`InboundMessage`], and resolves the matching registry
//! entry. The reader is the sole producer of resolutions: callers never touch
//! the stream directly.
//!
//! The loop is driven by [`FramedRead`] backed by [`WireCodec`], which
//! enforces the 1 MiB per-line limit before any heap allocation for JSON
//! parsing.
//!
//! Malformed frames are reported as classified protocol errors and skipped —
//! they do **not** terminate the stream. EOF and unrecoverable I/O errors
//! emit [`ChannelEvent::Closed`] so the supervisor can tear the connection
//! down and bulk-reject whatever is still pending.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{classify, ErrorCode};
use crate::registry::RequestRegistry;
use crate::rpc::codec::WireCodec;
use crate::rpc::envelope::{parse_inbound_line, InboundMessage};
use crate::supervisor::ChannelEvent;
use crate::{Result, UplinkError};

/// Reader task — decodes NDJSON frames and resolves registry entries.
///
/// For each complete frame:
///
/// - a `result` response resolves the pending entry for its correlation id;
/// - an `error` response rejects it with a classified failure carrying the
///   subordinate's message;
/// - a notification (no correlation id) or an unparseable frame is logged
///   and skipped.
///
/// Responses may arrive in any order relative to requests; matching is by
/// correlation id only. A frame for an id that is no longer pending (late or
/// duplicate) is dropped silently by the registry.
///
/// # Cancellation
///
/// Respects `cancel`: when the token fires the reader exits cleanly without
/// emitting a close event.
///
/// # Errors
///
/// Returns `Ok(())` on clean EOF, I/O failure, or cancellation; stream
/// failures are communicated through `event_tx`, not the return value.
pub async fn run_reader<R>(
    stdout: R,
    registry: RequestRegistry,
    event_tx: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, WireCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!("reader: EOF detected");
                        send_closed(&event_tx, "stream closed").await;
                        break;
                    }

                    Some(Err(UplinkError::Protocol(ref msg))) => {
                        // Oversize frame — classified, logged, stream survives.
                        let detail = classify(ErrorCode::ProtocolError, msg);
                        warn!(
                            error = msg.as_str(),
                            code = ?detail.code,
                            "reader: framing error, skipping"
                        );
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "reader: IO error, stopping");
                        send_closed(&event_tx, &format!("stream error: {e}")).await;
                        break;
                    }

                    Some(Ok(line)) => {
                        dispatch_line(&registry, &line).await;
                    }
                }
            }
        }
    }

    Ok(())
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Parse one decoded line and route it into the registry.
async fn dispatch_line(registry: &RequestRegistry, line: &str) {
    match parse_inbound_line(line) {
        Ok(Some(InboundMessage::Response { id, result })) => {
            registry.resolve(&id, result).await;
        }
        Ok(Some(InboundMessage::Failure { id, message })) => {
            let detail = classify(ErrorCode::Unknown, &message);
            registry.reject(&id, detail).await;
        }
        Ok(None) => {
            // Blank line or notification — silently skipped.
        }
        Err(e) => {
            let detail = classify(ErrorCode::ProtocolError, &e.to_string());
            warn!(
                error = %e,
                code = ?detail.code,
                raw_line = line,
                "reader: parse error, skipping frame"
            );
        }
    }
}

/// Send [`ChannelEvent::Closed`] through `event_tx`, logging on failure.
async fn send_closed(event_tx: &mpsc::Sender<ChannelEvent>, reason: &str) {
    let event = ChannelEvent::Closed {
        reason: reason.to_owned(),
    };

    if event_tx.send(event).await.is_err() {
        debug!("reader: event_tx closed before Closed could be delivered");
    }
}

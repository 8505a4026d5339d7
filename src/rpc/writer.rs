//! Subordinate stream writer task.
//!
//! Receives outbound [`RequestEnvelope`]s from a tokio [`mpsc`] channel,
//! serialises each to a single-line JSON string, and writes the NDJSON line
//! to the subordinate's `stdin` using [`tokio::io::AsyncWriteExt`].
//!
//! A single writer task owns the stream, so every frame is written whole:
//! concurrent callers cannot interleave partial frames.

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::rpc::envelope::RequestEnvelope;
use crate::{Result, UplinkError};

/// Writer task — serialises outbound requests and writes to `stdin`.
///
/// Each envelope becomes one compact JSON line terminated by `\n`.
///
/// The task exits cleanly when:
/// - `cancel` is triggered (graceful shutdown), or
/// - `msg_rx` is closed (all senders dropped).
///
/// # Errors
///
/// - [`UplinkError::Protocol`]`("failed to serialise outbound request: …")`
///   if serialisation fails (should not occur for [`RequestEnvelope`]).
/// - [`UplinkError::Channel`]`("write failed: …")` if the write to `stdin`
///   fails (e.g. the subordinate process has exited).
pub async fn run_writer(
    stdin: ChildStdin,
    mut msg_rx: mpsc::Receiver<RequestEnvelope>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                match msg {
                    None => {
                        debug!("writer: message channel closed, stopping");
                        break;
                    }
                    Some(envelope) => {
                        let mut bytes = serde_json::to_vec(&envelope).map_err(|e| {
                            UplinkError::Protocol(format!(
                                "failed to serialise outbound request: {e}"
                            ))
                        })?;

                        // NDJSON: append the newline delimiter.
                        bytes.push(b'\n');

                        stdin.write_all(&bytes).await.map_err(|e| {
                            warn!(
                                id = envelope.id.as_str(),
                                error = %e,
                                "writer: write to stdin failed"
                            );
                            UplinkError::Channel(format!("write failed: {e}"))
                        })?;
                    }
                }
            }
        }
    }

    Ok(())
}

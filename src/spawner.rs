//! Subordinate process spawner and exit monitor.
//!
//! Spawns the subordinate service process with:
//! - `kill_on_drop(true)` so processes are cleaned up automatically.
//! - `env_clear()` + a safe variable allowlist (plus the configured
//!   passthrough names) to prevent credentials and other secrets from leaking
//!   into the child's environment.
//! - Piped stdio on all three streams; the caller owns `stdin`/`stdout` and
//!   must perform the handshake probe before starting the stream tasks.

use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::UplinkConfig;
use crate::supervisor::ChannelEvent;
use crate::{Result, UplinkError};

// ── Environment allowlist ────────────────────────────────────────────────────

/// Environment variables inherited by the spawned subordinate process.
///
/// Every other variable from the parent's environment is stripped via
/// `env_clear()` before the child is launched, except names the caller adds
/// through [`UplinkConfig::env_passthrough`].
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

// ── Connection handle ────────────────────────────────────────────────────────

/// Raw stdio handles to a freshly spawned subordinate process.
///
/// The caller is responsible for:
/// - Keeping `child` alive (it has `kill_on_drop(true)`).
/// - Probing the process over `stdin`/`stdout` before trusting it.
/// - Handing the handles to the reader/writer tasks afterwards.
#[derive(Debug)]
pub struct SubordinateProcess {
    /// Child process handle — kept alive so `kill_on_drop` works.
    pub child: Child,
    /// Subordinate's stdin for sending JSON frames.
    pub stdin: ChildStdin,
    /// Buffered reader over the subordinate's stdout for line-by-line
    /// NDJSON parsing.
    pub stdout: BufReader<ChildStdout>,
}

// ── Spawner ──────────────────────────────────────────────────────────────────

/// Spawn the subordinate service process.
///
/// Builds a `tokio::process::Command` with `env_clear()` and only the
/// variables listed in [`ALLOWED_ENV_VARS`] plus `config.env_passthrough`,
/// starts it in `config.working_dir`, and returns the raw stdio handles.
///
/// Readiness is not asserted here: the supervisor's handshake probe decides
/// within the connection timeout whether the process actually speaks the
/// protocol.
///
/// # Errors
///
/// - `UplinkError::Spawn("failed to spawn subordinate: …")` — OS spawn
///   failure (missing binary, exec error).
/// - `UplinkError::Spawn("failed to capture …")` — pipe setup failure.
pub async fn spawn_subordinate(config: &UplinkConfig) -> Result<SubordinateProcess> {
    let mut cmd = Command::new(&config.command);

    for arg in &config.args {
        cmd.arg(arg);
    }

    // Strip inherited environment, then inject only the safe allowlist
    // and the configured passthrough names.
    cmd.env_clear();
    for key in ALLOWED_ENV_VARS
        .iter()
        .copied()
        .chain(config.env_passthrough.iter().map(String::as_str))
    {
        if let Ok(val) = std::env::var(key) {
            cmd.env(key, val);
        }
    }

    cmd.current_dir(&config.working_dir)
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| UplinkError::Spawn(format!("failed to spawn subordinate: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| UplinkError::Spawn("failed to capture subordinate stdin".into()))?;
    let stdout_raw = child
        .stdout
        .take()
        .ok_or_else(|| UplinkError::Spawn("failed to capture subordinate stdout".into()))?;

    info!(command = config.command.as_str(), "subordinate process spawned");

    Ok(SubordinateProcess {
        child,
        stdin,
        stdout: BufReader::new(stdout_raw),
    })
}

// ── Exit monitor ─────────────────────────────────────────────────────────────

/// Spawn a background task that awaits child-process exit and emits
/// [`ChannelEvent::ProcessExited`] when it happens.
///
/// Exit code 0 denotes clean shutdown; a nonzero code or signal termination
/// is the crash path the supervisor's reconnect policy reacts to.
///
/// The task respects `cancel`: when the token is cancelled the task exits
/// without emitting an event (the caller is responsible for orderly
/// shutdown). Dropping the child handle here also kills a still-running
/// process via `kill_on_drop`.
///
/// # Returns
///
/// A [`JoinHandle`] for the monitoring task.  Dropping the handle detaches
/// the task; it continues running until the child exits or the token fires.
#[must_use]
pub fn monitor_exit(
    mut child: Child,
    event_tx: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            result = child.wait() => {
                let (code, reason) = match result {
                    Ok(status) => {
                        let code = status.code();
                        let reason = code.map_or_else(
                            || "process terminated by signal".to_owned(),
                            |c| format!("process exited with code {c}"),
                        );
                        (code, reason)
                    }
                    Err(err) => {
                        warn!(%err, "error waiting for subordinate child process");
                        (None, format!("wait error: {err}"))
                    }
                };

                let event = ChannelEvent::ProcessExited { code, reason };

                if event_tx.send(event).await.is_err() {
                    warn!("event_tx closed before ProcessExited could be delivered");
                }
            }
            () = cancel.cancelled() => {
                info!("monitor_exit: cancellation received, exiting monitor");
            }
        }
    })
}

//! Subordinate process lifecycle supervision.
//!
//! The supervisor owns the child process and the connection state machine:
//! spawn, handshake probe, exit/crash detection, and reconnection. Concurrent
//! callers needing a connection await one serialized effort instead of
//! spawning parallel subordinate processes.
//!
//! The handshake probe runs over the raw stdio handles *before* the stream
//! tasks start: a `health/ping` request is written and stdout is read line by
//! line until the matching correlation id is acknowledged or the operation
//! class's budget elapses. Banner lines and notifications emitted by the
//! subordinate during startup are skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::{classify, ErrorCode, ErrorDetail};
use crate::config::UplinkConfig;
use crate::degrade::DegradationController;
use crate::registry::RequestRegistry;
use crate::rpc::envelope::RequestEnvelope;
use crate::rpc::{reader, writer};
use crate::spawner::{monitor_exit, spawn_subordinate, SubordinateProcess};
use crate::timeout::OperationClass;
use crate::{Result, UplinkError};

/// Liveness probe method name, used for the handshake and health checks.
pub const PING_METHOD: &str = "health/ping";

/// Outbound channel capacity between callers and the writer task.
const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Event channel capacity between the stream tasks and the watcher.
const EVENT_CHANNEL_CAPACITY: usize = 8;

// ── State & events ───────────────────────────────────────────────────────────

/// Connection lifecycle state.
///
/// The supervisor stores the physical states; `Degraded` is a logical overlay
/// reported by [`UplinkClient::connection_state`](crate::client::UplinkClient::connection_state)
/// whenever the degradation controller trips, and is not mutually exclusive
/// with `Disconnected`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConnectionState {
    /// No subordinate process attached.
    Disconnected,
    /// A serialized connection effort is in flight.
    Connecting,
    /// Subordinate spawned and probe acknowledged.
    Connected,
    /// Degradation overlay: calls short-circuit to a deterministic fallback.
    Degraded,
    /// Terminal: no further operations accepted.
    Closed,
}

/// Events emitted by the stream tasks into the per-connection event channel.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The subordinate's stdout closed or failed before exit was observed.
    Closed {
        /// Human-readable close reason.
        reason: String,
    },
    /// The subordinate process terminated.
    ProcessExited {
        /// Process exit code, if available (`None` on signal termination).
        code: Option<i32>,
        /// Human-readable termination reason.
        reason: String,
    },
}

/// Live channel to a connected subordinate.
#[derive(Debug)]
struct ActiveChannel {
    /// Monotonic connection number; disconnect events for a superseded
    /// connection are ignored.
    epoch: u64,
    /// Outbound sender feeding the writer task.
    writer_tx: mpsc::Sender<RequestEnvelope>,
    /// Cancels the reader, writer, and exit-monitor tasks for this channel.
    cancel: CancellationToken,
}

// ── Supervisor ───────────────────────────────────────────────────────────────

/// Owns the subordinate process lifecycle and the connection state machine.
///
/// Cheap to clone; all clones share the same state. The child handle is owned
/// exclusively by the supervisor's exit-monitor task and is never mutated
/// outside it.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    config: Arc<UplinkConfig>,
    registry: RequestRegistry,
    degradation: Arc<DegradationController>,
    state: Arc<Mutex<ConnectionState>>,
    active: Arc<Mutex<Option<ActiveChannel>>>,
    /// Serializes connection efforts: concurrent callers await the same
    /// in-flight attempt rather than starting a second one.
    connect_gate: Arc<Mutex<()>>,
    epoch: Arc<AtomicU64>,
    connected_before: Arc<AtomicBool>,
}

impl ProcessSupervisor {
    /// Create a supervisor in the `Disconnected` state.
    #[must_use]
    pub fn new(
        config: Arc<UplinkConfig>,
        registry: RequestRegistry,
        degradation: Arc<DegradationController>,
    ) -> Self {
        Self {
            config,
            registry,
            degradation,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            active: Arc::new(Mutex::new(None)),
            connect_gate: Arc::new(Mutex::new(())),
            epoch: Arc::new(AtomicU64::new(0)),
            connected_before: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Current physical connection state.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Whether the supervisor has been shut down.
    pub async fn is_closed(&self) -> bool {
        *self.state.lock().await == ConnectionState::Closed
    }

    /// Ensure a live connection and return the outbound sender.
    ///
    /// Fast path: already connected. Otherwise one serialized connection
    /// effort runs a bounded attempt loop (spawn, probe, wire up stream
    /// tasks); concurrent callers blocked on the gate find the winner's
    /// channel on re-check. Initial connects probe with the `Connection`
    /// class budget, later reconnects with `Reconnect`.
    ///
    /// # Errors
    ///
    /// Every failed attempt increments the degradation controller. After
    /// `max_reconnect_attempts` failures the effort is fatal for the current
    /// call chain and surfaces a `ConnectionRefused` detail; callers must not
    /// retry it within the same chain.
    pub async fn ensure_connected(
        &self,
    ) -> std::result::Result<mpsc::Sender<RequestEnvelope>, ErrorDetail> {
        if let Some(tx) = self.connected_sender().await {
            return Ok(tx);
        }

        let _gate = self.connect_gate.lock().await;

        if *self.state.lock().await == ConnectionState::Closed {
            return Err(ErrorDetail::closed());
        }
        // The previous gate holder may have connected while we waited.
        if let Some(tx) = self.connected_sender().await {
            return Ok(tx);
        }

        let class = if self.connected_before.load(Ordering::SeqCst) {
            OperationClass::Reconnect
        } else {
            OperationClass::Connection
        };

        *self.state.lock().await = ConnectionState::Connecting;

        let max = self.config.max_reconnect_attempts;
        for attempt in 1..=max {
            match self.connect_once(class, attempt).await {
                Ok(tx) => {
                    *self.state.lock().await = ConnectionState::Connected;
                    self.connected_before.store(true, Ordering::SeqCst);
                    info!(attempt, ?class, "subordinate connected");
                    return Ok(tx);
                }
                Err(err) => {
                    self.degradation.record_failure();
                    warn!(attempt, max, error = %err, "connection attempt failed");
                    if attempt < max {
                        let backoff = Duration::from_millis(
                            self.config.timeouts.get(OperationClass::Reconnect).base_ms,
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        *self.state.lock().await = ConnectionState::Disconnected;
        Err(classify(
            ErrorCode::ConnectionRefused,
            &format!("exhausted {max} connection attempts"),
        ))
    }

    /// Tear everything down and refuse further operations.
    ///
    /// Terminal: cancels the stream tasks (killing a still-running child via
    /// `kill_on_drop`), rejects every pending request, and moves to `Closed`.
    /// Idempotent.
    pub async fn shutdown(&self) {
        let _gate = self.connect_gate.lock().await;

        {
            let mut state = self.state.lock().await;
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }

        if let Some(channel) = self.active.lock().await.take() {
            channel.cancel.cancel();
        }

        let rejected = self.registry.reject_all(&ErrorDetail::closed()).await;
        info!(rejected, "supervisor shut down, channel closed");
    }

    // ── Private ──────────────────────────────────────────────────────────────

    /// The writer sender, when the state is `Connected` and a channel exists.
    async fn connected_sender(&self) -> Option<mpsc::Sender<RequestEnvelope>> {
        if *self.state.lock().await != ConnectionState::Connected {
            return None;
        }
        self.active
            .lock()
            .await
            .as_ref()
            .map(|channel| channel.writer_tx.clone())
    }

    /// One spawn-probe-wire attempt.
    async fn connect_once(
        &self,
        class: OperationClass,
        attempt: u32,
    ) -> Result<mpsc::Sender<RequestEnvelope>> {
        let SubordinateProcess {
            child,
            mut stdin,
            mut stdout,
        } = spawn_subordinate(&self.config).await?;

        let budget = self.config.timeouts.calculate(class, attempt);
        if let Err(err) = probe(&mut stdin, &mut stdout, budget).await {
            let mut child = child;
            child.kill().await.ok();
            return Err(err);
        }

        // Probe acknowledged — wire up the stream tasks.
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        tokio::spawn(writer::run_writer(stdin, writer_rx, cancel.clone()));
        tokio::spawn(reader::run_reader(
            stdout,
            self.registry.clone(),
            event_tx.clone(),
            cancel.clone(),
        ));
        let _monitor = monitor_exit(child, event_tx, cancel.clone());
        self.spawn_disconnect_watcher(epoch, event_rx);

        *self.active.lock().await = Some(ActiveChannel {
            epoch,
            writer_tx: writer_tx.clone(),
            cancel,
        });

        Ok(writer_tx)
    }

    /// Consume the first terminal event of a connection and tear it down.
    fn spawn_disconnect_watcher(&self, epoch: u64, mut event_rx: mpsc::Receiver<ChannelEvent>) {
        let supervisor = self.clone();
        tokio::spawn(async move {
            // One terminal event per connection; later events from the same
            // channel describe the same teardown and die with the receiver.
            let Some(event) = event_rx.recv().await else {
                return;
            };
            supervisor.handle_disconnect(epoch, event).await;
        });
    }

    /// React to an observed stream close or process exit.
    ///
    /// Immediately bulk-rejects pending requests so no caller waits forever
    /// on a dead channel, then transitions to `Disconnected`. Reconnection is
    /// driven lazily by the next call's [`ensure_connected`](Self::ensure_connected).
    async fn handle_disconnect(&self, epoch: u64, event: ChannelEvent) {
        let (reason, clean) = match event {
            ChannelEvent::Closed { reason } => (reason, false),
            ChannelEvent::ProcessExited { code, reason } => (reason, code == Some(0)),
        };

        {
            let mut active = self.active.lock().await;
            if !active.as_ref().is_some_and(|channel| channel.epoch == epoch) {
                debug!(epoch, "disconnect event for a superseded connection, ignoring");
                return;
            }
            if let Some(channel) = active.take() {
                channel.cancel.cancel();
            }
        }

        {
            let mut state = self.state.lock().await;
            if *state != ConnectionState::Closed {
                *state = ConnectionState::Disconnected;
            }
        }

        let detail = classify(ErrorCode::ProcessExit, &reason);
        let rejected = self.registry.reject_all(&detail).await;
        if clean {
            info!(reason, rejected, "subordinate shut down cleanly");
        } else {
            warn!(reason, rejected, "subordinate disconnected unexpectedly");
        }
    }
}

// ── Handshake probe ──────────────────────────────────────────────────────────

/// Probe a freshly spawned subordinate over its raw stdio handles.
///
/// Writes a `health/ping` request and reads stdout line by line until a frame
/// echoing the probe's correlation id arrives or `budget` elapses. Unrelated
/// frames (startup banners, notifications) are logged at `DEBUG` and skipped.
/// The stream tasks must not be started until the probe succeeds.
///
/// # Errors
///
/// - `UplinkError::Spawn("probe timeout …")` — no acknowledgement in budget.
/// - `UplinkError::Spawn("subordinate exited during probe")` — EOF first.
/// - `UplinkError::Spawn("probe io error: …")` — underlying I/O failure.
async fn probe(
    stdin: &mut ChildStdin,
    stdout: &mut BufReader<ChildStdout>,
    budget: Duration,
) -> Result<()> {
    let id = format!("probe-{}", Uuid::new_v4());
    let request = RequestEnvelope {
        id: id.clone(),
        method: PING_METHOD.to_owned(),
        params: Value::Null,
    };

    let mut bytes = serde_json::to_vec(&request)
        .map_err(|e| UplinkError::Protocol(format!("failed to serialise probe: {e}")))?;
    bytes.push(b'\n');
    stdin
        .write_all(&bytes)
        .await
        .map_err(|e| UplinkError::Spawn(format!("probe write failed: {e}")))?;

    let deadline = tokio::time::Instant::now() + budget;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(UplinkError::Spawn(format!(
                "probe timeout: no acknowledgement within {budget:?}"
            )));
        }

        let mut line = String::new();
        let n = tokio::time::timeout(remaining, stdout.read_line(&mut line))
            .await
            .map_err(|_| {
                UplinkError::Spawn(format!(
                    "probe timeout: no acknowledgement within {budget:?}"
                ))
            })?
            .map_err(|e| UplinkError::Spawn(format!("probe io error: {e}")))?;

        if n == 0 {
            return Err(UplinkError::Spawn("subordinate exited during probe".into()));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(v) => {
                if v.get("id").and_then(Value::as_str) == Some(id.as_str()) {
                    debug!("probe acknowledged");
                    return Ok(());
                }
                debug!("probe: skipping unexpected frame before acknowledgement");
            }
            Err(e) => {
                debug!(error = %e, raw = trimmed, "probe: non-JSON line, skipping");
            }
        }
    }
}

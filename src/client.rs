//! Composition root: the public client surface.
//!
//! [`UplinkClient`] routes each call through the degradation check, the
//! process supervisor, the wire channel, and the request registry, and
//! returns a result or a classified [`ErrorDetail`] to the caller. Multiple
//! calls may be outstanding concurrently, multiplexed over the single stdio
//! stream by correlation id.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify::{classify, ErrorCode, ErrorDetail};
use crate::config::UplinkConfig;
use crate::degrade::DegradationController;
use crate::registry::RequestRegistry;
use crate::rpc::envelope::RequestEnvelope;
use crate::supervisor::{ConnectionState, ProcessSupervisor, PING_METHOD};
use crate::timeout::OperationClass;

/// Resilient client for a subordinate service process.
///
/// Explicitly constructed and explicitly owned: pass clones to call sites
/// (all clones share state) instead of relying on process-wide singletons.
#[derive(Debug, Clone)]
pub struct UplinkClient {
    config: Arc<UplinkConfig>,
    registry: RequestRegistry,
    degradation: Arc<DegradationController>,
    supervisor: ProcessSupervisor,
    shutdown: CancellationToken,
}

impl UplinkClient {
    /// Build a client from validated configuration.
    ///
    /// No subordinate process is spawned until the first call needs one.
    #[must_use]
    pub fn new(config: UplinkConfig) -> Self {
        let config = Arc::new(config);
        let registry = RequestRegistry::new();
        let degradation = Arc::new(DegradationController::new(config.degradation_threshold));
        let supervisor = ProcessSupervisor::new(
            Arc::clone(&config),
            registry.clone(),
            Arc::clone(&degradation),
        );

        Self {
            config,
            registry,
            degradation,
            supervisor,
            shutdown: CancellationToken::new(),
        }
    }

    /// Issue one request and await its result.
    ///
    /// The call suspends until its correlation id is resolved, rejected, or
    /// its deadline elapses — whichever comes first. Retryable failures are
    /// retried up to `max_call_attempts` with per-attempt timeout growth;
    /// non-retryable failures surface immediately. A connection effort that
    /// exhausts its own bounded attempts is fatal for the whole chain.
    ///
    /// While degraded, the call short-circuits without touching the
    /// supervisor or the stream and returns [`ErrorDetail::degraded`]
    /// synchronously. `HealthCheck` calls bypass the failure-threshold check
    /// (they are the recovery path) but not the manual offline override.
    ///
    /// # Errors
    ///
    /// Returns the last classified [`ErrorDetail`] when every attempt fails.
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        class: OperationClass,
    ) -> std::result::Result<Value, ErrorDetail> {
        if self.supervisor.is_closed().await {
            return Err(ErrorDetail::closed());
        }
        if self.degradation.offline_override() {
            debug!(method, "offline override set, short-circuiting call");
            return Err(ErrorDetail::degraded());
        }
        if class != OperationClass::HealthCheck && self.degradation.should_degrade() {
            debug!(method, "degraded, short-circuiting call");
            return Err(ErrorDetail::degraded());
        }

        let max = self.config.max_call_attempts;
        let mut last_detail: Option<ErrorDetail> = None;

        for attempt in 1..=max {
            // Connect failures already consumed their own bounded retry
            // budget inside the supervisor; surface them as fatal here.
            let sender = self.supervisor.ensure_connected().await?;

            let id = Uuid::new_v4().to_string();
            let budget = self.config.timeouts.calculate(class, attempt);

            let rx = match self.registry.register(&id, class, attempt, budget).await {
                Ok(rx) => rx,
                Err(err) => return Err(classify(ErrorCode::Unknown, &err.to_string())),
            };

            let envelope = RequestEnvelope {
                id: id.clone(),
                method: method.to_owned(),
                params: params.clone(),
            };

            if sender.send(envelope).await.is_err() {
                // Writer went away between ensure_connected and the send.
                let detail = classify(ErrorCode::ProcessExit, "outbound channel closed");
                self.registry.reject(&id, detail.clone()).await;
                self.degradation.record_failure();
                last_detail = Some(detail);
                continue;
            }

            match rx.await {
                Ok(Ok(result)) => {
                    self.degradation.record_success();
                    return Ok(result);
                }
                Ok(Err(detail)) => {
                    self.degradation.record_failure();
                    if detail.retryable && attempt < max {
                        debug!(
                            method,
                            attempt,
                            code = ?detail.code,
                            "retryable failure, retrying with grown budget"
                        );
                        last_detail = Some(detail);
                    } else {
                        return Err(detail);
                    }
                }
                Err(_) => {
                    self.degradation.record_failure();
                    return Err(classify(
                        ErrorCode::Unknown,
                        "pending request dropped without resolution",
                    ));
                }
            }
        }

        Err(last_detail
            .unwrap_or_else(|| classify(ErrorCode::Unknown, "call attempts exhausted")))
    }

    /// Set or clear the manual offline override.
    pub fn set_offline_mode(&self, offline: bool) {
        self.degradation.set_offline_mode(offline);
    }

    /// Whether calls currently short-circuit to the degraded fallback.
    #[must_use]
    pub fn should_degrade(&self) -> bool {
        self.degradation.should_degrade()
    }

    /// Timeout budget for `class` on retry `attempt` (starting at 1).
    #[must_use]
    pub fn calculate_timeout(&self, class: OperationClass, attempt: u32) -> Duration {
        self.config.timeouts.calculate(class, attempt)
    }

    /// Connection state, with the degradation overlay applied.
    pub async fn connection_state(&self) -> ConnectionState {
        let state = self.supervisor.connection_state().await;
        if state != ConnectionState::Closed && self.degradation.should_degrade() {
            ConnectionState::Degraded
        } else {
            state
        }
    }

    /// Number of requests currently in flight.
    pub async fn pending_requests(&self) -> usize {
        self.registry.len().await
    }

    /// Shut the client down. Terminal: pending requests are rejected, the
    /// subordinate is killed, and every later call returns a closed error.
    pub async fn disconnect(&self) {
        self.shutdown.cancel();
        self.supervisor.shutdown().await;
    }

    /// Start the periodic health probe task, if configured.
    ///
    /// Every `health_check_interval_secs` the probe issues a `health/ping`
    /// with the `HealthCheck` class through the normal call path, detecting a
    /// silently-wedged subordinate (process alive, unresponsive), resetting
    /// the failure streak on success. Returns `None` when the interval is 0
    /// (disabled). The task stops when the client is disconnected.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn_health_probe(&self) -> Option<JoinHandle<()>> {
        let interval_secs = self.config.health_check_interval_secs;
        if interval_secs == 0 {
            return None;
        }

        let client = self.clone();
        let interval = Duration::from_secs(interval_secs);

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = client.shutdown.cancelled() => {
                        debug!("health probe: client disconnected, stopping");
                        break;
                    }

                    () = tokio::time::sleep(interval) => {}
                }

                // Only probe an attached subordinate; reconnects are driven
                // by callers, not the probe.
                if client.supervisor.connection_state().await != ConnectionState::Connected {
                    continue;
                }

                match client
                    .call(PING_METHOD, Value::Null, OperationClass::HealthCheck)
                    .await
                {
                    Ok(_) => debug!("health probe acknowledged"),
                    Err(detail) => {
                        warn!(code = ?detail.code, raw = detail.raw_message.as_str(), "health probe failed");
                    }
                }
            }
        }))
    }
}

//! Degradation tracking.
//!
//! Tracks consecutive classified failures and an explicit offline override.
//! When degraded, the client short-circuits calls and returns a deterministic
//! fallback instead of spending timeout budget on a channel already known to
//! be unhealthy.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tracing::{info, warn};

/// Consecutive-failure counter with a manual offline override.
///
/// `should_degrade` is a pure read; the counter resets to zero on any
/// successful round-trip, while the manual override persists until it is
/// explicitly cleared.
#[derive(Debug)]
pub struct DegradationController {
    consecutive_failures: AtomicU32,
    offline_override: AtomicBool,
    threshold: u32,
}

impl DegradationController {
    /// Create a controller that degrades after `threshold` consecutive
    /// failures.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive_failures: AtomicU32::new(0),
            offline_override: AtomicBool::new(false),
            threshold,
        }
    }

    /// Whether calls should bypass the subordinate entirely.
    #[must_use]
    pub fn should_degrade(&self) -> bool {
        self.offline_override.load(Ordering::SeqCst)
            || self.consecutive_failures.load(Ordering::SeqCst) >= self.threshold
    }

    /// Whether the manual offline override is set.
    #[must_use]
    pub fn offline_override(&self) -> bool {
        self.offline_override.load(Ordering::SeqCst)
    }

    /// Record one classified failure.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures == self.threshold {
            warn!(failures, "degradation threshold reached");
        }
    }

    /// Record a successful round-trip, resetting the failure streak.
    pub fn record_success(&self) {
        let prior = self.consecutive_failures.swap(0, Ordering::SeqCst);
        if prior >= self.threshold {
            info!("failure streak cleared, leaving degraded mode");
        }
    }

    /// Set or clear the manual offline override.
    ///
    /// Independent of failure history: only an explicit
    /// `set_offline_mode(false)` clears it.
    pub fn set_offline_mode(&self, offline: bool) {
        self.offline_override.store(offline, Ordering::SeqCst);
        info!(offline, "offline override updated");
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }
}

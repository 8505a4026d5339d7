//! Unit tests for the degradation controller.

use agent_uplink::degrade::DegradationController;

#[test]
fn healthy_by_default() {
    let controller = DegradationController::new(3);
    assert!(!controller.should_degrade());
    assert_eq!(controller.consecutive_failures(), 0);
}

/// Degrades exactly when consecutive failures reach the threshold.
#[test]
fn trips_at_threshold() {
    let controller = DegradationController::new(3);

    controller.record_failure();
    assert!(!controller.should_degrade());
    controller.record_failure();
    assert!(!controller.should_degrade());
    controller.record_failure();
    assert!(controller.should_degrade());
}

/// One success clears the streak immediately.
#[test]
fn success_resets_streak() {
    let controller = DegradationController::new(2);

    controller.record_failure();
    controller.record_failure();
    assert!(controller.should_degrade());

    controller.record_success();
    assert!(!controller.should_degrade());
    assert_eq!(controller.consecutive_failures(), 0);
}

/// The manual override forces degradation regardless of failure count.
#[test]
fn offline_override_forces_degradation() {
    let controller = DegradationController::new(5);
    assert!(!controller.should_degrade());

    controller.set_offline_mode(true);
    assert!(controller.should_degrade());
    assert!(controller.offline_override());
}

/// Successes do not clear the manual override; only an explicit
/// `set_offline_mode(false)` does.
#[test]
fn only_manual_clear_releases_override() {
    let controller = DegradationController::new(3);
    controller.set_offline_mode(true);

    controller.record_success();
    assert!(controller.should_degrade(), "success must not clear override");

    controller.set_offline_mode(false);
    assert!(!controller.should_degrade());
}

/// Threshold 3: three consecutive failures degrade, a single subsequent
/// success recovers.
#[test]
fn threshold_scenario() {
    let controller = DegradationController::new(3);

    for _ in 0..3 {
        controller.record_failure();
    }
    assert!(controller.should_degrade());

    controller.record_success();
    assert!(!controller.should_degrade());
}

/// Failures past the threshold keep the controller degraded.
#[test]
fn stays_degraded_past_threshold() {
    let controller = DegradationController::new(2);
    for _ in 0..5 {
        controller.record_failure();
    }
    assert!(controller.should_degrade());
    assert_eq!(controller.consecutive_failures(), 5);
}

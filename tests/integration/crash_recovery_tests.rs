//! Crash detection and reconnection integration tests.

use serde_json::json;

use agent_uplink::classify::ErrorCode;
use agent_uplink::client::UplinkClient;
use agent_uplink::timeout::OperationClass;

use super::test_helpers::{sh_config, short_connection_budget, CRASH_AFTER_PROBE, SILENT_RESPONDER};

/// Subordinate crashes with two requests in flight: both callers receive a
/// retryable `ProcessExit` detail instead of waiting out their deadlines.
#[tokio::test]
async fn crash_rejects_all_pending_requests() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = UplinkClient::new(sh_config(dir.path(), CRASH_AFTER_PROBE));

    let (a, b) = tokio::join!(
        client.call("task/plan", json!({"id": "A"}), OperationClass::Request),
        client.call("task/plan", json!({"id": "B"}), OperationClass::Request),
    );

    for outcome in [a, b] {
        let detail = outcome.expect_err("crashed mid-flight");
        assert_eq!(detail.code, ErrorCode::ProcessExit);
        assert!(detail.retryable);
    }
    assert_eq!(client.pending_requests().await, 0);
}

/// A retryable crash drives a fresh spawn on the next attempt of the same
/// call chain.
#[tokio::test]
async fn crash_triggers_reconnect_on_retry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = sh_config(dir.path(), CRASH_AFTER_PROBE);
    config.max_call_attempts = 2;
    let client = UplinkClient::new(config);

    let detail = client
        .call("task/plan", json!({}), OperationClass::Request)
        .await
        .expect_err("every incarnation crashes");
    assert_eq!(detail.code, ErrorCode::ProcessExit);

    let spawns = std::fs::read_to_string(dir.path().join("spawns.log")).expect("marker file");
    assert_eq!(
        spawns.lines().count(),
        2,
        "second attempt must spawn a fresh subordinate"
    );
    assert!(
        !client.should_degrade(),
        "two failures stay under the default threshold"
    );
}

/// A subordinate that never acknowledges the probe exhausts the bounded
/// connection attempts and surfaces `ConnectionRefused`.
#[tokio::test]
async fn unresponsive_probe_exhausts_connection_attempts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = sh_config(dir.path(), SILENT_RESPONDER);
    config.timeouts.connection = short_connection_budget();
    config.max_reconnect_attempts = 2;
    let client = UplinkClient::new(config);

    let detail = client
        .call("task/plan", json!({}), OperationClass::Request)
        .await
        .expect_err("probe never acknowledged");

    assert_eq!(detail.code, ErrorCode::ConnectionRefused);
    assert!(detail.retryable);
    assert!(detail.raw_message.contains("exhausted 2 connection attempts"));
}

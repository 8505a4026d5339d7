//! Shared helpers for integration tests.
//!
//! The subordinate is stubbed with small POSIX `sh` scripts speaking the
//! NDJSON wire protocol: each script extracts the correlation id from the
//! incoming frame with `sed` and echoes a response carrying the same id.
//! Scripts run in a per-test temporary working directory so they can leave
//! observable markers (spawn counts) behind.

use std::path::Path;

use agent_uplink::config::UplinkConfig;
use agent_uplink::timeout::{ClassTimeout, TimeoutTable};

/// Acknowledges every request (probe included) with `{"ok":true}`.
pub const OK_RESPONDER: &str = r#"
extract() { printf '%s\n' "$1" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p'; }
while IFS= read -r line; do
  id=$(extract "$line")
  printf '{"id":"%s","result":{"ok":true}}\n' "$id"
done
"#;

/// Replies to every request with a structured error payload.
pub const ERROR_RESPONDER: &str = r#"
extract() { printf '%s\n' "$1" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p'; }
while IFS= read -r line; do
  id=$(extract "$line")
  printf '{"id":"%s","error":{"message":"boom"}}\n' "$id"
done
"#;

/// Answers only `health/ping` frames; every other request is swallowed and
/// left to time out.
pub const PING_ONLY_RESPONDER: &str = r#"
extract() { printf '%s\n' "$1" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p'; }
while IFS= read -r line; do
  id=$(extract "$line")
  case "$line" in
    *health/ping*) printf '{"id":"%s","result":"pong"}\n' "$id" ;;
  esac
done
"#;

/// Records a spawn marker, acknowledges the handshake probe, then crashes
/// with exit code 1 as soon as the next frame arrives.
pub const CRASH_AFTER_PROBE: &str = r#"
printf 'spawn\n' >> spawns.log
extract() { printf '%s\n' "$1" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p'; }
IFS= read -r line
id=$(extract "$line")
printf '{"id":"%s","result":"ready"}\n' "$id"
IFS= read -r line
exit 1
"#;

/// Acknowledges the probe and one request, then exits cleanly with code 0.
pub const CLEAN_EXIT_AFTER_ONE: &str = r#"
extract() { printf '%s\n' "$1" | sed -n 's/.*"id":"\([^"]*\)".*/\1/p'; }
IFS= read -r line
id=$(extract "$line")
printf '{"id":"%s","result":"ready"}\n' "$id"
IFS= read -r line
id=$(extract "$line")
printf '{"id":"%s","result":"done"}\n' "$id"
exit 0
"#;

/// Consumes stdin forever without ever responding.
pub const SILENT_RESPONDER: &str = "cat > /dev/null";

/// Build a validated config running `script` under `/bin/sh` in `dir`.
///
/// Attempt bounds default to 1 so tests observe single failures directly;
/// individual tests override fields as needed before building the client.
pub fn sh_config(dir: &Path, script: &str) -> UplinkConfig {
    let mut config = UplinkConfig {
        command: "/bin/sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        working_dir: dir.to_path_buf(),
        env_passthrough: Vec::new(),
        timeouts: TimeoutTable::default(),
        degradation_threshold: 3,
        max_call_attempts: 1,
        max_reconnect_attempts: 1,
        health_check_interval_secs: 0,
    };
    config.validate().expect("valid test config");
    config
}

/// A short probe budget for tests that exercise connection failure.
pub fn short_connection_budget() -> ClassTimeout {
    ClassTimeout {
        base_ms: 300,
        max_ms: 600,
        multiplier: 2.0,
    }
}

//! Unit tests for wire message envelopes.

use serde_json::json;

use agent_uplink::rpc::envelope::{parse_inbound_line, InboundMessage, RequestEnvelope};

#[test]
fn result_frame_parses_to_response() {
    let parsed = parse_inbound_line(r#"{"id":"abc","result":{"plan":["step"]}}"#)
        .expect("parse")
        .expect("message");

    match parsed {
        InboundMessage::Response { id, result } => {
            assert_eq!(id, "abc");
            assert_eq!(result, json!({"plan": ["step"]}));
        }
        InboundMessage::Failure { .. } => panic!("expected a response"),
    }
}

#[test]
fn error_frame_parses_to_failure() {
    let parsed = parse_inbound_line(r#"{"id":"abc","error":{"code":-32000,"message":"boom"}}"#)
        .expect("parse")
        .expect("message");

    match parsed {
        InboundMessage::Failure { id, message } => {
            assert_eq!(id, "abc");
            assert_eq!(message, "boom");
        }
        InboundMessage::Response { .. } => panic!("expected a failure"),
    }
}

/// An error payload without a message still produces a populated failure.
#[test]
fn error_frame_without_message_gets_fallback() {
    let parsed = parse_inbound_line(r#"{"id":"abc","error":{}}"#)
        .expect("parse")
        .expect("message");

    match parsed {
        InboundMessage::Failure { message, .. } => {
            assert!(!message.is_empty());
        }
        InboundMessage::Response { .. } => panic!("expected a failure"),
    }
}

/// Frames without a correlation id are notifications and are skipped.
#[test]
fn notification_without_id_is_skipped() {
    let parsed = parse_inbound_line(r#"{"method":"status/update","params":{}}"#).expect("parse");
    assert!(parsed.is_none());
}

#[test]
fn blank_lines_are_skipped() {
    assert!(parse_inbound_line("").expect("parse").is_none());
    assert!(parse_inbound_line("   \t").expect("parse").is_none());
}

#[test]
fn malformed_json_is_protocol_error() {
    let err = parse_inbound_line("{not json").expect_err("malformed");
    assert!(err.to_string().starts_with("protocol:"));
    assert!(err.to_string().contains("malformed json"));
}

/// A correlated frame must carry a result or an error.
#[test]
fn correlated_frame_without_payload_is_protocol_error() {
    let err = parse_inbound_line(r#"{"id":"abc"}"#).expect_err("no payload");
    assert!(err.to_string().contains("neither result nor error"));
}

#[test]
fn request_envelope_serializes_compactly() {
    let envelope = RequestEnvelope {
        id: "req-1".to_owned(),
        method: "health/ping".to_owned(),
        params: json!(null),
    };

    let line = serde_json::to_string(&envelope).expect("serialize");
    assert!(line.contains(r#""id":"req-1""#));
    assert!(line.contains(r#""method":"health/ping""#));
    assert!(!line.contains('\n'), "delimiter is the writer's concern");
}

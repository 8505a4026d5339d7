//! Unit tests for `UplinkError` display formatting.

use agent_uplink::UplinkError;

#[test]
fn display_prefixes_per_variant() {
    assert_eq!(
        UplinkError::Config("bad value".into()).to_string(),
        "config: bad value"
    );
    assert_eq!(
        UplinkError::Spawn("no such binary".into()).to_string(),
        "spawn: no such binary"
    );
    assert_eq!(
        UplinkError::Channel("write failed".into()).to_string(),
        "channel: write failed"
    );
    assert_eq!(
        UplinkError::Protocol("malformed json".into()).to_string(),
        "protocol: malformed json"
    );
    assert_eq!(UplinkError::Io("broken pipe".into()).to_string(), "io: broken pipe");
}

#[test]
fn variants_are_distinct() {
    let spawn = UplinkError::Spawn("boom".into());
    let channel = UplinkError::Channel("boom".into());
    assert_ne!(spawn.to_string(), channel.to_string());
}

#[test]
fn messages_have_no_trailing_period() {
    let err = UplinkError::Protocol("line too long".into());
    assert!(!err.to_string().ends_with('.'));
}

#[test]
fn implements_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(UplinkError::Io("eof".into()));
    assert!(!err.to_string().is_empty());
}

#[test]
fn toml_errors_map_to_config() {
    let parse_err = toml::from_str::<toml::Value>("not = = valid").unwrap_err();
    let err: UplinkError = parse_err.into();
    assert!(err.to_string().starts_with("config:"));
}

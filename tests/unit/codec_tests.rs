//! Unit tests for the NDJSON wire codec.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use agent_uplink::rpc::codec::{WireCodec, MAX_LINE_BYTES};

#[test]
fn decodes_one_complete_line() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from(&b"{\"id\":\"a\"}\n"[..]);

    let line = codec.decode(&mut buf).expect("decode").expect("complete");
    assert_eq!(line, "{\"id\":\"a\"}");
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

/// Incomplete trailing bytes are buffered until the delimiter arrives.
#[test]
fn buffers_partial_frames_across_reads() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from(&b"{\"id\":"[..]);

    assert!(codec.decode(&mut buf).expect("decode").is_none());

    buf.put_slice(b"\"a\"}\n");
    let line = codec.decode(&mut buf).expect("decode").expect("complete");
    assert_eq!(line, "{\"id\":\"a\"}");
}

/// Multiple frames in one read decode in arrival order.
#[test]
fn preserves_arrival_order() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from(&b"first\nsecond\n"[..]);

    assert_eq!(codec.decode(&mut buf).expect("decode").expect("one"), "first");
    assert_eq!(codec.decode(&mut buf).expect("decode").expect("two"), "second");
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

/// Oversize lines are rejected as protocol errors without allocating.
#[test]
fn oversize_line_is_protocol_error() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::with_capacity(MAX_LINE_BYTES + 2);
    buf.put_bytes(b'x', MAX_LINE_BYTES + 1);
    buf.put_u8(b'\n');

    let err = codec.decode(&mut buf).expect_err("line too long");
    assert!(err.to_string().starts_with("protocol:"));
    assert!(err.to_string().contains("line too long"));
}

/// EOF flushes a trailing unterminated line.
#[test]
fn decode_eof_flushes_trailing_bytes() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::from(&b"tail-without-newline"[..]);

    assert!(codec.decode(&mut buf).expect("decode").is_none());
    let line = codec
        .decode_eof(&mut buf)
        .expect("decode_eof")
        .expect("flushed");
    assert_eq!(line, "tail-without-newline");
}

#[test]
fn encode_appends_delimiter() {
    let mut codec = WireCodec::new();
    let mut buf = BytesMut::new();

    codec
        .encode("{\"id\":\"out\"}".to_owned(), &mut buf)
        .expect("encode");
    assert_eq!(&buf[..], b"{\"id\":\"out\"}\n");
}

//! NDJSON codec for subordinate stdio streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length to prevent memory exhaustion caused by unterminated or maliciously
//! large messages from a misbehaving subordinate process.
//!
//! # Usage
//!
//! Use [`WireCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] (inbound) and
//! [`tokio_util::codec::FramedWrite`] (outbound).  Both directions enforce
//! UTF-8 line framing delimited by `\n`.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{Result, UplinkError};

/// Maximum line length accepted by the wire codec: 1 MiB.
///
/// Lines exceeding this limit on the inbound stream cause [`WireCodec::decode`]
/// to return [`UplinkError::Protocol`] with `"line too long"`, protecting the
/// client from allocating unbounded memory for a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON codec for bidirectional subordinate streams.
///
/// Delegates line-framing to [`LinesCodec`] with a fixed
/// [`MAX_LINE_BYTES`] limit.  Each newline-terminated (`\n`) UTF-8 string
/// is one complete wire message; incomplete trailing bytes are buffered
/// across reads.
///
/// # Decoder
///
/// Inbound lines longer than [`MAX_LINE_BYTES`] return
/// [`UplinkError::Protocol`]`("line too long: …")` rather than allocating.
/// I/O errors are mapped to [`UplinkError::Io`].
///
/// # Encoder
///
/// Outbound strings are encoded as `item\n`.  The max-length limit is a
/// decoder-side concern and is not enforced during encoding.
#[derive(Debug)]
pub struct WireCodec(LinesCodec);

impl WireCodec {
    /// Create a new `WireCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = String;
    type Error = UplinkError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` contains no complete line yet (buffering).
    /// Returns `Err(UplinkError::Protocol("line too long: …"))` when the line
    /// exceeds [`MAX_LINE_BYTES`].
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final line when the stream reaches EOF.
    ///
    /// Delegates to [`LinesCodec::decode_eof`], applying the same error mapping.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for WireCodec {
    type Error = UplinkError;

    /// Encode `item` as a `\n`-terminated NDJSON line into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`UplinkError::Io`] on underlying I/O failures.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // LinesCodec::encode does not enforce a max line length;
        // the limit applies only to decoding.
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to an [`UplinkError`].
fn map_codec_error(e: LinesCodecError) -> UplinkError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            UplinkError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => UplinkError::Io(io_err.to_string()),
    }
}

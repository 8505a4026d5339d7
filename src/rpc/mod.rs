//! Wire protocol: NDJSON framing, message envelopes, and the stream tasks
//! that connect the subordinate's stdio to the request registry.

pub mod codec;
pub mod envelope;
pub mod reader;
pub mod writer;

#![forbid(unsafe_code)]

//! `agent-uplink` — resilient client for a process-hosted request/response
//! protocol.
//!
//! Spawns and supervises a subordinate service process, exchanges
//! newline-delimited JSON frames with it over stdio, and shields callers from
//! transient failures through adaptive timeouts, bounded retries, and a
//! degradation mode that keeps the calling application responsive while the
//! subordinate is unhealthy.

pub mod classify;
pub mod client;
pub mod config;
pub mod degrade;
pub mod errors;
pub mod registry;
pub mod rpc;
pub mod spawner;
pub mod supervisor;
pub mod timeout;

pub use classify::{classify, ErrorCode, ErrorDetail};
pub use client::UplinkClient;
pub use config::UplinkConfig;
pub use errors::{Result, UplinkError};
pub use supervisor::ConnectionState;
pub use timeout::OperationClass;

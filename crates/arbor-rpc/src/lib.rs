//! JSON-RPC client for the branch-execution service.
//!
//! The remote endpoint speaks JSON-RPC 2.0 over HTTP POST and may answer a
//! request either with a plain JSON document or with an SSE-framed body
//! carrying the same envelope. [`codec`] extracts the envelope regardless of
//! framing; [`McpClient`] layers bounded exponential-backoff retry and the
//! three remote operations the orchestrator uses on top of it.

mod client;
mod codec;
mod error;
mod retry;

pub use client::{McpClient, McpClientConfig, SESSION_HEADER};
pub use codec::decode_body;
pub use error::RpcError;
pub use retry::retry_delay;

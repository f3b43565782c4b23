use serde_json::Value;
use thiserror::Error;

/// Enumerates failures while talking to the branch-execution service.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("failed to decode response body: {0}")]
    Decode(String),
    #[error("no JSON payload in event stream")]
    NoJsonPayload,
    #[error("remote reported JSON-RPC error: {0}")]
    Protocol(Value),
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

impl RpcError {
    /// A JSON-RPC `error` member is an authoritative answer and is never
    /// retried; every other variant is a failure to obtain any decoded
    /// response and is fair game for another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Protocol(_) | Self::InvalidConfig(_))
    }
}

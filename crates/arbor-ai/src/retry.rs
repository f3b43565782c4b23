//! Retry classification and backoff helpers for the completion endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::AiError;

pub const BASE_BACKOFF_MS: u64 = 200;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn should_retry_status(status: u16) -> bool {
    status == 408 || status == 409 || status == 425 || status == 429 || status >= 500
}

pub fn next_backoff_ms(attempt: usize) -> u64 {
    let shift = attempt.min(6);
    BASE_BACKOFF_MS.saturating_mul(1_u64 << shift)
}

pub fn is_retryable_http_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Whether a failed completion call is worth another attempt. Protocol and
/// serialization problems are deterministic and excluded.
pub fn is_retryable_ai_error(error: &AiError) -> bool {
    match error {
        AiError::Http(http) => http.is_timeout() || http.is_connect(),
        AiError::HttpStatus { status, .. } => should_retry_status(*status),
        AiError::MissingApiKey | AiError::Serde(_) | AiError::InvalidResponse(_) => false,
    }
}

pub fn new_request_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("arbor-{millis}-{count}")
}

//! Adaptive-backoff polling of a single branch until it reaches a terminal
//! state or a wall-clock deadline passes.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use arbor_rpc::McpClient;

use crate::tools::extract_branch_id;
use crate::{LineageTracker, ToolError};

/// Poll tuning. Defaults mirror the `check_status` tool defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub backoff_factor: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1800),
            initial_interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(30),
            backoff_factor: 1.5,
        }
    }
}

impl PollConfig {
    /// Rejects unusable tuning before any network call is made.
    pub fn validate(&self) -> Result<(), ToolError> {
        if self.timeout.is_zero() {
            return Err(ToolError::Invalid(
                "`timeout_seconds` must be a positive number if provided.".to_string(),
            ));
        }
        if self.initial_interval.is_zero() {
            return Err(ToolError::Invalid(
                "`poll_interval_seconds` must be a positive number if provided.".to_string(),
            ));
        }
        if self.max_interval < self.initial_interval {
            return Err(ToolError::Invalid(
                "`max_poll_interval_seconds` must be a number >= poll_interval_seconds."
                    .to_string(),
            ));
        }
        if self.backoff_factor <= 1.0 || !self.backoff_factor.is_finite() {
            return Err(ToolError::Invalid(
                "backoff factor must be a number greater than 1.0.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Only these literals end polling; an unrecognized status keeps the branch
/// counted as still running until the deadline, which fails open instead of
/// terminating early on a new server-introduced state.
pub fn is_terminal_status(status: &str) -> bool {
    matches!(status, "succeed" | "succeeded" | "failed")
}

fn normalized_status(response: &Value) -> String {
    response
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Repeatedly fetches branch status until a terminal state or the deadline.
/// A `failed` branch is a normal terminal outcome returned to the caller for
/// inspection, not a poller error. Every observed identifier is recorded
/// into the lineage tracker.
pub async fn poll_until_terminal(
    client: &McpClient,
    lineage: &mut LineageTracker,
    branch_id: &str,
    config: PollConfig,
) -> Result<Value, ToolError> {
    config.validate()?;

    let deadline = Instant::now() + config.timeout;
    let mut interval = config.initial_interval;
    let mut attempt = 0_usize;

    info!(
        branch_id,
        timeout_secs = config.timeout.as_secs(),
        "polling branch status"
    );

    loop {
        attempt += 1;
        let response = client
            .get_branch(branch_id)
            .await
            .map_err(|error| ToolError::Execution(error.to_string()))?;
        let status = normalized_status(&response);
        debug!(branch_id, attempt, status = %status, "branch status response");

        if is_terminal_status(&status) {
            record_branch(lineage, &response)?;
            return Ok(response);
        }

        if Instant::now() >= deadline {
            return Err(ToolError::PollTimeout {
                branch_id: branch_id.to_string(),
                last_status: if status.is_empty() {
                    "unknown".to_string()
                } else {
                    status
                },
            });
        }

        record_branch(lineage, &response)?;
        let shown = if status.is_empty() { "unknown" } else { status.as_str() };
        info!(
            branch_id,
            status = shown,
            sleep_secs = interval.as_secs_f64(),
            "branch still active"
        );
        sleep(interval).await;
        interval = grow_interval(interval, config.backoff_factor, config.max_interval);
    }
}

fn grow_interval(interval: Duration, factor: f64, max: Duration) -> Duration {
    interval.mul_f64(factor).min(max)
}

fn record_branch(lineage: &mut LineageTracker, response: &Value) -> Result<(), ToolError> {
    let branch_id = extract_branch_id(response).ok_or_else(|| {
        ToolError::Execution("Branch status response missing branch identifier.".to_string())
    })?;
    lineage.record(branch_id);
    Ok(())
}

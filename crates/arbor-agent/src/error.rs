use arbor_ai::AiError;
use thiserror::Error;

/// Failures inside tool execution. Every variant is folded into the uniform
/// `{status: "error", error}` envelope at the dispatcher boundary; none of
/// them escapes to the conversation loop.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Malformed or out-of-range tool arguments. Never retried.
    #[error("{0}")]
    Invalid(String),
    /// A remote call failed or returned an unusable response.
    #[error("{0}")]
    Execution(String),
    /// The poll deadline passed before the branch reached a terminal state.
    #[error("Timed out waiting for branch {branch_id} to finish. Last status={last_status}.")]
    PollTimeout {
        branch_id: String,
        last_status: String,
    },
}

/// Failures that abort the whole orchestration run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("reached maximum iterations ({0}) without a final report")]
    IterationsExhausted(usize),
}

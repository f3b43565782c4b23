//! Validation and dispatch of controller tool calls onto the RPC client and
//! status poller.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use arbor_ai::{ToolCall, ToolDefinition};
use arbor_rpc::McpClient;

use crate::poller::{poll_until_terminal, PollConfig};
use crate::{LineageTracker, ToolError};

pub const TOOL_EXECUTE_AGENT: &str = "execute_agent";
pub const TOOL_CHECK_STATUS: &str = "check_status";
pub const TOOL_READ_ARTIFACT: &str = "read_artifact";

pub const DEFAULT_MAX_BRANCHES: i64 = 4;

const DEFAULT_TIMEOUT_SECONDS: f64 = 1800.0;
const DEFAULT_POLL_INTERVAL_SECONDS: f64 = 3.0;
const DEFAULT_MAX_POLL_INTERVAL_SECONDS: f64 = 30.0;

/// The only shape ever serialized back to the controller as a tool turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ToolResult {
    Success { data: Value },
    Error { error: String },
}

impl ToolResult {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Argument record for `execute_agent`. Fields stay optional here so that
/// missing values surface as per-field precondition errors rather than a
/// single opaque deserialization failure.
#[derive(Debug, Deserialize)]
struct ExecuteAgentArgs {
    agent: Option<String>,
    prompt: Option<String>,
    project_name: Option<String>,
    parent_branch_id: Option<String>,
    num_branches: Option<i64>,
}

struct LaunchSpec {
    agent: String,
    prompt: String,
    project_name: String,
    parent_branch_id: String,
    num_branches: u32,
}

impl ExecuteAgentArgs {
    fn validated(
        self,
        default_project: Option<&str>,
        max_branches: i64,
    ) -> Result<LaunchSpec, ToolError> {
        let agent = require_str(self.agent, "agent")?;
        let prompt = require_str(self.prompt, "prompt")?;
        let parent_branch_id = require_str(self.parent_branch_id, "parent_branch_id")?;
        let project_name = self
            .project_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| default_project.map(str::to_string))
            .ok_or_else(|| {
                ToolError::Invalid(
                    "`project_name` string argument is required or set via config.".to_string(),
                )
            })?;

        let num_branches = self.num_branches.unwrap_or(1);
        if num_branches < 1 || num_branches > max_branches {
            return Err(ToolError::Invalid(format!(
                "`num_branches` must be an integer between 1 and {max_branches}."
            )));
        }

        Ok(LaunchSpec {
            agent,
            prompt,
            project_name,
            parent_branch_id,
            num_branches: num_branches as u32,
        })
    }
}

/// Argument record for `check_status`.
#[derive(Debug, Deserialize)]
struct CheckStatusArgs {
    branch_id: Option<String>,
    timeout_seconds: Option<f64>,
    poll_interval_seconds: Option<f64>,
    max_poll_interval_seconds: Option<f64>,
}

impl CheckStatusArgs {
    fn validated(self) -> Result<(String, PollConfig), ToolError> {
        let branch_id = require_str(self.branch_id, "branch_id")?;

        let timeout = self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(ToolError::Invalid(
                "`timeout_seconds` must be a positive number if provided.".to_string(),
            ));
        }
        let interval = self
            .poll_interval_seconds
            .unwrap_or(DEFAULT_POLL_INTERVAL_SECONDS);
        if !interval.is_finite() || interval <= 0.0 {
            return Err(ToolError::Invalid(
                "`poll_interval_seconds` must be a positive number if provided.".to_string(),
            ));
        }
        let max_interval = self
            .max_poll_interval_seconds
            .unwrap_or(DEFAULT_MAX_POLL_INTERVAL_SECONDS);
        if !max_interval.is_finite() || max_interval < interval {
            return Err(ToolError::Invalid(
                "`max_poll_interval_seconds` must be a number >= poll_interval_seconds."
                    .to_string(),
            ));
        }

        let config = PollConfig {
            timeout: secs_duration(timeout, "timeout_seconds")?,
            initial_interval: secs_duration(interval, "poll_interval_seconds")?,
            max_interval: secs_duration(max_interval, "max_poll_interval_seconds")?,
            ..PollConfig::default()
        };
        Ok((branch_id, config))
    }
}

/// Finite and positive is not enough for a `Duration`: values past the
/// representable range must fail as argument errors, never panic.
fn secs_duration(seconds: f64, field: &str) -> Result<std::time::Duration, ToolError> {
    std::time::Duration::try_from_secs_f64(seconds)
        .map_err(|_| ToolError::Invalid(format!("`{field}` is out of range.")))
}

/// Argument record for `read_artifact`.
#[derive(Debug, Deserialize)]
struct ReadArtifactArgs {
    branch_id: Option<String>,
    path: Option<String>,
}

fn require_str(value: Option<String>, field: &str) -> Result<String, ToolError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ToolError::Invalid(format!(
            "`{field}` string argument is required."
        ))),
    }
}

/// Routes controller tool calls to the three remote operations and folds
/// every failure into the uniform [`ToolResult`] envelope.
pub struct ToolHandler {
    client: Arc<McpClient>,
    default_project: Option<String>,
    max_branches: i64,
    lineage: LineageTracker,
}

impl ToolHandler {
    pub fn new(
        client: Arc<McpClient>,
        default_project: Option<String>,
        start_branch_id: Option<String>,
    ) -> Self {
        Self {
            client,
            default_project,
            max_branches: DEFAULT_MAX_BRANCHES,
            lineage: LineageTracker::new(start_branch_id),
        }
    }

    pub fn lineage(&self) -> &LineageTracker {
        &self.lineage
    }

    /// Executes one tool call. Never returns an error: all failure paths
    /// become the `{status: "error", error}` envelope.
    pub async fn handle(&mut self, call: &ToolCall) -> ToolResult {
        if call.name.is_empty() {
            return ToolResult::Error {
                error: "Missing tool name in call.".to_string(),
            };
        }

        let arguments = match parse_arguments(&call.arguments) {
            Ok(arguments) => arguments,
            Err(err) => {
                error!(tool = %call.name, %err, "invalid tool arguments");
                return ToolResult::Error {
                    error: err.to_string(),
                };
            }
        };

        let outcome = match call.name.as_str() {
            TOOL_EXECUTE_AGENT => self.execute_agent(arguments).await,
            TOOL_CHECK_STATUS => self.check_status(arguments).await,
            TOOL_READ_ARTIFACT => self.read_artifact(arguments).await,
            other => Err(ToolError::Invalid(format!("Unsupported tool: {other}"))),
        };

        match outcome {
            Ok(data) => ToolResult::Success { data },
            Err(err) => {
                warn!(tool = %call.name, %err, "tool call failed");
                ToolResult::Error {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn execute_agent(&mut self, arguments: Value) -> Result<Value, ToolError> {
        let args: ExecuteAgentArgs = deserialize_args(arguments)?;
        let launch = args.validated(self.default_project.as_deref(), self.max_branches)?;

        info!(
            agent = %launch.agent,
            project = %launch.project_name,
            parent = %launch.parent_branch_id,
            branches = launch.num_branches,
            "launching agent run"
        );
        let response = self
            .client
            .parallel_explore(
                &launch.project_name,
                &launch.parent_branch_id,
                &[launch.prompt],
                &launch.agent,
                launch.num_branches,
            )
            .await
            .map_err(|error| ToolError::Execution(error.to_string()))?;

        if remote_signalled_error(&response) {
            return Err(ToolError::Execution(describe_remote_error(&response)));
        }

        let branch_id = response
            .get("branches")
            .and_then(Value::as_array)
            .and_then(|branches| branches.first())
            .and_then(extract_branch_id)
            .map(str::to_string)
            .ok_or_else(|| {
                ToolError::Execution("Missing branch id in parallel_explore response.".to_string())
            })?;

        self.lineage.record(&branch_id);
        Ok(json!({
            "parallel_explore": response,
            "branch_id": branch_id,
        }))
    }

    async fn check_status(&mut self, arguments: Value) -> Result<Value, ToolError> {
        let args: CheckStatusArgs = deserialize_args(arguments)?;
        let (branch_id, config) = args.validated()?;
        poll_until_terminal(self.client.as_ref(), &mut self.lineage, &branch_id, config).await
    }

    async fn read_artifact(&mut self, arguments: Value) -> Result<Value, ToolError> {
        let args: ReadArtifactArgs = deserialize_args(arguments)?;
        let branch_id = require_str(args.branch_id, "branch_id")?;
        let path = require_str(args.path, "path")?;

        info!(branch = %branch_id, path = %path, "reading artifact");
        self.client
            .branch_read_file(&branch_id, &path)
            .await
            .map_err(|error| ToolError::Execution(error.to_string()))
    }
}

/// Normalizes the argument payload into a JSON object. Assistant-produced
/// argument text arrives either as a raw string (preserved verbatim by the
/// completion layer) or already parsed into a JSON value.
fn parse_arguments(arguments: &Value) -> Result<Value, ToolError> {
    match arguments {
        Value::Null => Ok(json!({})),
        Value::Object(_) => Ok(arguments.clone()),
        Value::String(text) => {
            if text.trim().is_empty() {
                return Ok(json!({}));
            }
            let parsed: Value = serde_json::from_str(text)
                .map_err(|error| ToolError::Invalid(format!("Invalid JSON arguments: {error}")))?;
            if !parsed.is_object() {
                return Err(ToolError::Invalid(
                    "Invalid JSON arguments: expected a JSON object.".to_string(),
                ));
            }
            Ok(parsed)
        }
        _ => Err(ToolError::Invalid(
            "Invalid JSON arguments: expected a JSON object.".to_string(),
        )),
    }
}

fn deserialize_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|error| ToolError::Invalid(format!("Invalid arguments: {error}")))
}

fn remote_signalled_error(response: &Value) -> bool {
    response.get("error").is_some()
        || response.get("isError").map(is_truthy).unwrap_or(false)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn describe_remote_error(response: &Value) -> String {
    match response.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(other) => other.to_string(),
        None => response.to_string(),
    }
}

/// Extracts a branch identifier from a remote payload: `branch_id` then
/// `id`, including one level of nesting under a `branch` sub-object.
pub(crate) fn extract_branch_id(response: &Value) -> Option<&str> {
    fn from_object(value: &Value) -> Option<&str> {
        ["branch_id", "id"].into_iter().find_map(|key| {
            value
                .get(key)
                .and_then(Value::as_str)
                .filter(|id| !id.is_empty())
        })
    }

    from_object(response).or_else(|| response.get("branch").and_then(from_object))
}

/// The three function schemas exposed to the completion endpoint.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: TOOL_EXECUTE_AGENT.to_string(),
            description: "Launch a parallel_explore run for a specialist agent. Provide the \
                          target agent (claude_code or codex), prompt, parent branch id, and \
                          project name. Optionally control the number of branches to spawn."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "agent": {
                        "type": "string",
                        "description": "Target specialist agent name, e.g. claude_code or codex.",
                    },
                    "prompt": {
                        "type": "string",
                        "description": "Prompt that describes the task for the agent.",
                    },
                    "project_name": {
                        "type": "string",
                        "description": "Project name on the branch-execution service.",
                    },
                    "parent_branch_id": {
                        "type": "string",
                        "description": "Branch UUID to branch from for this run.",
                    },
                    "num_branches": {
                        "type": "integer",
                        "description": "Optional number of sibling branches to create.",
                        "default": 1,
                        "minimum": 1,
                        "maximum": DEFAULT_MAX_BRANCHES,
                    },
                },
                "required": ["agent", "prompt", "project_name", "parent_branch_id"],
            }),
        },
        ToolDefinition {
            name: TOOL_CHECK_STATUS.to_string(),
            description: "Fetch status information for a branch id. Useful for polling until a \
                          branch run finishes."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "branch_id": {
                        "type": "string",
                        "description": "Branch UUID returned from execute_agent.",
                    },
                    "timeout_seconds": {
                        "type": "number",
                        "description": "Optional upper bound on how long to poll before failing.",
                        "default": 1800,
                    },
                    "poll_interval_seconds": {
                        "type": "number",
                        "description": "Initial delay between polls.",
                        "default": 3,
                    },
                    "max_poll_interval_seconds": {
                        "type": "number",
                        "description": "Upper bound for the exponential backoff poll interval.",
                        "default": 30,
                    },
                },
                "required": ["branch_id"],
            }),
        },
        ToolDefinition {
            name: TOOL_READ_ARTIFACT.to_string(),
            description: "Read a text artifact produced by a branch. Pass a branch id and the \
                          artifact path or filename."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "branch_id": {
                        "type": "string",
                        "description": "Branch that produced the artifact.",
                    },
                    "path": {
                        "type": "string",
                        "description": "Artifact path or filename, e.g. worklog.md or artifacts/worklog.md.",
                    },
                },
                "required": ["branch_id", "path"],
            }),
        },
    ]
}

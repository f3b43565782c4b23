use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::codec::decode_body;
use crate::retry::retry_delay;
use crate::RpcError;

/// Header carrying the per-client opaque session token. The server is free
/// to ignore it.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

const METHOD_TOOLS_CALL: &str = "tools/call";

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Connection settings for [`McpClient`].
#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Streamable HTTP JSON-RPC endpoint, e.g. `http://localhost:8000/mcp/sse`.
    pub base_url: String,
    pub request_timeout: Duration,
    /// Status reads may block server-side, so `get_branch` never uses a
    /// timeout below this floor.
    pub status_timeout_floor: Duration,
    /// Total attempts per call, including the first.
    pub max_retries: usize,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/mcp/sse".to_string(),
            request_timeout: Duration::from_secs(30),
            status_timeout_floor: Duration::from_secs(300),
            max_retries: 3,
        }
    }
}

/// JSON-RPC client for the branch-execution service with bounded
/// exponential-backoff retry.
#[derive(Debug)]
pub struct McpClient {
    client: reqwest::Client,
    config: McpClientConfig,
    session_id: String,
    request_id: AtomicU64,
}

impl McpClient {
    pub fn new(config: McpClientConfig) -> Result<Self, RpcError> {
        let session_id = new_session_id();

        let mut headers = HeaderMap::new();
        // Streamable HTTP requires accepting both JSON responses and SSE.
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/event-stream"),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            SESSION_HEADER,
            HeaderValue::from_str(&session_id).map_err(|error| {
                RpcError::InvalidConfig(format!("invalid session header: {error}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            config,
            session_id,
            request_id: AtomicU64::new(1),
        })
    }

    /// The opaque session token sent with every request, stable for the
    /// lifetime of this client.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Issues one JSON-RPC call, retrying transport-level failures with a
    /// `2^attempt`-second delay until the attempt cap is reached. A JSON-RPC
    /// `error` member returned by the server is final and surfaces
    /// immediately as [`RpcError::Protocol`].
    pub async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let request_id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
        });
        let timeout = timeout.unwrap_or(self.config.request_timeout);
        let max_retries = self.config.max_retries.max(1);

        for attempt in 0..max_retries {
            debug!(method, attempt = attempt + 1, total = max_retries, "posting JSON-RPC request");
            match self.attempt(&payload, timeout).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt + 1 == max_retries {
                        error!(method, %err, "remote call failed after retries");
                        return Err(err);
                    }
                    let delay = retry_delay(attempt);
                    warn!(
                        method,
                        attempt = attempt + 1,
                        total = max_retries,
                        delay_secs = delay.as_secs(),
                        %err,
                        "remote call failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }

        Err(RpcError::Decode(
            "request retry loop terminated unexpectedly".to_string(),
        ))
    }

    async fn attempt(&self, payload: &Value, timeout: Duration) -> Result<Value, RpcError> {
        let response = self
            .client
            .post(&self.config.base_url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RpcError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!(status = status.as_u16(), content_type, "decoded JSON-RPC response");
        let decoded = decode_body(&content_type, &body)?;
        unwrap_rpc_body(decoded)
    }

    /// Invokes a named remote tool via `tools/call`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        self.call(
            METHOD_TOOLS_CALL,
            json!({ "name": name, "arguments": arguments }),
            timeout,
        )
        .await
    }

    /// Spawns one or more sibling branch runs for a specialist agent.
    pub async fn parallel_explore(
        &self,
        project_name: &str,
        parent_branch_id: &str,
        prompts: &[String],
        agent: &str,
        num_branches: u32,
    ) -> Result<Value, RpcError> {
        self.call_tool(
            "parallel_explore",
            json!({
                "project_name": project_name,
                "parent_branch_id": parent_branch_id,
                "shared_prompt_sequence": prompts,
                "num_branches": num_branches,
                "agent": agent,
            }),
            None,
        )
        .await
    }

    /// Fetches the current status snapshot of a branch. Allowed a longer
    /// timeout than other calls since the endpoint may block server-side.
    pub async fn get_branch(&self, branch_id: &str) -> Result<Value, RpcError> {
        let timeout = self
            .config
            .request_timeout
            .max(self.config.status_timeout_floor);
        self.call_tool("get_branch", json!({ "branch_id": branch_id }), Some(timeout))
            .await
    }

    /// Reads a text artifact produced by a branch.
    pub async fn branch_read_file(
        &self,
        branch_id: &str,
        file_path: &str,
    ) -> Result<Value, RpcError> {
        self.call_tool(
            "branch_read_file",
            json!({ "branch_id": branch_id, "file_path": file_path }),
            None,
        )
        .await
    }
}

/// Unwraps a decoded JSON-RPC body: an `error` member is authoritative even
/// when a `result` is also present; a `result` is unwrapped one further
/// level when the server nests tool output under `structuredContent`; a
/// body without either envelope member is returned unmodified.
fn unwrap_rpc_body(decoded: Value) -> Result<Value, RpcError> {
    if let Some(err) = decoded.get("error") {
        return Err(RpcError::Protocol(err.clone()));
    }
    if let Some(result) = decoded.get("result") {
        if let Some(structured) = result.get("structuredContent") {
            return Ok(structured.clone());
        }
        return Ok(result.clone());
    }
    Ok(decoded)
}

fn new_session_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let count = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("arbor-{millis}-{count}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{new_session_id, unwrap_rpc_body, McpClient, McpClientConfig};
    use crate::RpcError;

    #[test]
    fn session_ids_are_unique_per_client() {
        let a = McpClient::new(McpClientConfig::default()).expect("client");
        let b = McpClient::new(McpClientConfig::default()).expect("client");
        assert_ne!(a.session_id(), b.session_id());
        assert!(a.session_id().starts_with("arbor-"));
    }

    #[test]
    fn session_id_format_is_header_safe() {
        let id = new_session_id();
        assert!(id.chars().all(|ch| ch.is_ascii_graphic()));
    }

    #[test]
    fn error_member_wins_over_result() {
        let err = unwrap_rpc_body(json!({
            "error": {"code": -32000, "message": "boom"},
            "result": {"ignored": true},
        }))
        .expect_err("error member should be authoritative");
        match err {
            RpcError::Protocol(value) => assert_eq!(value["message"], "boom"),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn unwraps_structured_content_one_level() {
        let value = unwrap_rpc_body(json!({
            "result": {"structuredContent": {"branches": []}}
        }))
        .expect("result should unwrap");
        assert_eq!(value, json!({"branches": []}));
    }

    #[test]
    fn unwraps_plain_result() {
        let value = unwrap_rpc_body(json!({"result": {"status": "running"}}))
            .expect("result should unwrap");
        assert_eq!(value, json!({"status": "running"}));
    }

    #[test]
    fn passes_through_unenveloped_bodies() {
        let value = unwrap_rpc_body(json!({"status": "running"})).expect("body should pass");
        assert_eq!(value, json!({"status": "running"}));
    }
}

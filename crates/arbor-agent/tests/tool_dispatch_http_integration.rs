//! Dispatcher behavior against a mock branch-execution endpoint.

use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use serde_json::{json, Value};

use arbor_agent::{ToolHandler, ToolResult};
use arbor_ai::ToolCall;
use arbor_rpc::{McpClient, McpClientConfig};

fn handler_for(server: &MockServer) -> ToolHandler {
    let client = McpClient::new(McpClientConfig {
        base_url: server.url("/mcp"),
        request_timeout: Duration::from_secs(5),
        status_timeout_floor: Duration::from_secs(5),
        max_retries: 1,
    })
    .expect("build client");
    ToolHandler::new(Arc::new(client), Some("demo".to_string()), None)
}

fn call(name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: "call-1".to_string(),
        name: name.to_string(),
        arguments,
    }
}

fn expect_success(result: ToolResult) -> Value {
    match result {
        ToolResult::Success { data } => data,
        ToolResult::Error { error } => panic!("expected success, got error: {error}"),
    }
}

fn expect_error(result: ToolResult) -> String {
    match result {
        ToolResult::Error { error } => error,
        ToolResult::Success { data } => panic!("expected error, got success: {data}"),
    }
}

#[tokio::test]
async fn launch_success_extracts_and_records_the_branch_id() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/mcp")
                .json_body_includes(r#"{"method": "tools/call", "params": {"name": "parallel_explore"}}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "structuredContent": {
                            "branches": [{"branch_id": "B1"}, {"branch_id": "B2"}]
                        }
                    }
                }));
        })
        .await;

    let mut handler = handler_for(&server);
    let result = handler
        .handle(&call(
            "execute_agent",
            json!({
                "agent": "claude_code",
                "prompt": "implement the task",
                "parent_branch_id": "B0",
            }),
        ))
        .await;

    mock.assert_async().await;
    let data = expect_success(result);
    assert_eq!(data["branch_id"], "B1");
    assert_eq!(
        data["parallel_explore"]["branches"][0]["branch_id"],
        "B1"
    );
    assert_eq!(handler.lineage().start_branch_id(), Some("B1"));
    assert_eq!(handler.lineage().latest_branch_id(), Some("B1"));
}

#[tokio::test]
async fn remote_error_payload_becomes_a_tool_error_and_records_nothing() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/mcp");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "structuredContent": {"error": "project not found", "isError": true}
                    }
                }));
        })
        .await;

    let mut handler = handler_for(&server);
    let result = handler
        .handle(&call(
            "execute_agent",
            json!({
                "agent": "claude_code",
                "prompt": "implement",
                "parent_branch_id": "B0",
            }),
        ))
        .await;

    let error = expect_error(result);
    assert!(error.contains("project not found"));
    assert_eq!(handler.lineage().start_branch_id(), None);
    assert_eq!(handler.lineage().latest_branch_id(), None);
}

#[tokio::test]
async fn status_poll_returns_the_terminal_snapshot() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/mcp")
                .json_body_includes(r#"{"params": {"name": "get_branch"}}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "structuredContent": {"branch_id": "B1", "status": "Succeeded"}
                    }
                }));
        })
        .await;

    let mut handler = handler_for(&server);
    let result = handler
        .handle(&call("check_status", json!({"branch_id": "B1"})))
        .await;

    let data = expect_success(result);
    assert_eq!(data["status"], "Succeeded");
    assert_eq!(handler.lineage().latest_branch_id(), Some("B1"));
}

#[tokio::test]
async fn never_terminal_status_times_out_with_the_last_status_named() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/mcp")
                .json_body_includes(r#"{"params": {"name": "get_branch"}}"#);
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "structuredContent": {"branch_id": "B1", "status": "running"}
                    }
                }));
        })
        .await;

    let mut handler = handler_for(&server);
    let result = handler
        .handle(&call(
            "check_status",
            json!({
                "branch_id": "B1",
                "timeout_seconds": 1,
                "poll_interval_seconds": 0.2,
                "max_poll_interval_seconds": 0.4,
            }),
        ))
        .await;

    let error = expect_error(result);
    assert!(error.contains("Timed out waiting for branch B1"));
    assert!(error.contains("Last status=running"));

    // Polling stopped at the deadline instead of hammering the endpoint.
    let hits = mock.hits_async().await;
    assert!(hits >= 2, "expected at least two polls, got {hits}");
    assert!(hits <= 10, "expected polling to stop, got {hits} polls");
    assert_eq!(handler.lineage().latest_branch_id(), Some("B1"));
}

#[tokio::test]
async fn interval_bounds_are_rejected_before_any_network_call() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/mcp");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        })
        .await;

    let mut handler = handler_for(&server);
    let result = handler
        .handle(&call(
            "check_status",
            json!({
                "branch_id": "B1",
                "poll_interval_seconds": 10,
                "max_poll_interval_seconds": 5,
            }),
        ))
        .await;

    let error = expect_error(result);
    assert!(error.contains("`max_poll_interval_seconds` must be a number >= poll_interval_seconds"));
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn launch_bounds_are_rejected_before_any_network_call() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/mcp");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        })
        .await;

    let mut handler = handler_for(&server);
    let result = handler
        .handle(&call(
            "execute_agent",
            json!({
                "agent": "claude_code",
                "prompt": "implement",
                "parent_branch_id": "B0",
                "num_branches": 9,
            }),
        ))
        .await;

    let error = expect_error(result);
    assert!(error.contains("`num_branches` must be an integer between 1 and 4"));
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn unknown_tools_and_malformed_arguments_never_reach_the_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/mcp");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        })
        .await;

    let mut handler = handler_for(&server);

    let unknown = expect_error(handler.handle(&call("delete_branch", json!({}))).await);
    assert!(unknown.contains("Unsupported tool: delete_branch"));

    let malformed = expect_error(
        handler
            .handle(&call("read_artifact", json!("{not json")))
            .await,
    );
    assert!(malformed.contains("Invalid JSON arguments"));

    let missing = expect_error(
        handler
            .handle(&call("read_artifact", json!({"branch_id": "B1"})))
            .await,
    );
    assert!(missing.contains("`path` string argument is required"));

    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn artifact_reads_pass_branch_and_path_through() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/mcp").json_body_includes(
                r#"{"params": {"name": "branch_read_file", "arguments": {"branch_id": "B1", "file_path": "worklog.md"}}}"#,
            );
            then.status(200)
                .header("content-type", "application/json")
                .json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": {
                        "structuredContent": {"content": "No P0/P1 issues found."}
                    }
                }));
        })
        .await;

    let mut handler = handler_for(&server);
    let result = handler
        .handle(&call(
            "read_artifact",
            json!({"branch_id": "B1", "path": "worklog.md"}),
        ))
        .await;

    mock.assert_async().await;
    let data = expect_success(result);
    assert_eq!(data["content"], "No P0/P1 issues found.");
}

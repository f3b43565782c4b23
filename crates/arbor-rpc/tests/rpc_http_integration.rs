use httpmock::prelude::*;
use serde_json::json;

use arbor_rpc::{McpClient, McpClientConfig, RpcError};

fn client_for(server: &MockServer, max_retries: usize) -> McpClient {
    McpClient::new(McpClientConfig {
        base_url: format!("{}/mcp/sse", server.base_url()),
        max_retries,
        ..McpClientConfig::default()
    })
    .expect("client should build")
}

#[tokio::test]
async fn call_sends_jsonrpc_envelope_with_session_header() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/mcp/sse")
            .header("accept", "application/json, text/event-stream")
            .header("content-type", "application/json")
            .header_exists("Mcp-Session-Id")
            .json_body_includes(
                json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "method": "tools/call",
                    "params": {"name": "get_branch", "arguments": {"branch_id": "B1"}}
                })
                .to_string(),
            );
        then.status(200).json_body(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {"structuredContent": {"branch_id": "B1", "status": "running"}}
        }));
    });

    let client = client_for(&server, 3);
    let value = client.get_branch("B1").await.expect("call should succeed");

    mock.assert();
    assert_eq!(value, json!({"branch_id": "B1", "status": "running"}));
}

#[tokio::test]
async fn request_ids_increase_by_one_per_call() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(POST)
            .path("/mcp/sse")
            .json_body_includes(json!({"id": 1}).to_string());
        then.status(200)
            .json_body(json!({"result": {"status": "running", "branch_id": "B1"}}));
    });
    let second = server.mock(|when, then| {
        when.method(POST)
            .path("/mcp/sse")
            .json_body_includes(json!({"id": 2}).to_string());
        then.status(200)
            .json_body(json!({"result": {"status": "running", "branch_id": "B1"}}));
    });

    let client = client_for(&server, 1);
    client.get_branch("B1").await.expect("first call");
    client.get_branch("B1").await.expect("second call");

    first.assert();
    second.assert();
}

#[tokio::test]
async fn decodes_sse_framed_responses() {
    let server = MockServer::start();
    let body = concat!(
        ": stream open\n",
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"content\":[],",
        "\"structuredContent\":{\"status\":\"succeed\",\"branch_id\":\"B2\"}}}\n",
        "\n",
    );
    server.mock(|when, then| {
        when.method(POST).path("/mcp/sse");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    });

    let client = client_for(&server, 1);
    let value = client.get_branch("B2").await.expect("SSE call should succeed");
    assert_eq!(value, json!({"status": "succeed", "branch_id": "B2"}));
}

#[tokio::test]
async fn transport_failures_use_all_attempts_then_surface_last_error() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/mcp/sse");
        then.status(503).body("overloaded");
    });

    let client = client_for(&server, 2);
    let err = client
        .call("tools/call", json!({"name": "get_branch"}), None)
        .await
        .expect_err("call should fail after retries");

    mock.assert_hits(2);
    match err {
        RpcError::HttpStatus { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "overloaded");
        }
        other => panic!("expected http status error, got {other:?}"),
    }
}

#[tokio::test]
async fn jsonrpc_error_member_is_final_and_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/mcp/sse");
        then.status(200)
            .json_body(json!({"jsonrpc": "2.0", "id": 1, "error": "quota exceeded"}));
    });

    let client = client_for(&server, 3);
    let err = client
        .parallel_explore("proj", "B1", &["do it".to_string()], "claude_code", 1)
        .await
        .expect_err("protocol error should surface");

    mock.assert_hits(1);
    match err {
        RpcError::Protocol(value) => assert_eq!(value, json!("quota exceeded")),
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn undecodable_bodies_are_retried_as_transport_failures() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/mcp/sse");
        then.status(200)
            .header("content-type", "text/event-stream")
            .body("data: not json at all\n\n");
    });

    let client = client_for(&server, 2);
    let err = client
        .call_tool("get_branch", json!({"branch_id": "B1"}), None)
        .await
        .expect_err("missing payload should fail");

    mock.assert_hits(2);
    assert!(matches!(err, RpcError::NoJsonPayload));
}

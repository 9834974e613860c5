//! Integration tests for MCP protocol handling.
//!
//! These tests verify message parsing and the dispatcher as wired by
//! [`McpServer`], including the screenshot capabilities backed by fakes.

mod common;

use mcp_screenshot_server::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcRequest, RequestId,
};
use mcp_screenshot_server::mcp::{JsonRpcReply, McpServer, RequestContext};
use mcp_screenshot_server::state::TaskStatus;
use serde_json::{json, Value};

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2025-11-25",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_string_id_request() {
    let json = r#"{"jsonrpc": "2.0", "id": "abc", "method": "tools/list"}"#;

    if let IncomingMessage::Request(req) = parse_message(json).unwrap() {
        assert_eq!(req.id, RequestId::String("abc".to_string()));
        assert!(req.params.is_none());
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_parse_rejects_non_requests() {
    for json in [
        "not valid json",
        r#"{"id": 1, "method": "test"}"#,
        r#"{"jsonrpc": "1.0", "id": 1, "method": "test"}"#,
        r#"{"jsonrpc": "2.0", "id": 1, "result": {}}"#,
        r#"[{"jsonrpc": "2.0", "id": 1, "method": "ping"}]"#,
        r#"{"jsonrpc": "2.0", "id": 1}"#,
    ] {
        assert!(parse_message(json).is_err(), "accepted {json}");
    }
}

// =============================================================================
// Dispatch Tests
// =============================================================================

async fn call(server: &McpServer, method: &str, params: Value) -> JsonRpcReply {
    server
        .dispatcher()
        .dispatch(
            JsonRpcRequest::new(RequestId::Number(1), method, Some(params)),
            &RequestContext::default(),
        )
        .await
}

#[tokio::test]
async fn test_registered_capabilities() {
    let server = common::test_server();

    let tools = call(&server, "tools/list", json!({})).await;
    let tools = tools.result().unwrap()["tools"].as_array().unwrap().clone();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "take_screenshot");
    assert_eq!(tools[0]["inputSchema"]["type"], "object");

    let resources = call(&server, "resources/list", json!({})).await;
    assert_eq!(
        resources.result().unwrap()["resources"][0]["uri"],
        "screenshot://latest"
    );

    let prompts = call(&server, "prompts/list", json!({})).await;
    let names: Vec<_> = prompts.result().unwrap()["prompts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["screenshot_analysis", "code_review_screenshot"]);
}

#[tokio::test]
async fn test_take_screenshot_end_to_end() {
    let server = common::test_server();

    let before = call(&server, "resources/read", json!({"uri": "screenshot://latest"})).await;
    assert_eq!(
        before.result().unwrap()["contents"][0]["text"],
        "No screenshot has been captured yet."
    );

    let reply = call(
        &server,
        "tools/call",
        json!({
            "name": "take_screenshot",
            "arguments": {"mode": "both", "question": "What is open?"}
        }),
    )
    .await;
    let result = reply.result().unwrap();
    assert_ne!(result["isError"], true);
    let texts: Vec<_> = result["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        texts,
        [
            "Description: A terminal window",
            "Answer: You asked: What is open?",
            "Extracted text:\nHello, world",
        ]
    );

    let after = call(&server, "resources/read", json!({"uri": "screenshot://latest"})).await;
    let image = &after.result().unwrap()["contents"][0];
    assert_eq!(image["type"], "image");
    assert_eq!(image["mimeType"], "image/png");

    let tasks = server.state().list_tasks().await;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert_eq!(tasks[0].name, "take_screenshot");
}

#[tokio::test]
async fn test_take_screenshot_argument_errors_are_in_band() {
    let server = common::test_server();

    let reply = call(
        &server,
        "tools/call",
        json!({"name": "take_screenshot", "arguments": {"mode": "question"}}),
    )
    .await;
    let result = reply.result().unwrap();
    assert_eq!(result["isError"], true);
    assert_eq!(
        result["content"][0]["text"],
        "Question required for 'question' or 'both' mode."
    );
    assert!(server.state().list_tasks().await.is_empty());
}

#[tokio::test]
async fn test_prompt_get() {
    let server = common::test_server();

    let reply = call(&server, "prompts/get", json!({"name": "code_review_screenshot"})).await;
    let result = reply.result().unwrap();
    assert_eq!(result["name"], "code_review_screenshot");
    assert!(!result["messages"].as_array().unwrap().is_empty());

    let reply = call(&server, "prompts/get", json!({"name": "nope"})).await;
    assert!(reply.error().is_none());
}

#[tokio::test]
async fn test_sampling_uses_analyzer() {
    let server = common::test_server();

    let reply = call(
        &server,
        "sampling/createMessage",
        json!({
            "messages": [{"role": "user", "content": {"type": "text", "text": "hi"}}],
            "systemPrompt": "be brief",
            "maxTokens": 50
        }),
    )
    .await;
    let result = reply.result().unwrap();
    assert_eq!(result["content"]["text"], "Reply to: hi");
    assert_eq!(result["model"], "fake-vision");
    assert_eq!(result["role"], "assistant");
}

#[tokio::test]
async fn test_unknown_tool_is_not_a_protocol_error() {
    let server = common::test_server();
    let reply = call(&server, "tools/call", json!({"name": "rm_rf", "arguments": {}})).await;
    let result = reply.result().expect("in-band result");
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"].as_str().unwrap().contains("rm_rf"));
}

//! Integration tests for the HTTP transport.
//!
//! Requests are driven through the axum router with `tower::ServiceExt`;
//! SSE streams are read chunk by chunk from the response body.

mod common;

use std::time::Duration;

use axum::body::{to_bytes, Body, BodyDataStream};
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use mcp_screenshot_server::state::{TaskStatus, TaskUpdate};

const FRAME_WAIT: Duration = Duration::from_secs(5);

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn post_json(router: &Router, uri: &str, body: Value) -> Value {
    let response = router
        .clone()
        .oneshot(post(uri, &body.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn open_stream(router: &Router, session: &str) -> BodyDataStream {
    let request = Request::builder()
        .method("GET")
        .uri(format!("/mcp?session_id={session}"))
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    response.into_body().into_data_stream()
}

/// Reads the next SSE frame as `(event, data)`.
async fn next_frame(stream: &mut BodyDataStream) -> (String, String) {
    let chunk = tokio::time::timeout(FRAME_WAIT, stream.next())
        .await
        .expect("frame within timeout")
        .expect("stream still open")
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();

    let mut event = String::new();
    let mut data = String::new();
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            event = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push_str(value.trim_start());
        }
    }
    (event, data)
}

#[tokio::test]
async fn ping_round_trip_is_exact() {
    let server = common::test_server();
    let router = server.router();

    let reply = post_json(
        &router,
        "/mcp",
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
    )
    .await;
    assert_eq!(reply, json!({"jsonrpc": "2.0", "id": 1, "result": {"pong": true}}));
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let server = common::test_server();
    let router = server.router();

    for body in [
        "{ not json",
        r#"{"id": 1, "method": "ping"}"#,
        r#"{"jsonrpc": "2.0", "id": 1, "error": {"code": 1, "message": "x"}}"#,
        "[]",
    ] {
        let response = router.clone().oneshot(post("/mcp", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }
}

#[tokio::test]
async fn notifications_get_empty_ok() {
    let server = common::test_server();
    let router = server.router();

    let response = router
        .clone()
        .oneshot(post(
            "/mcp",
            r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn unknown_method_is_a_json_rpc_error() {
    let server = common::test_server();
    let router = server.router();

    let reply = post_json(
        &router,
        "/mcp",
        json!({"jsonrpc": "2.0", "id": "x", "method": "resources/templates/list"}),
    )
    .await;
    assert_eq!(reply["id"], "x");
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["data"]["method"], "resources/templates/list");
    assert!(reply.get("result").is_none());
}

#[tokio::test]
async fn task_not_found_over_http() {
    let server = common::test_server();
    let router = server.router();

    let reply = post_json(
        &router,
        "/mcp",
        json!({"jsonrpc": "2.0", "id": 3, "method": "tasks/get", "params": {"taskId": "nope"}}),
    )
    .await;
    assert_eq!(reply["error"]["code"], -32000);
    assert_eq!(reply["error"]["data"]["taskId"], "nope");
}

#[tokio::test]
async fn task_updates_reach_every_session() {
    let server = common::test_server();
    let router = server.router();

    let mut a = open_stream(&router, "a").await;
    let mut b = open_stream(&router, "b").await;

    let state = server.state();
    state.create_task("t1", "job", None, None).await;
    state
        .update_task("t1", TaskUpdate::status(TaskStatus::Running))
        .await
        .unwrap();

    for stream in [&mut a, &mut b] {
        let (event, data) = next_frame(stream).await;
        assert_eq!(event, "notification");
        let notification: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(notification["method"], "notifications/tasks/update");
        assert_eq!(notification["params"]["task"]["id"], "t1");
        assert_eq!(notification["params"]["task"]["status"], "running");

        // Exactly one notification per update; the next frame is the idle ping.
        let (event, data) = next_frame(stream).await;
        assert_eq!(event, "ping");
        assert!(data.is_empty());
    }
}

#[tokio::test]
async fn subscribers_hear_about_new_screenshots() {
    let server = common::test_server();
    let router = server.router();

    let mut watcher = open_stream(&router, "watcher").await;
    let reply = post_json(
        &router,
        "/mcp?session_id=watcher",
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "resources/subscribe",
            "params": {"uri": "screenshot://latest"}
        }),
    )
    .await;
    assert_eq!(reply["result"], json!({}));

    let reply = post_json(
        &router,
        "/mcp",
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "tools/call",
            "params": {"name": "take_screenshot", "arguments": {}}
        }),
    )
    .await;
    assert_ne!(reply["result"]["isError"], true);

    let mut methods = Vec::new();
    loop {
        let (event, data) = next_frame(&mut watcher).await;
        if event == "ping" {
            break;
        }
        let notification: Value = serde_json::from_str(&data).unwrap();
        methods.push(notification["method"].as_str().unwrap().to_string());
    }
    assert!(methods.contains(&"notifications/resources/updated".to_string()));
    assert_eq!(
        methods
            .iter()
            .filter(|m| *m == "notifications/tasks/update")
            .count(),
        2
    );
}

#[tokio::test]
async fn disconnect_keeps_session() {
    let server = common::test_server();
    let router = server.router();

    let stream = open_stream(&router, "gone").await;
    drop(stream);

    assert!(server.state().get_session("gone").await.is_some());
    assert!(server.state().get_event_queue("gone").await.is_some());
}

#[tokio::test]
async fn reconnect_does_not_replay_missed_updates() {
    let server = common::test_server();
    let router = server.router();

    drop(open_stream(&router, "flaky").await);

    let state = server.state();
    state.create_task("t1", "job", None, None).await;
    state
        .update_task("t1", TaskUpdate::status(TaskStatus::Running))
        .await
        .unwrap();

    let mut stream = open_stream(&router, "flaky").await;
    let (event, _) = next_frame(&mut stream).await;
    assert_eq!(event, "ping");

    state
        .update_task("t1", TaskUpdate::status(TaskStatus::Completed))
        .await
        .unwrap();
    let (event, data) = next_frame(&mut stream).await;
    assert_eq!(event, "notification");
    let notification: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(notification["params"]["task"]["status"], "completed");
}

#[tokio::test]
async fn serves_over_tcp_until_shutdown() {
    let server = common::test_server();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async move {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();
    let reply: Value = client
        .post(format!("http://{addr}/mcp"))
        .json(&json!({"jsonrpc": "2.0", "id": 9, "method": "ping"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reply["result"]["pong"], true);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("server stops")
        .unwrap()
        .unwrap();
}

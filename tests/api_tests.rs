use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use gpu_coordinator::api::router;
use gpu_coordinator::clock::ManualClock;
use gpu_coordinator::config::CoordinatorConfig;
use gpu_coordinator::Coordinator;

fn create_test_app(config: CoordinatorConfig) -> (Router, ManualClock) {
    let clock = ManualClock::default();
    let coordinator = Coordinator::with_clock(config, Arc::new(clock.clone())).unwrap();
    (router(Arc::new(coordinator)), clock)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn heartbeat(app: &Router, node_id: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/node/heartbeat",
        Some(json!({
            "node_id": node_id,
            "gpu_model": "RTX 4090",
            "gpu_memory": 24576,
            "gpu_utilization": 12.5,
            "temperature": 54.0,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn submit(app: &Router, model: &str, input: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/v1/inference",
        Some(json!({
            "user_id": "alice",
            "model_id": model,
            "input": input,
            "parameters": {"max_tokens": 32},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_full_task_lifecycle_over_http() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());

    let task = submit(&app, "gpt-x", "hello").await;
    assert_eq!(task["state"], "pending");
    assert_eq!(task["owner"], "alice");
    assert_eq!(task["kind"], "inference");
    assert_eq!(task["parameters"]["max_tokens"], 32);
    let task_id = task["id"].as_str().unwrap().to_string();

    let ack = heartbeat(&app, "n1").await;
    assert_eq!(ack["status"], "ok");
    assert_eq!(ack["has_work"], true);

    let (status, assigned) = send(&app, Method::GET, "/api/v1/node/n1/task", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["id"], task_id.as_str());
    assert_eq!(assigned["state"], "running");
    assert_eq!(assigned["assigned_node"], "n1");

    let (status, body) = send(&app, Method::POST, "/api/v1/node/n1/task", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);

    let result_uri = format!("/api/v1/node/n1/task/{task_id}/result");
    let (status, done) = send(
        &app,
        Method::POST,
        &result_uri,
        Some(json!({"outcome": "completed", "result": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["state"], "completed");
    assert_eq!(done["result"], "hi");

    let (status, body) = send(
        &app,
        Method::POST,
        &result_uri,
        Some(json!({"outcome": "completed", "result": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("completed"));

    let (status, fetched) = send(
        &app,
        Method::GET,
        &format!("/api/v1/task/{task_id}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["result"], "hi");
}

#[tokio::test]
async fn test_generic_task_submission() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());

    let (status, task) = send(
        &app,
        Method::POST,
        "/api/v1/tasks",
        Some(json!({"owner": "bob", "kind": "embedding", "model_ref": "e5", "input": "text"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["kind"], "embedding");

    let (status, tasks) = send(&app, Method::GET, "/api/v1/tasks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/tasks",
        Some(json!({"kind": "Bad Kind", "model_ref": "e5"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_not_found_responses() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());
    submit(&app, "gpt-x", "hello").await;

    let (status, body) = send(&app, Method::GET, "/api/v1/node/n2/task", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("n2"));

    let missing = uuid::Uuid::new_v4();
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/task/{missing}/status"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/v1/node/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_forbidden_report_from_other_node() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());
    let task = submit(&app, "gpt-x", "hello").await;
    let task_id = task["id"].as_str().unwrap();
    heartbeat(&app, "n1").await;
    heartbeat(&app, "n2").await;
    send(&app, Method::GET, "/api/v1/node/n1/task", None).await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/node/n2/task/{task_id}/result"),
        Some(json!({"outcome": "failed", "error": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, current) = send(
        &app,
        Method::GET,
        &format!("/api/v1/task/{task_id}/status"),
        None,
    )
    .await;
    assert_eq!(current["state"], "running");
    assert_eq!(current["assigned_node"], "n1");
}

#[tokio::test]
async fn test_malformed_requests_are_bad_request() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());

    let (status, _) = send(&app, Method::GET, "/api/v1/task/not-a-uuid/status", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/inference",
        Some(json!({"user_id": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/inference",
        Some(json!({"model_id": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/node/heartbeat",
        Some(json!({"node_id": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Completed without a result
    let task = submit(&app, "gpt-x", "hello").await;
    let task_id = task["id"].as_str().unwrap();
    heartbeat(&app, "n1").await;
    send(&app, Method::GET, "/api/v1/node/n1/task", None).await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/node/n1/task/{task_id}/result"),
        Some(json!({"outcome": "completed"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_node_gets_conflict() {
    let (app, clock) = create_test_app(CoordinatorConfig::default());
    submit(&app, "gpt-x", "hello").await;
    heartbeat(&app, "n1").await;

    clock.advance(Duration::seconds(45));
    let (status, body) = send(&app, Method::GET, "/api/v1/node/n1/task", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("stale"));

    let (status, node) = send(&app, Method::GET, "/api/v1/node/n1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(node["liveness"], "stale");
    assert_eq!(node["reputation_score"], 100.0);
    assert_eq!(node["capabilities"]["gpu_model"], "RTX 4090");
    assert_eq!(node["telemetry"]["temperature"], 54.0);
}

#[tokio::test]
async fn test_queue_full_is_service_unavailable() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default().with_max_tasks(1));
    submit(&app, "gpt-x", "one").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/inference",
        Some(json!({"model_id": "gpt-x", "input": "two"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_nodes_and_stats_endpoints() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());
    heartbeat(&app, "b").await;
    heartbeat(&app, "a").await;
    submit(&app, "gpt-x", "one").await;
    submit(&app, "gpt-x", "two").await;
    send(&app, Method::GET, "/api/v1/node/a/task", None).await;

    let (status, nodes) = send(&app, Method::GET, "/api/v1/nodes", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<_> = nodes
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);

    let (status, stats) = send(&app, Method::GET, "/api/v1/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["tasks"]["total"], 2);
    assert_eq!(stats["tasks"]["pending"], 1);
    assert_eq!(stats["tasks"]["running"], 1);
    assert_eq!(stats["nodes"]["total"], 2);
    assert_eq!(stats["nodes"]["alive"], 2);
}

#[tokio::test]
async fn test_gpu_agent_heartbeat_and_fetch_flow() {
    let (app, _clock) = create_test_app(CoordinatorConfig::default());

    let (status, created) = send(
        &app,
        Method::POST,
        "/api/v1/inference",
        Some(json!({"model_id": "llama-7b", "input": "hello there", "parameters": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["type"], "inference");
    assert_eq!(created["model_id"], "llama-7b");
    assert_eq!(created["user_id"], "anonymous");
    assert_eq!(created["status"], "pending");
    assert_eq!(created["node_id"], Value::Null);

    // Heartbeat body exactly as the agent sends it
    let (status, ack) = send(
        &app,
        Method::POST,
        "/api/v1/node/heartbeat",
        Some(json!({
            "node_id": "node-1a2b3c4d",
            "gpu_model": "RTX 3090",
            "gpu_memory": 24576,
            "gpu_utilization": 0.0,
            "temperature": 65.0,
            "status": "online",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["status"], "ok");
    assert_eq!(ack["has_task"], true);
    assert_eq!(ack["has_work"], true);

    let (status, task) = send(&app, Method::GET, "/api/v1/node/node-1a2b3c4d/task", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["id"], created["id"]);
    assert_eq!(task["type"], "inference");
    assert_eq!(task["model_id"], "llama-7b");
    assert_eq!(task["input"], "hello there");
    assert_eq!(task["status"], "running");
    assert_eq!(task["node_id"], "node-1a2b3c4d");

    let ack = heartbeat(&app, "node-1a2b3c4d").await;
    assert_eq!(ack["has_task"], false);
}

#[tokio::test]
async fn test_unknown_node_status_still_counts_as_heartbeat() {
    let (app, clock) = create_test_app(CoordinatorConfig::default());
    heartbeat(&app, "n1").await;

    clock.advance(Duration::seconds(100));
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/node/heartbeat",
        Some(json!({
            "node_id": "n1",
            "gpu_model": "RTX 4090",
            "gpu_memory": 24576,
            "status": "maintenance",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, node) = send(&app, Method::GET, "/api/v1/node/n1", None).await;
    assert_eq!(node["status"], "maintenance");
    assert_eq!(node["liveness"], "alive");
    assert_eq!(node["heartbeats"], 2);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/node/heartbeat",
        Some(json!({"node_id": "n1", "status": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, node) = send(&app, Method::GET, "/api/v1/node/n1", None).await;
    assert_eq!(node["status"], "online");
}

//! HTTP/JSON binding for the coordinator.
//!
//! Paths follow the `/api/v1` layout the GPU agents already speak, and
//! responses carry the field names those agents read (`has_task` on the
//! heartbeat reply, `type`/`model_id`/`user_id`/`node_id`/`status` on tasks)
//! alongside the native ones. Extractor rejections are reported as
//! `400 Bad Request` with the same `{"error": ...}` body as every other
//! failure.

mod error;

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::coordinator::{Coordinator, HeartbeatAck, NodeView, Stats};
use crate::error::{CoordinatorError, Result};
use crate::fleet::{Capabilities, Heartbeat, NodeStatus, Telemetry};
use crate::scheduler::{Outcome, Parameters, Task, TaskKind, TaskSpec, TaskState};

use self::error::malformed;

const DEFAULT_OWNER: &str = "anonymous";

#[derive(Debug, Deserialize)]
pub struct InferenceRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub model_id: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTaskRequest {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub kind: TaskKind,
    pub model_ref: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub parameters: Parameters,
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub node_id: String,
    #[serde(default)]
    pub gpu_model: String,
    /// Megabytes
    #[serde(default)]
    pub gpu_memory: u64,
    #[serde(default)]
    pub gpu_utilization: Option<f64>,
    #[serde(default)]
    pub temperature: Option<f64>,
    /// Free-form; `null` or absent means online
    #[serde(default)]
    pub status: Option<NodeStatus>,
}

impl From<HeartbeatRequest> for Heartbeat {
    fn from(req: HeartbeatRequest) -> Self {
        let telemetry = match (req.gpu_utilization, req.temperature) {
            (None, None) => None,
            (utilization, temperature) => Some(Telemetry {
                gpu_utilization: utilization.unwrap_or_default(),
                temperature: temperature.unwrap_or_default(),
            }),
        };
        Heartbeat {
            node_id: req.node_id,
            capabilities: Capabilities {
                gpu_model: req.gpu_model,
                gpu_memory_mb: req.gpu_memory,
            },
            status: req.status.unwrap_or_default(),
            telemetry,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedOutcome {
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
pub struct ReportResultRequest {
    pub outcome: ReportedOutcome,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TryFrom<ReportResultRequest> for Outcome {
    type Error = CoordinatorError;

    fn try_from(req: ReportResultRequest) -> Result<Self> {
        match req.outcome {
            ReportedOutcome::Completed => req
                .result
                .map(|result| Outcome::Completed { result })
                .ok_or_else(|| {
                    CoordinatorError::MalformedInput(
                        "a completed outcome must include a result".to_string(),
                    )
                }),
            ReportedOutcome::Failed => Ok(Outcome::Failed { error: req.error }),
        }
    }
}

/// Heartbeat reply. `has_task` is the agent-facing alias of `has_work`.
#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    #[serde(flatten)]
    pub ack: HeartbeatAck,
    pub has_task: bool,
}

impl From<HeartbeatAck> for HeartbeatResponse {
    fn from(ack: HeartbeatAck) -> Self {
        Self {
            has_task: ack.has_work,
            ack,
        }
    }
}

/// A task on the wire: every native field plus the names agents read.
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    #[serde(rename = "type")]
    pub task_type: TaskKind,
    pub model_id: String,
    pub user_id: String,
    pub node_id: Option<String>,
    pub status: TaskState,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            task_type: task.kind.clone(),
            model_id: task.model_ref.clone(),
            user_id: task.owner.clone(),
            node_id: task.assigned_node.clone(),
            status: task.state,
            task,
        }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/inference", post(submit_inference_handler))
        .route(
            "/api/v1/tasks",
            get(list_tasks_handler).post(submit_task_handler),
        )
        .route("/api/v1/task/{id}/status", get(task_status_handler))
        .route("/api/v1/node/heartbeat", post(heartbeat_handler))
        .route("/api/v1/nodes", get(list_nodes_handler))
        .route("/api/v1/node/{id}", get(node_handler))
        .route(
            "/api/v1/node/{id}/task",
            get(request_work_handler).post(request_work_handler),
        )
        .route(
            "/api/v1/node/{id}/task/{task_id}/result",
            post(report_result_handler),
        )
        .route("/api/v1/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(coordinator)
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn submit_inference_handler(
    State(coordinator): State<Arc<Coordinator>>,
    payload: std::result::Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Json<TaskView>> {
    let Json(req) = payload.map_err(malformed)?;
    let spec = TaskSpec {
        owner: req.user_id.unwrap_or_else(|| DEFAULT_OWNER.to_string()),
        kind: TaskKind::Inference,
        model_ref: req.model_id,
        input: req.input,
        parameters: req.parameters,
    };
    Ok(Json(coordinator.submit(spec).await?.into()))
}

async fn submit_task_handler(
    State(coordinator): State<Arc<Coordinator>>,
    payload: std::result::Result<Json<SubmitTaskRequest>, JsonRejection>,
) -> Result<Json<TaskView>> {
    let Json(req) = payload.map_err(malformed)?;
    let spec = TaskSpec {
        owner: req.owner.unwrap_or_else(|| DEFAULT_OWNER.to_string()),
        kind: req.kind,
        model_ref: req.model_ref,
        input: req.input,
        parameters: req.parameters,
    };
    Ok(Json(coordinator.submit(spec).await?.into()))
}

async fn list_tasks_handler(
    State(coordinator): State<Arc<Coordinator>>,
) -> Json<Vec<TaskView>> {
    Json(
        coordinator
            .tasks()
            .await
            .into_iter()
            .map(TaskView::from)
            .collect(),
    )
}

async fn task_status_handler(
    State(coordinator): State<Arc<Coordinator>>,
    path: std::result::Result<Path<Uuid>, PathRejection>,
) -> Result<Json<TaskView>> {
    let Path(task_id) = path.map_err(malformed)?;
    Ok(Json(coordinator.task(&task_id).await?.into()))
}

async fn heartbeat_handler(
    State(coordinator): State<Arc<Coordinator>>,
    payload: std::result::Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<HeartbeatResponse>> {
    let Json(req) = payload.map_err(malformed)?;
    Ok(Json(coordinator.heartbeat(req.into()).await?.into()))
}

async fn list_nodes_handler(State(coordinator): State<Arc<Coordinator>>) -> Json<Vec<NodeView>> {
    Json(coordinator.nodes().await)
}

async fn node_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Path(node_id): Path<String>,
) -> Result<Json<NodeView>> {
    Ok(Json(coordinator.node(&node_id).await?))
}

async fn request_work_handler(
    State(coordinator): State<Arc<Coordinator>>,
    Path(node_id): Path<String>,
) -> Result<Json<TaskView>> {
    Ok(Json(coordinator.request_work(&node_id).await?.into()))
}

async fn report_result_handler(
    State(coordinator): State<Arc<Coordinator>>,
    path: std::result::Result<Path<(String, Uuid)>, PathRejection>,
    payload: std::result::Result<Json<ReportResultRequest>, JsonRejection>,
) -> Result<Json<TaskView>> {
    let Path((node_id, task_id)) = path.map_err(malformed)?;
    let Json(req) = payload.map_err(malformed)?;
    let outcome = Outcome::try_from(req)?;
    let task = coordinator
        .report_result(&node_id, &task_id, outcome)
        .await?;
    Ok(Json(task.into()))
}

async fn stats_handler(State(coordinator): State<Arc<Coordinator>>) -> Json<Stats> {
    Json(coordinator.stats().await)
}

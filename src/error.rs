//! Failure taxonomy shared by the engine, the facade and the HTTP layer.
//!
//! A failed operation never leaves a task or node partially updated.

use thiserror::Error;
use uuid::Uuid;

use crate::fleet::Liveness;
use crate::scheduler::TaskState;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: TaskState,
        to: TaskState,
    },

    #[error("Node {node_id} is not assigned to task {task_id}")]
    Forbidden { task_id: Uuid, node_id: String },

    /// Empty queue. Not a failure: callers retry later.
    #[error("No work available")]
    NoWorkAvailable,

    #[error("Node {node_id} is {liveness}, not accepting work requests")]
    NodeUnavailable { node_id: String, liveness: Liveness },

    #[error("Task queue is at capacity ({0} tasks)")]
    QueueFull(usize),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

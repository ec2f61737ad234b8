use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CoordinatorError;

pub type TaskId = Uuid;

/// Free-form task parameters. Carried verbatim, never interpreted.
pub type Parameters = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }

    /// Edges of the lifecycle state machine. `Running -> Pending` is the
    /// reclaim edge for tasks orphaned by a dead node.
    pub fn can_transition_to(self, to: TaskState) -> bool {
        matches!(
            (self, to),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Pending)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// Task category. Only inference is built in; other labels pass through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TaskKind {
    #[default]
    Inference,
    Other(String),
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Inference => write!(f, "inference"),
            TaskKind::Other(label) => write!(f, "{}", label),
        }
    }
}

impl FromStr for TaskKind {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        if label.is_empty() {
            return Err(CoordinatorError::MalformedInput(
                "task kind must not be empty".to_string(),
            ));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        {
            return Err(CoordinatorError::MalformedInput(format!(
                "task kind '{}' must be a lowercase label",
                label
            )));
        }
        Ok(match label {
            "inference" => TaskKind::Inference,
            other => TaskKind::Other(other.to_string()),
        })
    }
}

impl TryFrom<String> for TaskKind {
    type Error = CoordinatorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.to_string()
    }
}

/// What a client hands over at submission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub owner: String,
    pub kind: TaskKind,
    pub model_ref: String,
    pub input: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl TaskSpec {
    pub fn inference(
        owner: impl Into<String>,
        model_ref: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            kind: TaskKind::Inference,
            model_ref: model_ref.into(),
            input: input.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Boundary check run before a spec reaches the registry.
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.owner.trim().is_empty() {
            return Err(CoordinatorError::MalformedInput(
                "owner must not be empty".to_string(),
            ));
        }
        if self.model_ref.trim().is_empty() {
            return Err(CoordinatorError::MalformedInput(
                "model_ref must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner: String,
    pub kind: TaskKind,
    pub model_ref: String,
    pub input: String,
    pub parameters: Parameters,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_node: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(spec: TaskSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: spec.owner,
            kind: spec.kind,
            model_ref: spec.model_ref,
            input: spec.input,
            parameters: spec.parameters,
            state: TaskState::Pending,
            result: None,
            error: None,
            assigned_node: None,
            attempts: 0,
            created_at,
            assigned_at: None,
            finished_at: None,
        }
    }

    /// Lifecycle invariant: the node binding exists exactly from assignment
    /// onward, a result exists only on completion, an error only on failure.
    pub fn is_consistent(&self) -> bool {
        let bound = matches!(
            self.state,
            TaskState::Running | TaskState::Completed | TaskState::Failed
        );
        self.assigned_node.is_some() == bound
            && self.assigned_at.is_some() == bound
            && self.result.is_some() == (self.state == TaskState::Completed)
            && (self.error.is_none() || self.state == TaskState::Failed)
            && self.finished_at.is_some() == self.state.is_terminal()
    }
}

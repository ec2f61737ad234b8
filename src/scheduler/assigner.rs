use chrono::{DateTime, Utc};

use crate::config::AssignmentPolicy;
use crate::error::{CoordinatorError, Result};
use crate::fleet::{Liveness, NodeRegistry, NodeStatus};
use crate::scheduler::registry::{TaskRegistry, TransitionFields};
use crate::scheduler::task::{Task, TaskId, TaskState};

/// What a node reports when it finishes a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { result: String },
    Failed { error: Option<String> },
}

impl Outcome {
    pub fn completed(result: impl Into<String>) -> Self {
        Outcome::Completed {
            result: result.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Outcome::Failed {
            error: Some(error.into()),
        }
    }

    fn target_state(&self) -> TaskState {
        match self {
            Outcome::Completed { .. } => TaskState::Completed,
            Outcome::Failed { .. } => TaskState::Failed,
        }
    }
}

/// Matches pending tasks to nodes that ask for work.
///
/// Every method takes the registries by `&mut`/`&` so the caller decides the
/// locking; the coordinator holds one lock across each call, which makes
/// select-and-transition a single atomic step.
#[derive(Debug, Clone, Default)]
pub struct TaskAssigner {
    policy: AssignmentPolicy,
}

impl TaskAssigner {
    pub fn new(policy: AssignmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AssignmentPolicy {
        &self.policy
    }

    /// Claim the oldest pending task for `node_id`.
    ///
    /// `Ok(None)` is the normal empty-queue answer. It is also returned when
    /// the node is draining or already at its running-task limit.
    pub fn request_work(
        &self,
        tasks: &mut TaskRegistry,
        nodes: &NodeRegistry,
        node_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let node = nodes.get(node_id)?;

        let liveness = node.liveness(now, nodes.liveness_config());
        if self.policy.require_alive && liveness != Liveness::Alive {
            return Err(CoordinatorError::NodeUnavailable {
                node_id: node_id.to_string(),
                liveness,
            });
        }

        if node.status == NodeStatus::Draining {
            tracing::debug!(node_id, "Draining node asked for work");
            return Ok(None);
        }

        if tasks.running_count(node_id) >= self.policy.max_running_per_node {
            return Ok(None);
        }

        let Some(task_id) = tasks.next_pending() else {
            return Ok(None);
        };

        let task = tasks.transition(
            &task_id,
            &[TaskState::Pending],
            TaskState::Running,
            TransitionFields::at(now).with_node(node_id),
        )?;
        tracing::info!(
            task_id = %task.id,
            node_id,
            model_ref = %task.model_ref,
            attempt = task.attempts,
            "Task assigned"
        );
        Ok(Some(task))
    }

    /// Record a node's outcome for a task it holds.
    ///
    /// Ownership is checked before state, so a node probing someone else's
    /// task always gets `Forbidden` and learns nothing else.
    pub fn report_result(
        &self,
        tasks: &mut TaskRegistry,
        node_id: &str,
        task_id: &TaskId,
        outcome: Outcome,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let current = tasks.get(task_id)?;
        if current.assigned_node.as_deref() != Some(node_id) {
            tracing::warn!(
                task_id = %task_id,
                node_id,
                assigned_node = ?current.assigned_node,
                "Rejected result from unassigned node"
            );
            return Err(CoordinatorError::Forbidden {
                task_id: *task_id,
                node_id: node_id.to_string(),
            });
        }

        let to = outcome.target_state();
        let fields = match outcome {
            Outcome::Completed { result } => TransitionFields::at(now).with_result(result),
            Outcome::Failed { error } => TransitionFields::at(now).with_error(error),
        };
        let task = tasks.transition(task_id, &[TaskState::Running], to, fields)?;

        match task.state {
            TaskState::Failed => tracing::warn!(
                task_id = %task.id,
                node_id,
                error = task.error.as_deref().unwrap_or(""),
                "Task failed"
            ),
            _ => tracing::info!(task_id = %task.id, node_id, "Task completed"),
        }
        Ok(task)
    }

    /// Return running tasks held by dead nodes to the pending queue.
    ///
    /// This is the only path by which a bound task is ever reassigned.
    pub fn reclaim_orphaned(
        &self,
        tasks: &mut TaskRegistry,
        nodes: &NodeRegistry,
        now: DateTime<Utc>,
    ) -> Vec<Task> {
        let mut holders = tasks.nodes_with_running();
        holders.sort();

        let mut reclaimed = Vec::new();
        for node_id in holders {
            match nodes.liveness(&node_id, now) {
                Ok(Liveness::Dead) => {}
                Ok(_) => continue,
                Err(_) => {
                    tracing::warn!(node_id = %node_id, "Running tasks bound to unknown node");
                }
            }

            for task_id in tasks.running_on(&node_id) {
                match tasks.transition(
                    &task_id,
                    &[TaskState::Running],
                    TaskState::Pending,
                    TransitionFields::at(now),
                ) {
                    Ok(task) => {
                        tracing::warn!(
                            task_id = %task.id,
                            node_id = %node_id,
                            attempts = task.attempts,
                            "Reclaimed task from dead node"
                        );
                        reclaimed.push(task);
                    }
                    Err(e) => {
                        tracing::error!(task_id = %task_id, error = %e, "Reclaim failed");
                    }
                }
            }
        }
        reclaimed
    }
}

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CoordinatorError, Result};
use crate::scheduler::task::{Task, TaskId, TaskSpec, TaskState};

const DEFAULT_MAX_TASKS: usize = 10_000;

/// FIFO key: creation time, then submission order for identical timestamps.
type PendingKey = (DateTime<Utc>, u64, TaskId);

#[derive(Debug)]
struct Slot {
    task: Task,
    seq: u64,
}

impl Slot {
    fn pending_key(&self) -> PendingKey {
        (self.task.created_at, self.seq, self.task.id)
    }
}

/// Field updates applied alongside a state change.
#[derive(Debug, Clone)]
pub struct TransitionFields {
    pub at: DateTime<Utc>,
    pub assigned_node: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl TransitionFields {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            at,
            assigned_node: None,
            result: None,
            error: None,
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.assigned_node = Some(node_id.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

/// Point-in-time view of pending tasks, oldest first.
///
/// Later registry mutations are not reflected. Iterate it as often as needed.
#[derive(Debug, Clone, Default)]
pub struct PendingTasks {
    tasks: Vec<Task>,
}

impl PendingTasks {
    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.tasks.iter()
    }

    pub fn first(&self) -> Option<&Task> {
        self.tasks.first()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl IntoIterator for PendingTasks {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

impl<'a> IntoIterator for &'a PendingTasks {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Owns every task and the only path for changing their state.
///
/// Capacity bounds live work only (`pending` plus `running`). Finished tasks
/// stay queryable and never count against it.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, Slot>,
    pending: BTreeSet<PendingKey>,
    running_by_node: HashMap<String, HashSet<TaskId>>,
    live: usize,
    next_seq: u64,
    max_tasks: usize,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_TASKS)
    }

    pub fn with_capacity(max_tasks: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            pending: BTreeSet::new(),
            running_by_node: HashMap::new(),
            live: 0,
            next_seq: 0,
            max_tasks,
        }
    }

    /// Create a pending task. Fails with `QueueFull` when `max_tasks` tasks
    /// are already pending or running.
    pub fn submit(&mut self, spec: TaskSpec, now: DateTime<Utc>) -> Result<Task> {
        if self.is_full() {
            return Err(CoordinatorError::QueueFull(self.max_tasks));
        }

        let task = Task::new(spec, now);
        let slot = Slot {
            task: task.clone(),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.live += 1;
        self.pending.insert(slot.pending_key());
        self.tasks.insert(task.id, slot);
        Ok(task)
    }

    pub fn get(&self, id: &TaskId) -> Result<Task> {
        self.tasks
            .get(id)
            .map(|slot| slot.task.clone())
            .ok_or(CoordinatorError::TaskNotFound(*id))
    }

    /// Guarded state change.
    ///
    /// The current state must be one of `from`, and `from -> to` must be an
    /// edge of the lifecycle state machine. All checks run before any write,
    /// so a rejected transition leaves the task untouched.
    pub fn transition(
        &mut self,
        id: &TaskId,
        from: &[TaskState],
        to: TaskState,
        fields: TransitionFields,
    ) -> Result<Task> {
        let slot = self
            .tasks
            .get_mut(id)
            .ok_or(CoordinatorError::TaskNotFound(*id))?;

        let current = slot.task.state;
        if !from.contains(&current) || !current.can_transition_to(to) {
            return Err(CoordinatorError::InvalidTransition {
                task_id: *id,
                from: current,
                to,
            });
        }

        match to {
            TaskState::Running => {
                if fields.assigned_node.as_deref().map_or(true, str::is_empty) {
                    return Err(CoordinatorError::MalformedInput(
                        "assignment requires a node id".to_string(),
                    ));
                }
            }
            TaskState::Completed => {
                if fields.result.is_none() {
                    return Err(CoordinatorError::MalformedInput(
                        "completion requires a result".to_string(),
                    ));
                }
            }
            TaskState::Failed | TaskState::Pending => {}
        }

        let key = slot.pending_key();
        let previous_node = slot.task.assigned_node.clone();
        let task = &mut slot.task;
        task.state = to;

        match to {
            TaskState::Running => {
                task.assigned_node = fields.assigned_node;
                task.assigned_at = Some(fields.at);
                task.attempts += 1;
                self.pending.remove(&key);
            }
            TaskState::Completed => {
                task.result = fields.result;
                task.finished_at = Some(fields.at);
            }
            TaskState::Failed => {
                task.error = fields.error;
                task.finished_at = Some(fields.at);
            }
            TaskState::Pending => {
                task.assigned_node = None;
                task.assigned_at = None;
                self.pending.insert(key);
            }
        }

        debug_assert!(task.is_consistent(), "task {} broke its invariant", task.id);
        let updated = task.clone();

        if to.is_terminal() {
            self.live -= 1;
        }

        // Keep the per-node running index in step with the state
        if current == TaskState::Running {
            if let Some(node) = previous_node {
                if let Some(set) = self.running_by_node.get_mut(&node) {
                    set.remove(id);
                    if set.is_empty() {
                        self.running_by_node.remove(&node);
                    }
                }
            }
        }
        if to == TaskState::Running {
            if let Some(node) = &updated.assigned_node {
                self.running_by_node
                    .entry(node.clone())
                    .or_default()
                    .insert(*id);
            }
        }

        Ok(updated)
    }

    pub fn list_pending(&self) -> PendingTasks {
        let tasks = self
            .pending
            .iter()
            .filter_map(|(_, _, id)| self.tasks.get(id))
            .map(|slot| slot.task.clone())
            .collect();
        PendingTasks { tasks }
    }

    /// Oldest pending task id, if any.
    pub fn next_pending(&self) -> Option<TaskId> {
        self.pending.iter().next().map(|(_, _, id)| *id)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of `running` tasks bound to a node.
    pub fn running_count(&self, node_id: &str) -> usize {
        self.running_by_node.get(node_id).map_or(0, HashSet::len)
    }

    /// Nodes that currently hold at least one running task.
    pub fn nodes_with_running(&self) -> Vec<String> {
        self.running_by_node.keys().cloned().collect()
    }

    pub fn running_on(&self, node_id: &str) -> Vec<TaskId> {
        let mut ids: Vec<TaskId> = self
            .running_by_node
            .get(node_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_by_key(|id| self.tasks.get(id).map(|slot| slot.pending_key()));
        ids
    }

    /// All tasks sorted chronologically by creation time
    pub fn all(&self) -> Vec<Task> {
        let mut slots: Vec<&Slot> = self.tasks.values().collect();
        slots.sort_by_key(|slot| slot.pending_key());
        slots.into_iter().map(|slot| slot.task.clone()).collect()
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts {
            total: self.tasks.len(),
            ..Default::default()
        };
        for slot in self.tasks.values() {
            match slot.task.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks still pending or running.
    pub fn live_count(&self) -> usize {
        self.live
    }

    pub fn is_full(&self) -> bool {
        self.live >= self.max_tasks
    }
}

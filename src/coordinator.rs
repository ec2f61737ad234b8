//! Single entry point for the transport layer.
//!
//! [`Coordinator`] owns the task and node registries behind one mutex. Each
//! public method acquires the lock once, does its lookups, guard checks and
//! mutations, and releases it. Nothing inside the critical section awaits or
//! does I/O, so every operation completes in bounded time, and no caller can
//! observe a half-applied change.
//!
//! # Operations
//!
//! | Caller | Method |
//! |---|---|
//! | client | [`submit`](Coordinator::submit), [`task`](Coordinator::task) |
//! | node | [`heartbeat`](Coordinator::heartbeat), [`request_work`](Coordinator::request_work), [`report_result`](Coordinator::report_result) |
//! | reclaim timer | [`reclaim_orphaned`](Coordinator::reclaim_orphaned) |
//! | reputation service | [`set_reputation`](Coordinator::set_reputation) |

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::fleet::{Heartbeat, Liveness, Node, NodeRegistry};
use crate::scheduler::{
    Outcome, PendingTasks, Task, TaskAssigner, TaskCounts, TaskId, TaskRegistry, TaskSpec,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatAck {
    pub status: &'static str,
    /// Hint only: another node may claim the work before this one asks.
    pub has_work: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub node: Node,
    pub liveness: Liveness,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    pub total: usize,
    pub alive: usize,
    pub stale: usize,
    pub dead: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub tasks: TaskCounts,
    pub nodes: NodeCounts,
}

#[derive(Debug)]
struct Registries {
    tasks: TaskRegistry,
    nodes: NodeRegistry,
}

#[derive(Debug)]
pub struct Coordinator {
    registries: Mutex<Registries>,
    assigner: TaskAssigner,
    config: CoordinatorConfig,
    clock: Arc<dyn Clock>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CoordinatorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let registries = Registries {
            tasks: TaskRegistry::with_capacity(config.max_tasks),
            nodes: NodeRegistry::new(config.liveness.clone(), config.baseline_reputation),
        };
        Ok(Self {
            registries: Mutex::new(registries),
            assigner: TaskAssigner::new(config.assignment.clone()),
            config,
            clock,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub async fn submit(&self, spec: TaskSpec) -> Result<Task> {
        spec.validate()?;
        let mut reg = self.registries.lock().await;
        let now = self.clock.now();
        let task = reg.tasks.submit(spec, now).inspect_err(|e| {
            tracing::warn!(error = %e, "Task submission rejected");
        })?;
        tracing::info!(
            task_id = %task.id,
            owner = %task.owner,
            kind = %task.kind,
            model_ref = %task.model_ref,
            "Task submitted"
        );
        Ok(task)
    }

    pub async fn task(&self, task_id: &TaskId) -> Result<Task> {
        self.registries.lock().await.tasks.get(task_id)
    }

    /// All tasks, oldest first
    pub async fn tasks(&self) -> Vec<Task> {
        self.registries.lock().await.tasks.all()
    }

    pub async fn list_pending(&self) -> PendingTasks {
        self.registries.lock().await.tasks.list_pending()
    }

    pub async fn heartbeat(&self, beat: Heartbeat) -> Result<HeartbeatAck> {
        let mut reg = self.registries.lock().await;
        let now = self.clock.now();
        let node = reg.nodes.heartbeat(beat, now)?;
        let has_work = reg.tasks.has_pending();
        tracing::debug!(node_id = %node.id, status = %node.status, has_work, "Heartbeat");
        Ok(HeartbeatAck {
            status: "ok",
            has_work,
        })
    }

    /// Claim one pending task for `node_id`.
    ///
    /// Returns [`CoordinatorError::NoWorkAvailable`] when there is nothing to
    /// hand out; nodes treat that as "poll again later".
    pub async fn request_work(&self, node_id: &str) -> Result<Task> {
        let mut reg = self.registries.lock().await;
        let now = self.clock.now();
        let Registries { tasks, nodes } = &mut *reg;
        self.assigner
            .request_work(tasks, nodes, node_id, now)?
            .ok_or(CoordinatorError::NoWorkAvailable)
    }

    pub async fn report_result(
        &self,
        node_id: &str,
        task_id: &TaskId,
        outcome: Outcome,
    ) -> Result<Task> {
        let mut reg = self.registries.lock().await;
        let now = self.clock.now();
        self.assigner
            .report_result(&mut reg.tasks, node_id, task_id, outcome, now)
    }

    pub async fn node(&self, node_id: &str) -> Result<NodeView> {
        let reg = self.registries.lock().await;
        let node = reg.nodes.get(node_id)?;
        let liveness = node.liveness(self.clock.now(), &self.config.liveness);
        Ok(NodeView { node, liveness })
    }

    pub async fn node_liveness(&self, node_id: &str) -> Result<Liveness> {
        let reg = self.registries.lock().await;
        reg.nodes.liveness(node_id, self.clock.now())
    }

    /// All nodes with their current liveness, sorted by id
    pub async fn nodes(&self) -> Vec<NodeView> {
        let reg = self.registries.lock().await;
        let now = self.clock.now();
        reg.nodes
            .all()
            .into_iter()
            .map(|node| {
                let liveness = node.liveness(now, &self.config.liveness);
                NodeView { node, liveness }
            })
            .collect()
    }

    /// Reputation update hook. Scoring policy lives with the caller.
    pub async fn set_reputation(&self, node_id: &str, score: f64) -> Result<Node> {
        let mut reg = self.registries.lock().await;
        let node = reg.nodes.set_reputation(node_id, score)?;
        tracing::info!(node_id, score, "Reputation updated");
        Ok(node)
    }

    /// Put tasks held by dead nodes back in the pending queue.
    pub async fn reclaim_orphaned(&self) -> Vec<Task> {
        let mut reg = self.registries.lock().await;
        let now = self.clock.now();
        let Registries { tasks, nodes } = &mut *reg;
        self.assigner.reclaim_orphaned(tasks, nodes, now)
    }

    pub async fn stats(&self) -> Stats {
        let reg = self.registries.lock().await;
        let now = self.clock.now();
        let mut nodes = NodeCounts::default();
        for node in reg.nodes.all() {
            nodes.total += 1;
            match node.liveness(now, &self.config.liveness) {
                Liveness::Alive => nodes.alive += 1,
                Liveness::Stale => nodes.stale += 1,
                Liveness::Dead => nodes.dead += 1,
            }
        }
        Stats {
            tasks: reg.tasks.counts(),
            nodes,
        }
    }
}

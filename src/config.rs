use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{CoordinatorError, Result};

/// Heartbeat windows used to classify node liveness.
///
/// A node is `alive` while `now - last_heartbeat < alive_window_ms`,
/// `stale` while it is below `stale_window_ms`, and `dead` afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    pub alive_window_ms: u64,
    pub stale_window_ms: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            alive_window_ms: 30_000,
            stale_window_ms: 120_000,
        }
    }
}

impl LivenessConfig {
    pub fn alive_window(&self) -> Duration {
        Duration::from_millis(self.alive_window_ms)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_millis(self.stale_window_ms)
    }
}

/// Rules the assignment engine applies before handing out work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentPolicy {
    /// Reject work requests from nodes that are not `alive`.
    /// When false, stale and dead nodes may still claim tasks.
    pub require_alive: bool,
    /// Upper bound on `running` tasks bound to one node at a time.
    pub max_running_per_node: usize,
}

impl Default for AssignmentPolicy {
    fn default() -> Self {
        Self {
            require_alive: true,
            max_running_per_node: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    pub liveness: LivenessConfig,
    pub assignment: AssignmentPolicy,
    /// Maximum number of pending plus running tasks. Submissions beyond
    /// this are rejected with `QueueFull`.
    pub max_tasks: usize,
    /// Reputation given to a node on its first heartbeat.
    pub baseline_reputation: f64,
    /// How often the reclaim sweep looks for tasks held by dead nodes.
    pub sweep_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            liveness: LivenessConfig::default(),
            assignment: AssignmentPolicy::default(),
            max_tasks: 10_000,
            baseline_reputation: 100.0,
            sweep_interval_ms: 10_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_liveness(mut self, alive_window_ms: u64, stale_window_ms: u64) -> Self {
        self.liveness = LivenessConfig {
            alive_window_ms,
            stale_window_ms,
        };
        self
    }

    pub fn with_require_alive(mut self, require_alive: bool) -> Self {
        self.assignment.require_alive = require_alive;
        self
    }

    pub fn with_max_running_per_node(mut self, max: usize) -> Self {
        self.assignment.max_running_per_node = max;
        self
    }

    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks;
        self
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Reject settings that would make liveness or assignment meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.liveness.alive_window_ms == 0 {
            return Err(CoordinatorError::ConfigError(
                "alive window must be greater than zero".to_string(),
            ));
        }
        if self.liveness.stale_window_ms <= self.liveness.alive_window_ms {
            return Err(CoordinatorError::ConfigError(format!(
                "stale window ({}ms) must be longer than alive window ({}ms)",
                self.liveness.stale_window_ms, self.liveness.alive_window_ms
            )));
        }
        if self.assignment.max_running_per_node == 0 {
            return Err(CoordinatorError::ConfigError(
                "max running tasks per node must be at least 1".to_string(),
            ));
        }
        if self.max_tasks == 0 {
            return Err(CoordinatorError::ConfigError(
                "max tasks must be at least 1".to_string(),
            ));
        }
        if !self.baseline_reputation.is_finite() {
            return Err(CoordinatorError::ConfigError(
                "baseline reputation must be a finite number".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CoordinatorError::ConfigError(
                "sweep interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Run the background reclaim sweep. Disable when an external timer
    /// drives reclaim instead.
    pub reclaim_enabled: bool,
    pub coordinator: CoordinatorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            reclaim_enabled: true,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_coordinator(mut self, coordinator: CoordinatorConfig) -> Self {
        self.coordinator = coordinator;
        self
    }
}

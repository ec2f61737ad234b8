use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::LivenessConfig;

pub type NodeId = String;

/// Status a node reports about itself. Advisory only: liveness is derived
/// from heartbeat timing, never from this field.
///
/// Labels outside the known set are kept verbatim in `Other`, so an
/// unfamiliar status never causes a heartbeat to be rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeStatus {
    #[default]
    Online,
    Idle,
    Busy,
    Draining,
    Offline,
    Other(String),
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Online => write!(f, "online"),
            NodeStatus::Idle => write!(f, "idle"),
            NodeStatus::Busy => write!(f, "busy"),
            NodeStatus::Draining => write!(f, "draining"),
            NodeStatus::Offline => write!(f, "offline"),
            NodeStatus::Other(label) => write!(f, "{}", label),
        }
    }
}

impl From<&str> for NodeStatus {
    fn from(label: &str) -> Self {
        match label.trim() {
            "" | "online" => NodeStatus::Online,
            "idle" => NodeStatus::Idle,
            "busy" => NodeStatus::Busy,
            "draining" => NodeStatus::Draining,
            "offline" => NodeStatus::Offline,
            other => NodeStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for NodeStatus {
    fn from(label: String) -> Self {
        NodeStatus::from(label.as_str())
    }
}

impl From<NodeStatus> for String {
    fn from(status: NodeStatus) -> Self {
        status.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Alive,
    Stale,
    Dead,
}

impl Liveness {
    /// Classify the gap since the last heartbeat. A heartbeat stamped in the
    /// future (clock skew) counts as fresh.
    pub fn classify(
        last_heartbeat: DateTime<Utc>,
        now: DateTime<Utc>,
        config: &LivenessConfig,
    ) -> Self {
        let elapsed = (now - last_heartbeat).to_std().unwrap_or_default();
        if elapsed < config.alive_window() {
            Liveness::Alive
        } else if elapsed < config.stale_window() {
            Liveness::Stale
        } else {
            Liveness::Dead
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Liveness::Alive => write!(f, "alive"),
            Liveness::Stale => write!(f, "stale"),
            Liveness::Dead => write!(f, "dead"),
        }
    }
}

/// Declared hardware. Informational; matching does not consult it yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub gpu_model: String,
    pub gpu_memory_mb: u64,
}

/// Point-in-time readings sent with each heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub gpu_utilization: f64,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub capabilities: Capabilities,
    pub status: NodeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<Telemetry>,
    pub reputation_score: f64,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub heartbeats: u64,
}

impl Node {
    pub fn register(
        id: NodeId,
        capabilities: Capabilities,
        status: NodeStatus,
        reputation_score: f64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            capabilities,
            status,
            telemetry: None,
            reputation_score,
            registered_at: now,
            last_heartbeat: now,
            heartbeats: 1,
        }
    }

    pub fn liveness(&self, now: DateTime<Utc>, config: &LivenessConfig) -> Liveness {
        Liveness::classify(self.last_heartbeat, now, config)
    }
}

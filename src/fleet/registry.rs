use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::LivenessConfig;
use crate::error::{CoordinatorError, Result};
use crate::fleet::node::{Capabilities, Liveness, Node, NodeStatus, Telemetry};

/// Contents of one heartbeat.
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub node_id: String,
    pub capabilities: Capabilities,
    pub status: NodeStatus,
    pub telemetry: Option<Telemetry>,
}

impl Heartbeat {
    pub fn new(node_id: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            node_id: node_id.into(),
            capabilities,
            status: NodeStatus::Online,
            telemetry: None,
        }
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Tracks every node that has ever sent a heartbeat.
///
/// Entries are never removed: a node that stops heartbeating is classified
/// `stale` and then `dead`, but its record stays for auditing.
#[derive(Debug)]
pub struct NodeRegistry {
    nodes: HashMap<String, Node>,
    liveness: LivenessConfig,
    baseline_reputation: f64,
}

impl NodeRegistry {
    pub fn new(liveness: LivenessConfig, baseline_reputation: f64) -> Self {
        Self {
            nodes: HashMap::new(),
            liveness,
            baseline_reputation,
        }
    }

    /// Register on first contact, refresh afterwards.
    ///
    /// Reputation is set once at registration and never touched here.
    pub fn heartbeat(&mut self, beat: Heartbeat, now: DateTime<Utc>) -> Result<Node> {
        if beat.node_id.trim().is_empty() {
            return Err(CoordinatorError::MalformedInput(
                "node_id must not be empty".to_string(),
            ));
        }

        if let Some(node) = self.nodes.get_mut(&beat.node_id) {
            node.last_heartbeat = now;
            node.heartbeats += 1;
            node.status = beat.status;
            node.telemetry = beat.telemetry;
            if node.capabilities != beat.capabilities {
                tracing::info!(
                    node_id = %node.id,
                    gpu_model = %beat.capabilities.gpu_model,
                    gpu_memory_mb = beat.capabilities.gpu_memory_mb,
                    "Node capabilities changed"
                );
                node.capabilities = beat.capabilities;
            }
            return Ok(node.clone());
        }

        let mut node = Node::register(
            beat.node_id.clone(),
            beat.capabilities,
            beat.status,
            self.baseline_reputation,
            now,
        );
        node.telemetry = beat.telemetry;
        tracing::info!(
            node_id = %node.id,
            gpu_model = %node.capabilities.gpu_model,
            gpu_memory_mb = node.capabilities.gpu_memory_mb,
            "Node registered"
        );
        self.nodes.insert(beat.node_id, node.clone());
        Ok(node)
    }

    pub fn get(&self, node_id: &str) -> Result<Node> {
        self.nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::NodeNotFound(node_id.to_string()))
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Computed on every call, never cached.
    pub fn liveness(&self, node_id: &str, now: DateTime<Utc>) -> Result<Liveness> {
        self.nodes
            .get(node_id)
            .map(|node| node.liveness(now, &self.liveness))
            .ok_or_else(|| CoordinatorError::NodeNotFound(node_id.to_string()))
    }

    /// Update hook for the external reputation collaborator.
    pub fn set_reputation(&mut self, node_id: &str, score: f64) -> Result<Node> {
        if !score.is_finite() {
            return Err(CoordinatorError::MalformedInput(format!(
                "reputation score must be finite, got {}",
                score
            )));
        }
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| CoordinatorError::NodeNotFound(node_id.to_string()))?;
        node.reputation_score = score;
        Ok(node.clone())
    }

    /// All nodes sorted by id
    pub fn all(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    pub fn liveness_config(&self) -> &LivenessConfig {
        &self.liveness
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn registry() -> NodeRegistry {
        NodeRegistry::new(LivenessConfig::default(), 100.0)
    }

    fn rtx() -> Capabilities {
        Capabilities {
            gpu_model: "RTX 3090".to_string(),
            gpu_memory_mb: 24_576,
        }
    }

    #[test]
    fn first_heartbeat_registers_with_baseline_reputation() {
        let mut nodes = registry();
        let now = Utc::now();
        let node = nodes.heartbeat(Heartbeat::new("n1", rtx()), now).unwrap();

        assert_eq!(node.id, "n1");
        assert_eq!(node.reputation_score, 100.0);
        assert_eq!(node.registered_at, now);
        assert_eq!(node.last_heartbeat, now);
        assert_eq!(node.heartbeats, 1);
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn repeated_heartbeats_are_idempotent() {
        let mut nodes = registry();
        let start = Utc::now();
        for i in 0..5 {
            nodes
                .heartbeat(Heartbeat::new("n1", rtx()), start + Duration::seconds(i))
                .unwrap();
        }

        let node = nodes.get("n1").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(node.heartbeats, 5);
        assert_eq!(node.registered_at, start);
        assert_eq!(node.last_heartbeat, start + Duration::seconds(4));
        assert_eq!(node.reputation_score, 100.0);
    }

    #[test]
    fn heartbeat_refreshes_status_capabilities_and_telemetry() {
        let mut nodes = registry();
        let now = Utc::now();
        nodes.heartbeat(Heartbeat::new("n1", rtx()), now).unwrap();

        let upgraded = Capabilities {
            gpu_model: "H100".to_string(),
            gpu_memory_mb: 81_920,
        };
        let telemetry = Telemetry {
            gpu_utilization: 0.5,
            temperature: 65.0,
        };
        let node = nodes
            .heartbeat(
                Heartbeat::new("n1", upgraded.clone())
                    .with_status(NodeStatus::Busy)
                    .with_telemetry(telemetry),
                now,
            )
            .unwrap();

        assert_eq!(node.capabilities, upgraded);
        assert_eq!(node.status, NodeStatus::Busy);
        assert_eq!(node.telemetry, Some(telemetry));
    }

    #[test]
    fn empty_node_id_is_rejected() {
        let mut nodes = registry();
        let err = nodes
            .heartbeat(Heartbeat::new("  ", rtx()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::MalformedInput(_)));
        assert!(nodes.is_empty());
    }

    #[test]
    fn liveness_is_computed_on_read() {
        let mut nodes = registry();
        let now = Utc::now();
        nodes.heartbeat(Heartbeat::new("n1", rtx()), now).unwrap();

        assert_eq!(nodes.liveness("n1", now).unwrap(), Liveness::Alive);
        assert_eq!(
            nodes.liveness("n1", now + Duration::seconds(60)).unwrap(),
            Liveness::Stale
        );
        assert_eq!(
            nodes.liveness("n1", now + Duration::seconds(600)).unwrap(),
            Liveness::Dead
        );

        // A fresh heartbeat brings a dead node back
        let later = now + Duration::seconds(600);
        nodes.heartbeat(Heartbeat::new("n1", rtx()), later).unwrap();
        assert_eq!(nodes.liveness("n1", later).unwrap(), Liveness::Alive);
    }

    #[test]
    fn unknown_node_is_not_found() {
        let nodes = registry();
        assert_eq!(
            nodes.get("ghost"),
            Err(CoordinatorError::NodeNotFound("ghost".to_string()))
        );
        assert!(nodes.liveness("ghost", Utc::now()).is_err());
    }

    #[test]
    fn reputation_only_changes_through_hook() {
        let mut nodes = registry();
        nodes
            .heartbeat(Heartbeat::new("n1", rtx()), Utc::now())
            .unwrap();

        let node = nodes.set_reputation("n1", 87.5).unwrap();
        assert_eq!(node.reputation_score, 87.5);

        let node = nodes
            .heartbeat(Heartbeat::new("n1", rtx()), Utc::now())
            .unwrap();
        assert_eq!(node.reputation_score, 87.5);

        assert!(nodes.set_reputation("n1", f64::INFINITY).is_err());
        assert!(nodes.set_reputation("ghost", 1.0).is_err());
    }
}

//! Worker node tracking.
//!
//! Nodes register themselves with their first heartbeat (trust on first use)
//! and keep themselves alive by heartbeating. Liveness is never stored: it is
//! derived from the time since the last heartbeat whenever it is asked for.

pub mod node;
pub mod registry;

pub use node::{Capabilities, Liveness, Node, NodeId, NodeStatus, Telemetry};
pub use registry::{Heartbeat, NodeRegistry};

use std::net::{IpAddr, SocketAddr};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use gpu_coordinator::config::{AssignmentPolicy, CoordinatorConfig, LivenessConfig, ServerConfig};
use gpu_coordinator::server::Server;
use gpu_coordinator::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "gpu-coordinator")]
#[command(version)]
#[command(about = "Task and node coordinator for a distributed GPU inference marketplace")]
struct Args {
    /// Address to bind the HTTP API on
    #[arg(long, default_value = "0.0.0.0", env = "COORD_HOST")]
    host: IpAddr,

    /// Port to bind the HTTP API on
    #[arg(long, default_value = "8080", env = "COORD_PORT")]
    port: u16,

    // === Liveness ===
    /// Heartbeat age below which a node is alive
    #[arg(long, default_value = "30000", env = "COORD_ALIVE_WINDOW_MS")]
    alive_window_ms: u64,

    /// Heartbeat age below which a node is stale (dead beyond it)
    #[arg(long, default_value = "120000", env = "COORD_STALE_WINDOW_MS")]
    stale_window_ms: u64,

    // === Assignment ===
    /// Hand out work to stale and dead nodes too
    #[arg(long, env = "COORD_ALLOW_STALE_NODES")]
    allow_stale_nodes: bool,

    /// Maximum running tasks per node
    #[arg(long, default_value = "1", env = "COORD_MAX_RUNNING_PER_NODE")]
    max_running_per_node: usize,

    /// Maximum pending plus running tasks before submissions are rejected
    #[arg(long, default_value = "10000", env = "COORD_MAX_TASKS")]
    max_tasks: usize,

    /// Reputation assigned to newly registered nodes
    #[arg(long, default_value = "100.0", env = "COORD_BASELINE_REPUTATION")]
    baseline_reputation: f64,

    // === Reclaim ===
    /// Interval between reclaim sweeps
    #[arg(long, default_value = "10000", env = "COORD_SWEEP_INTERVAL_MS")]
    sweep_interval_ms: u64,

    /// Do not run the reclaim sweeper (an external timer drives it instead)
    #[arg(long, env = "COORD_NO_RECLAIM")]
    no_reclaim: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen_addr: SocketAddr::new(self.host, self.port),
            reclaim_enabled: !self.no_reclaim,
            coordinator: CoordinatorConfig {
                liveness: LivenessConfig {
                    alive_window_ms: self.alive_window_ms,
                    stale_window_ms: self.stale_window_ms,
                },
                assignment: AssignmentPolicy {
                    require_alive: !self.allow_stale_nodes,
                    max_running_per_node: self.max_running_per_node,
                },
                max_tasks: self.max_tasks,
                baseline_reputation: self.baseline_reputation,
                sweep_interval_ms: self.sweep_interval_ms,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config();
    tracing::info!(
        addr = %config.listen_addr,
        alive_window_ms = config.coordinator.liveness.alive_window_ms,
        stale_window_ms = config.coordinator.liveness.stale_window_ms,
        require_alive = config.coordinator.assignment.require_alive,
        max_running_per_node = config.coordinator.assignment.max_running_per_node,
        "Starting coordinator"
    );

    let server = Server::new(config)?;
    let shutdown = install_shutdown_handler();
    server.run(shutdown).await?;
    Ok(())
}

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::sweeper::ReclaimSweeper;

/// The coordinator process: HTTP API plus the reclaim sweeper.
pub struct Server {
    pub config: ServerConfig,
    pub coordinator: Arc<Coordinator>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let coordinator = Arc::new(Coordinator::new(config.coordinator.clone())?);
        Ok(Self {
            config,
            coordinator,
        })
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .inspect_err(|e| {
                tracing::error!(addr = %self.config.listen_addr, error = %e, "Failed to bind");
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener.
    ///
    /// 1. Spawns the reclaim sweeper (unless disabled)
    /// 2. Runs the HTTP server with graceful shutdown (blocks)
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> std::io::Result<()> {
        let sweeper = if self.config.reclaim_enabled {
            let sweeper = ReclaimSweeper::new(
                self.coordinator.clone(),
                self.coordinator.config().sweep_interval(),
            );
            let token = shutdown.clone();
            Some(tokio::spawn(async move { sweeper.run(token).await }))
        } else {
            tracing::info!("Reclaim sweeper disabled");
            None
        };

        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Coordinator listening");

        let app = api::router(self.coordinator.clone());
        let token = shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;

        // Stop the sweeper even when the server exited on its own
        shutdown.cancel();
        if let Some(handle) = sweeper {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Reclaim sweeper task ended abnormally");
            }
        }

        tracing::info!("Coordinator shut down");
        served
    }
}

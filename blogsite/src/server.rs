//! Server lifecycle management
//!
//! Binds the HTTP listener and serves the router until a shutdown signal.

use axum::Router;
use tracing::{error, info};

pub struct BlogServer {
    address: String,
    router: Router,
}

impl BlogServer {
    pub const fn new(address: String, router: Router) -> Self {
        Self { address, router }
    }

    /// Serve until Ctrl+C or SIGTERM, then drain in-flight requests
    pub async fn start(self) -> anyhow::Result<()> {
        let http_addr: std::net::SocketAddr = self
            .address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid HTTP address '{}': {e}", self.address))?;

        let listener = tokio::net::TcpListener::bind(http_addr).await.map_err(|e| {
            error!("Failed to bind HTTP address {}: {}", http_addr, e);
            anyhow::anyhow!("Failed to bind {http_addr}: {e}")
        })?;

        info!("HTTP server listening on {}", http_addr);

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C, starting graceful shutdown"); }
        () = terminate => { info!("Received SIGTERM, starting graceful shutdown"); }
    }
}

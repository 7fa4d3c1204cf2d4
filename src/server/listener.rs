//! API server listener
//!
//! Binds the HTTP listener, runs the reconciliation task alongside it, and
//! drains every relay once the server stops.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::controller::RelayController;
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::routes;

/// Relay control API server
pub struct ApiServer {
    config: ServerConfig,
    controller: Arc<RelayController>,
}

impl ApiServer {
    /// Create a new server with the given configuration and controller
    pub fn new(config: ServerConfig, controller: Arc<RelayController>) -> Self {
        Self { config, controller }
    }

    /// Get a reference to the controller
    pub fn controller(&self) -> &Arc<RelayController> {
        &self.controller
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = %listener.local_addr()?, "Relay API listening");

        let probe_handle = if self.controller.probe().config().enabled {
            Some(self.controller.probe().spawn_task())
        } else {
            tracing::info!("Publisher reconciliation disabled");
            None
        };

        let app = routes::router(Arc::clone(&self.controller));
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        // Stop reconciliation before draining relays
        if let Some(handle) = probe_handle {
            handle.abort();
        }

        self.controller.shutdown(self.config.shutdown_timeout).await;
        tracing::info!("Relay API shut down");

        result.map_err(Into::into)
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerConfig;
    use crate::probe::{MemoryPublisherSource, ProbeConfig, PublisherSource, ReconciliationProbe};
    use crate::registry::RelayRegistry;

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let registry = Arc::new(RelayRegistry::new());
        let source: Arc<dyn PublisherSource> = Arc::new(MemoryPublisherSource::new());
        let probe = Arc::new(ReconciliationProbe::new(
            Arc::clone(&registry),
            source,
            ProbeConfig::default(),
        ));
        let controller = Arc::new(RelayController::new(
            registry,
            probe,
            ControllerConfig::default(),
        ));
        let server = ApiServer::new(ServerConfig::default(), controller);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            server
                .serve(listener, async move {
                    let _ = rx.await;
                })
                .await
        });

        let response = reqwest::get(format!("http://{addr}/api/status")).await.unwrap();
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["message"], "API is running");

        tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}

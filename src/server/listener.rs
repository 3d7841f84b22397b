//! SSE server listener
//!
//! Binds the HTTP listener and wires the hub, authenticator and handlers
//! together.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::auth::{Authenticator, CredentialStore};
use crate::error::Result;
use crate::hub::{Broadcaster, Hub};
use crate::server::config::ServerConfig;
use crate::server::handler::{self, AppState};

/// SSE server
pub struct SseServer<S: CredentialStore> {
    config: Arc<ServerConfig>,
    hub: Hub,
    auth: Arc<Authenticator<S>>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<S: CredentialStore> SseServer<S> {
    /// Create a new server validating tokens against `store`
    ///
    /// Starts the hub, so it must be called within a Tokio runtime.
    pub fn new(config: ServerConfig, store: S) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let auth = Authenticator::with_prefix(store, config.auth_key_prefix.clone());

        Self {
            hub: Hub::with_config(config.hub.clone()),
            auth: Arc::new(auth),
            config: Arc::new(config),
            connection_semaphore,
        }
    }

    /// Get a handle to the hub
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Send-only handle for publishing messages
    pub fn broadcaster(&self) -> Broadcaster {
        self.hub.broadcaster()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the HTTP router, e.g. to nest it into a larger application
    pub fn router(&self) -> Router {
        handler::router(AppState {
            hub: self.hub.clone(),
            auth: Arc::clone(&self.auth),
            config: Arc::clone(&self.config),
            connection_semaphore: self.connection_semaphore.clone(),
        })
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "SSE server listening");

        self.serve(listener).await
    }

    /// Run the server until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(addr = %self.config.bind_addr, "SSE server listening");

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    /// Serve connections from an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}

//! `CombateServer` builder and accept loop.
//!
//! This is the entry point for running a Combate server. It ties
//! together all the layers: transport → core loop → dispatcher →
//! placement / rules / session.

use combate_placement::RateLimits;
use combate_protocol::JsonCodec;
use combate_session::{LifecycleConfig, SetupMode};
use combate_transport::{Transport, WebSocketTransport};
use tokio::sync::mpsc;

use crate::event_loop::run_core;
use crate::handler::handle_connection;
use crate::{CombateError, Dispatcher, ServerConfig, Store};

/// Builder for configuring and starting a Combate server.
///
/// # Example
///
/// ```rust,no_run
/// use combate::CombateServer;
///
/// # async fn start() -> Result<(), combate::CombateError> {
/// let server = CombateServer::builder()
///     .bind("0.0.0.0:8082")
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CombateServerBuilder {
    config: ServerConfig,
}

impl CombateServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    /// Sets the disconnect policies.
    pub fn lifecycle(mut self, lifecycle: LifecycleConfig) -> Self {
        self.config.lifecycle = lifecycle;
        self
    }

    /// Sets the placement rate limits.
    pub fn rate_limits(mut self, limits: RateLimits) -> Self {
        self.config.rate_limits = limits;
        self
    }

    /// Chooses how new matches start.
    pub fn setup(mut self, setup: SetupMode) -> Self {
        self.config.setup = setup;
        self
    }

    /// Binds the listener. Nothing is accepted until
    /// [`run`](CombateServer::run).
    pub async fn build(self) -> Result<CombateServer, CombateError> {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;
        Ok(CombateServer {
            transport,
            config: self.config,
        })
    }
}

/// A bound Combate server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CombateServer {
    transport: WebSocketTransport,
    config: ServerConfig,
}

impl CombateServer {
    /// Creates a new builder.
    pub fn builder() -> CombateServerBuilder {
        CombateServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Starts the core loop, then accepts connections and spawns a
    /// handler task for each. Runs until the process is terminated.
    pub async fn run(mut self) -> Result<(), CombateError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(Store::new(&self.config, expired_tx));
        tokio::spawn(run_core(dispatcher, JsonCodec, events_rx, expired_rx));

        tracing::info!(
            bind = %self.config.bind,
            setup = ?self.config.setup,
            "Combate server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let events = events_tx.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, events).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

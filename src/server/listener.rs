//! RTMP relay listener
//!
//! Handles the TCP accept loop and spawns one task per connection, served
//! locally or mirrored to the ingest host.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};

use crate::error::Result;
use crate::events::{EventSender, RelayEvent};
use crate::registry::Registry;
use crate::server::config::ServerConfig;
use crate::server::connection::{serve_local, ConnectionContext};
use crate::server::edge::{is_remote, serve_remote};
use crate::stats::{RelayStats, ServerStats};

/// RTMP relay server
pub struct RelayServer {
    ctx: ConnectionContext,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server and the receiver for its events
    pub fn new(config: ServerConfig) -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (events, rx) = EventSender::channel();
        (Self::with_events(config, events), rx)
    }

    /// Create a server that reports to `events`
    pub fn with_events(config: ServerConfig, events: EventSender) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            ctx: ConnectionContext {
                registry: Arc::new(Registry::new()),
                config: Arc::new(config),
                stats: Arc::new(RelayStats::new()),
                events,
            },
            connection_semaphore,
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<Registry> {
        &self.ctx.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.ctx.config
    }

    /// Current connection and traffic counters
    pub fn stats(&self) -> ServerStats {
        self.ctx.stats.snapshot(self.ctx.registry.publisher_count())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.ctx.config.bind_addr
    }

    /// Bind and run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.ctx.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.ctx.config.bind_addr).await?;
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.serve(listener) => result,
        }
    }

    /// Accept connections on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        tracing::info!(
            addr = %listener.local_addr()?,
            ingest = ?self.ctx.config.ingest,
            "RTMP relay listening"
        );

        let mut failures = 0u32;
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    failures = 0;
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = accept_backoff(failures);
                    tracing::error!(error = %e, retry_in = ?delay, "Failed to accept connection");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = match &self.connection_semaphore {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    self.ctx.stats.connection_rejected();
                    return;
                }
            },
            None => None,
        };

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let local_ip = match socket.local_addr() {
            Ok(addr) => addr.ip(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read local address");
                return;
            }
        };
        let ingest = self
            .ctx
            .config
            .ingest
            .clone()
            .filter(|_| is_remote(peer_addr.ip(), local_ip))
            .map(|host| (host, self.ctx.config.ingest_port));

        tracing::debug!(peer = %peer_addr, remote = ingest.is_some(), "New connection");

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            ctx.stats.connection_opened();

            let result = match ingest {
                Some(ingest) => serve_remote(socket, peer_addr, ingest, ctx.clone()).await,
                None => serve_local(socket, peer_addr, ctx.clone()).await,
            };
            if let Err(e) = result {
                tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
            }

            ctx.stats.connection_closed();
            tracing::debug!(peer = %peer_addr, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.ctx.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }
}

/// Pause after consecutive accept failures, such as running out of file
/// descriptors: 10 ms doubling up to one second
fn accept_backoff(failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(7);
    Duration::from_millis(10 << exponent).min(Duration::from_secs(1))
}

//! Relay configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::allow::AllowType;
use crate::media::gop::DEFAULT_GOP_MAX_SIZE;
use crate::protocol::constants::*;

/// Relay configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Outbound chunk size announced to every peer
    pub chunk_size: u32,

    /// Window acknowledgement size
    pub window_ack_size: u32,

    /// Peer bandwidth limit (sent with the dynamic limit type)
    pub peer_bandwidth: u32,

    /// Ping request interval once connected
    pub ping_interval: Duration,

    /// Disconnect if no data is received for this long
    pub idle_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Application-level read buffer size
    pub read_buffer_size: usize,

    /// Application-level write buffer size
    pub write_buffer_size: usize,

    /// Cache the current GOP for late-joining players
    pub gop_cache: bool,

    /// GOP cache byte cap (0 = unbounded)
    pub gop_cache_max_size: usize,

    /// Peers allowed to publish
    pub push_allow: AllowType,

    /// Peers allowed to play
    pub pull_allow: AllowType,

    /// Upstream host remote peers are mirrored to; `None` serves everyone locally
    pub ingest: Option<String>,

    /// Upstream RTMP port
    pub ingest_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_RTMP_PORT)),
            max_connections: 0, // Unlimited
            chunk_size: RECOMMENDED_CHUNK_SIZE,
            window_ack_size: DEFAULT_WINDOW_ACK_SIZE,
            peer_bandwidth: DEFAULT_PEER_BANDWIDTH,
            ping_interval: DEFAULT_PING_INTERVAL,
            idle_timeout: DEFAULT_PING_TIMEOUT,
            tcp_nodelay: true, // Important for low latency
            read_buffer_size: 64 * 1024, // 64KB
            write_buffer_size: 64 * 1024,
            gop_cache: true,
            gop_cache_max_size: DEFAULT_GOP_MAX_SIZE,
            push_allow: AllowType::all(),
            pull_allow: AllowType::local(),
            ingest: None,
            ingest_port: DEFAULT_RTMP_PORT,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set chunk size
    pub fn chunk_size(mut self, size: u32) -> Self {
        self.chunk_size = size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    pub fn window_ack_size(mut self, size: u32) -> Self {
        self.window_ack_size = size;
        self
    }

    pub fn peer_bandwidth(mut self, size: u32) -> Self {
        self.peer_bandwidth = size;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Disable GOP caching
    pub fn disable_gop_cache(mut self) -> Self {
        self.gop_cache = false;
        self
    }

    pub fn gop_cache_max_size(mut self, size: usize) -> Self {
        self.gop_cache_max_size = size;
        self
    }

    pub fn push_allow(mut self, allow: impl Into<AllowType>) -> Self {
        self.push_allow = allow.into();
        self
    }

    pub fn pull_allow(mut self, allow: impl Into<AllowType>) -> Self {
        self.pull_allow = allow.into();
        self
    }

    /// Mirror remote peers to `host`
    pub fn ingest(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.ingest = if host.is_empty() { None } else { Some(host) };
        self
    }

    pub fn ingest_port(mut self, port: u16) -> Self {
        self.ingest_port = port;
        self
    }
}

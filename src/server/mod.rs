//! RTMP relay server
//!
//! [`RelayServer`] accepts connections. Local peers get a
//! [`connection`] task that drives their session; remote peers are
//! mirrored to the ingest host by the [`edge`] relay.

pub mod config;
pub mod connection;
pub mod edge;
pub mod listener;

pub use config::ServerConfig;
pub use connection::ConnectionContext;
pub use listener::RelayServer;

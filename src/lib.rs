//! rtmp-relay: RTMP relay server
//!
//! Terminates RTMP connections from publishers and players:
//! - Plain handshake, chunk stream reassembly and AMF0 commands
//! - Live fan-out from one publisher per path to any number of players
//! - Players that ask for a path before it is published wait and are
//!   started as soon as the publisher arrives
//! - GOP caching so late joiners start on a keyframe
//! - IP allow-lists for publish and play
//! - Transparent mirroring of remote peers to an ingest server
//!
//! # Example
//!
//! ```no_run
//! use rtmp_relay::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (server, mut events) = RelayServer::new(ServerConfig::default().pull_allow("*"));
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{:?} {}", event.kind, event.stream.path);
//!         }
//!     });
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod allow;
pub mod amf;
pub mod error;
pub mod events;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

// Re-export main types for convenience
pub use allow::AllowType;
pub use error::{Error, Result};
pub use events::{EventKind, EventSender, RelayEvent};
pub use registry::Registry;
pub use server::config::ServerConfig;
pub use server::listener::RelayServer;
pub use session::{Session, StreamInfo};
pub use stats::ServerStats;

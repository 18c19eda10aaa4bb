//! Relay events for external collaborators
//!
//! Webhooks, recorders and similar consumers read these from the receiver
//! returned by [`crate::RelayServer::new`]. Every event carries the
//! [`StreamInfo`] of the session it concerns.

use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::session::{AudioInfo, CodecInfo, StreamInfo, VideoInfo};

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// TCP connection accepted
    SocketConnect {
        peer_addr: SocketAddr,
        local_addr: SocketAddr,
    },
    SocketClose,
    SocketError(String),
    /// Upstream ingest connection established for a remote peer
    IngestConnect {
        remote_addr: SocketAddr,
        local_addr: SocketAddr,
    },
    IngestClose,
    IngestError(String),
    /// `connect` accepted; `args` is the connect command object
    Connect { app: String, args: crate::amf::AmfValue },
    DoneConnect,
    PrePublish,
    Publish,
    DonePublish,
    PrePlay,
    Play,
    DonePlay,
    AudioCodec(AudioInfo),
    VideoCodec(VideoInfo),
    Codec(CodecInfo),
    /// Malformed message dropped
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayEvent {
    /// The session is mirrored to the ingest host
    pub remote: bool,
    pub stream: StreamInfo,
    pub kind: EventKind,
}

/// Cloneable handle that drops events when no consumer is attached
#[derive(Debug, Clone, Default)]
pub struct EventSender(Option<mpsc::UnboundedSender<RelayEvent>>);

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<RelayEvent>) -> Self {
        Self(Some(tx))
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RelayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn disabled() -> Self {
        Self(None)
    }

    pub fn emit(&self, event: RelayEvent) {
        if let Some(tx) = &self.0 {
            if tx.send(event).is_err() {
                tracing::trace!("Event receiver dropped");
            }
        }
    }
}

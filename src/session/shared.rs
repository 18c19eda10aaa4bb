//! Session state visible to other sessions
//!
//! A publisher's media is fanned out by its own connection task, which has
//! to reach the players' outbound queues and role flags. That part of a
//! session lives here behind an `Arc`, registered in the
//! [`Registry`](crate::registry::Registry). Lock order is registry before
//! session, and a task never holds two session locks at once.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::info::{QueryArgs, StreamInfo};
use crate::events::{EventKind, EventSender, RelayEvent};
use crate::media::GopCache;
use crate::protocol::chunk::{ChunkEncoder, RtmpChunk};
use crate::protocol::constants::LEVEL_STATUS;
use crate::protocol::message::{Command, ControlMessage, UserControlEvent};

pub type SessionId = u64;

/// Writes queued for a connection's writer task
#[derive(Debug)]
pub enum Outgoing {
    Data(Bytes),
    Flush,
    Close,
}

/// Sending half of a connection's outbound queue
///
/// The queue is unbounded: a slow player accumulates bytes and never slows
/// the publisher. A passive outbound drops everything; it is used when the
/// peer is served by the ingest host.
#[derive(Debug, Clone)]
pub struct Outbound(Option<mpsc::UnboundedSender<Outgoing>>);

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<Outgoing>) -> Self {
        Self(Some(tx))
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn passive() -> Self {
        Self(None)
    }

    pub fn is_passive(&self) -> bool {
        self.0.is_none()
    }

    /// Queue bytes; a no-op once the writer is gone
    pub fn send(&self, data: Bytes) {
        self.push(Outgoing::Data(data));
    }

    pub fn flush(&self) {
        self.push(Outgoing::Flush);
    }

    pub fn close(&self) {
        self.push(Outgoing::Close);
    }

    fn push(&self, item: Outgoing) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(item);
        }
    }
}

/// Cached media a joining player receives before live data
#[derive(Debug, Default)]
pub struct MediaCache {
    /// Chunked `onMetaData`
    pub metadata: Option<Bytes>,
    /// Raw AAC sequence header tag
    pub aac_sequence_header: Option<Bytes>,
    /// Raw AVC/HEVC sequence header tag
    pub avc_sequence_header: Option<Bytes>,
    pub gop: Option<GopCache>,
    /// Timestamp of the last media message
    pub clock: u32,
}

/// Role flags and stream bookkeeping, guarded by the session mutex
#[derive(Debug)]
pub struct SharedState {
    /// Cleared once by `stop`
    pub alive: bool,
    pub publishing: bool,
    pub playing: bool,
    pub idling: bool,
    pub paused: bool,
    pub receive_audio: bool,
    pub receive_video: bool,

    pub publish_stream_id: u32,
    pub publish_path: String,
    pub publish_args: QueryArgs,
    pub play_stream_id: u32,
    pub play_path: String,
    pub play_args: QueryArgs,

    /// Sessions playing this session's stream
    pub players: BTreeSet<SessionId>,
    /// Writes since the last explicit flush
    pub play_cache: u32,
    pub media: MediaCache,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            alive: true,
            publishing: false,
            playing: false,
            idling: false,
            paused: false,
            receive_audio: true,
            receive_video: true,
            publish_stream_id: 0,
            publish_path: String::new(),
            publish_args: QueryArgs::new(),
            play_stream_id: 0,
            play_path: String::new(),
            play_args: QueryArgs::new(),
            players: BTreeSet::new(),
            play_cache: 0,
            media: MediaCache::default(),
        }
    }
}

impl SharedState {
    /// Publish path when publishing, otherwise the play path
    pub fn stream_path(&self) -> (&str, &QueryArgs) {
        if !self.publish_path.is_empty() {
            (&self.publish_path, &self.publish_args)
        } else {
            (&self.play_path, &self.play_args)
        }
    }
}

/// Writes between explicit flushes during fan-out
pub const PLAY_CACHE_BATCH: u32 = 10;

#[derive(Debug)]
pub struct SessionShared {
    id: SessionId,
    peer_addr: SocketAddr,
    local_port: u16,
    remote: bool,
    outbound: Outbound,
    events: EventSender,
    encoder: ChunkEncoder,
    state: Mutex<SharedState>,
}

impl SessionShared {
    pub fn new(
        id: SessionId,
        peer_addr: SocketAddr,
        local_port: u16,
        remote: bool,
        outbound: Outbound,
        events: EventSender,
        encoder: ChunkEncoder,
    ) -> Self {
        Self {
            id,
            peer_addr,
            local_port,
            remote,
            outbound,
            events,
            encoder,
            state: Mutex::new(SharedState::default()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }

    pub fn encoder(&self) -> &ChunkEncoder {
        &self.encoder
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    pub fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn send_bytes(&self, data: Bytes) {
        self.outbound.send(data);
    }

    pub fn send_chunk(&self, chunk: &RtmpChunk) {
        self.outbound.send(self.encoder.encode(chunk));
    }

    pub fn send_control(&self, message: ControlMessage) {
        self.send_chunk(&message.to_chunk());
    }

    pub fn send_command(&self, command: &Command) {
        self.send_chunk(&command.to_chunk());
    }

    pub fn send_status(&self, stream_id: u32, level: &str, code: &str, description: &str) {
        self.send_command(&Command::on_status(stream_id, level, code, description));
    }

    pub fn send_stream_status(&self, stream_id: u32, code: &str, description: &str) {
        self.send_status(stream_id, LEVEL_STATUS, code, description);
    }

    pub fn send_stream_begin(&self, stream_id: u32) {
        self.send_control(ControlMessage::UserControl(UserControlEvent::StreamBegin(stream_id)));
    }

    pub fn send_stream_eof(&self, stream_id: u32) {
        self.send_control(ControlMessage::UserControl(UserControlEvent::StreamEof(stream_id)));
    }

    pub fn stream_info(&self, state: &SharedState) -> StreamInfo {
        let (path, query) = state.stream_path();
        StreamInfo::new(self.id, path, query.clone(), self.peer_addr.ip(), self.local_port)
    }

    /// Emit for a path not yet committed to the state
    pub fn emit_for(&self, path: &str, query: &QueryArgs, kind: EventKind) {
        self.events.emit(RelayEvent {
            remote: self.remote,
            stream: StreamInfo::new(self.id, path, query.clone(), self.peer_addr.ip(), self.local_port),
            kind,
        });
    }

    pub fn emit(&self, state: &SharedState, kind: EventKind) {
        self.events.emit(RelayEvent {
            remote: self.remote,
            stream: self.stream_info(state),
            kind,
        });
    }
}

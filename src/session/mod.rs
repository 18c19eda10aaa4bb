//! Per-connection RTMP session
//!
//! A [`Session`] turns inbound bytes into protocol actions. Parsing and
//! dispatch are synchronous: [`Session::feed`] runs the handshake, decodes
//! every complete chunk message in the input and handles it before
//! returning. Replies and fan-out writes go to outbound queues drained by
//! the connection's writer task.
//!
//! ```text
//! bytes ─► Handshake ─► ChunkDecoder ─► dispatch ─┬─ control   (chunk size, ack, abort)
//!                                                 ├─ command   (connect, publish, play, ...)
//!                                                 ├─ data      (@setDataFrame)
//!                                                 └─ audio/video ─► players via Registry
//! ```

mod commands;
pub mod info;
mod media;
pub mod shared;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::events::{EventKind, EventSender};
use crate::protocol::chunk::{ChunkDecoder, ChunkEncoder, RtmpChunk};
use crate::protocol::constants::*;
use crate::protocol::handshake::Handshake;
use crate::protocol::message::{Command, ControlMessage, DataMessage, UserControlEvent};
use crate::registry::Registry;
use crate::server::config::ServerConfig;
use crate::error::Result;

pub use info::{AudioInfo, CodecInfo, QueryArgs, StreamInfo, VideoInfo};
pub use media::start_play;
pub use shared::{Outbound, Outgoing, SessionId, SessionShared, SharedState};
pub use state::SessionPhase;

pub struct Session {
    shared: Arc<SessionShared>,
    registry: Arc<Registry>,
    config: Arc<ServerConfig>,

    handshake: Handshake,
    decoder: ChunkDecoder,
    phase: SessionPhase,
    started_at: Instant,

    app: String,
    object_encoding: Option<f64>,
    /// Message stream ids handed out by createStream
    streams: u32,

    in_ack: u32,
    last_ack: u32,
    ack_size: u32,

    audio_codec: Option<u8>,
    video_codec: Option<u8>,
    audio: AudioInfo,
    video: VideoInfo,
}

impl Session {
    /// Create a session and register it
    ///
    /// `remote` marks a session mirrored to the ingest host; its outbound is
    /// normally passive.
    pub fn new(
        registry: Arc<Registry>,
        config: Arc<ServerConfig>,
        peer_addr: SocketAddr,
        local_port: u16,
        remote: bool,
        outbound: Outbound,
        events: EventSender,
    ) -> Self {
        let shared = Arc::new(SessionShared::new(
            registry.next_session_id(),
            peer_addr,
            local_port,
            remote,
            outbound,
            events,
            ChunkEncoder::new(config.chunk_size),
        ));
        registry.register_session(shared.clone());

        Self {
            shared,
            registry,
            config,
            handshake: Handshake::new(),
            decoder: ChunkDecoder::new(),
            phase: SessionPhase::Handshaking,
            started_at: Instant::now(),
            app: String::new(),
            object_encoding: None,
            streams: 0,
            in_ack: 0,
            last_ack: 0,
            ack_size: 0,
            audio_codec: None,
            video_codec: None,
            audio: AudioInfo::default(),
            video: VideoInfo::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.shared.id()
    }

    pub fn shared(&self) -> &Arc<SessionShared> {
        &self.shared
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn audio_info(&self) -> &AudioInfo {
        &self.audio
    }

    pub fn video_info(&self) -> &VideoInfo {
        &self.video
    }

    pub fn stream_info(&self) -> StreamInfo {
        self.shared.stream_info(&self.shared.lock())
    }

    /// Process bytes received from the peer
    ///
    /// Returns an error only for chunk stream violations, after which the
    /// caller must stop the session.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        if self.phase.is_closed() {
            return Ok(());
        }

        self.acknowledge(data.len());

        let mut buf = data;
        if !self.handshake.is_done() {
            if let Some(reply) = self.handshake.process(&mut buf) {
                self.shared.send_bytes(reply);
            }
            if !self.handshake.is_done() {
                return Ok(());
            }
            tracing::debug!(
                session_id = self.id(),
                version = self.handshake.client_version(),
                "Handshake complete"
            );
            self.phase = SessionPhase::WaitingConnect;
        }

        if buf.is_empty() {
            return Ok(());
        }

        while let Some(message) = self.decoder.decode(&mut buf)? {
            self.dispatch(message)?;
            if self.phase.is_closed() {
                break;
            }
        }
        Ok(())
    }

    fn acknowledge(&mut self, len: usize) {
        self.in_ack = self.in_ack.saturating_add(len.min(u32::MAX as usize) as u32);
        if self.in_ack >= ACK_COUNTER_RESET {
            self.in_ack = 0;
            self.last_ack = 0;
        }
        if self.ack_size > 0 && self.in_ack - self.last_ack >= self.ack_size {
            self.last_ack = self.in_ack;
            self.shared
                .send_control(ControlMessage::Acknowledgement(self.in_ack));
        }
    }

    fn dispatch(&mut self, message: RtmpChunk) -> Result<()> {
        tracing::trace!(
            session_id = self.id(),
            csid = message.csid,
            message_type = message.message_type,
            len = message.payload.len(),
            "Message"
        );

        match message.message_type {
            MSG_SET_CHUNK_SIZE | MSG_ABORT | MSG_ACKNOWLEDGEMENT | MSG_WINDOW_ACK_SIZE
            | MSG_SET_PEER_BANDWIDTH | MSG_USER_CONTROL => self.handle_control(&message)?,
            MSG_AUDIO => self.handle_audio(&message),
            MSG_VIDEO => self.handle_video(&message),
            MSG_FLEX_MESSAGE | MSG_COMMAND => self.handle_invoke(&message),
            MSG_FLEX_STREAM | MSG_DATA => self.handle_data(&message),
            _ => {}
        }
        Ok(())
    }

    fn handle_control(&mut self, message: &RtmpChunk) -> Result<()> {
        let Some(control) = ControlMessage::decode(message.message_type, &message.payload) else {
            tracing::debug!(
                session_id = self.id(),
                message_type = message.message_type,
                "Short control message"
            );
            return Ok(());
        };

        match control {
            ControlMessage::SetChunkSize(size) => {
                self.decoder.set_chunk_size(size)?;
                tracing::debug!(session_id = self.id(), size = size, "Peer chunk size");
            }
            ControlMessage::Abort(csid) => self.decoder.abort(csid),
            ControlMessage::WindowAckSize(size) => self.ack_size = size,
            ControlMessage::UserControl(UserControlEvent::PingResponse(_)) => {}
            other => {
                tracing::trace!(session_id = self.id(), message = ?other, "Control message");
            }
        }
        Ok(())
    }

    fn handle_invoke(&mut self, message: &RtmpChunk) {
        let command = match Command::decode(message.message_type, &message.payload, message.stream_id) {
            Ok(command) => command,
            Err(e) => {
                self.drop_malformed("command", e.to_string());
                return;
            }
        };

        tracing::debug!(
            session_id = self.id(),
            command = %command.name,
            stream_id = command.stream_id,
            "Command"
        );

        match command.name.as_str() {
            CMD_CONNECT => self.on_connect(&command),
            CMD_CREATE_STREAM => self.on_create_stream(&command),
            CMD_PUBLISH => self.on_publish(&command),
            CMD_PLAY => self.on_play(&command),
            CMD_PAUSE => self.on_pause(&command),
            CMD_RECEIVE_AUDIO => self.on_receive_audio(&command),
            CMD_RECEIVE_VIDEO => self.on_receive_video(&command),
            CMD_DELETE_STREAM => self.on_delete_stream(&command),
            CMD_CLOSE_STREAM => self.on_close_stream(&command),
            // Accepted without a reply
            CMD_RELEASE_STREAM | CMD_FC_PUBLISH | CMD_FC_UNPUBLISH => {}
            other => {
                tracing::debug!(session_id = self.id(), command = %other, "Unhandled command");
            }
        }
    }

    fn handle_data(&mut self, message: &RtmpChunk) {
        let data = match DataMessage::decode(message.message_type, &message.payload, message.stream_id) {
            Ok(data) => data,
            Err(e) => {
                self.drop_malformed("data", e.to_string());
                return;
            }
        };

        if data.name == DATA_SET_DATA_FRAME {
            self.on_set_data_frame(&data);
        } else {
            tracing::debug!(session_id = self.id(), name = %data.name, "Unhandled data message");
        }
    }

    fn drop_malformed(&self, kind: &str, reason: String) {
        tracing::warn!(session_id = self.id(), kind = kind, error = %reason, "Dropping malformed message");
        let state = self.shared.lock();
        self.shared.emit(&state, EventKind::Error(reason));
    }

    /// Send a ping request carrying milliseconds since the session started
    pub fn send_ping(&self) {
        if !self.phase.is_connected() {
            return;
        }
        let elapsed = self.started_at.elapsed().as_millis() as u32;
        self.shared
            .send_control(ControlMessage::UserControl(UserControlEvent::PingRequest(elapsed)));
    }

    /// Tear the session down
    ///
    /// Only the first call has any effect. Streams are deleted without
    /// status replies, the session leaves the registry and the writer is
    /// told to close.
    pub fn stop(&mut self) {
        let (play_stream_id, publish_stream_id) = {
            let mut state = self.shared.lock();
            if !state.alive {
                return;
            }
            state.alive = false;
            (state.play_stream_id, state.publish_stream_id)
        };
        let was_connected = self.phase.is_connected();
        self.phase = SessionPhase::Closed;

        if play_stream_id > 0 {
            self.delete_stream(play_stream_id);
        }
        if publish_stream_id > 0 {
            self.delete_stream(publish_stream_id);
        }

        if was_connected {
            let state = self.shared.lock();
            self.shared.emit(&state, EventKind::DoneConnect);
        }

        self.registry.unregister_session(self.id());
        self.shared.outbound().close();
        tracing::debug!(session_id = self.id(), "Session stopped");
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

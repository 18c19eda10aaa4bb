//! NetConnection and NetStream command handlers

use std::mem;

use super::info::split_stream_name;
use super::media::start_play;
use super::{Session, SessionPhase};
use crate::amf::AmfValue;
use crate::events::EventKind;
use crate::protocol::chunk::RtmpChunk;
use crate::protocol::constants::*;
use crate::protocol::message::{Command, ControlMessage, DataMessage};

impl Session {
    pub(super) fn on_connect(&mut self, command: &Command) {
        if self.phase != SessionPhase::WaitingConnect {
            tracing::debug!(session_id = self.id(), "Duplicate connect ignored");
            return;
        }

        let object = &command.command_object;
        self.app = object.get_string("app").unwrap_or_default().to_string();
        self.object_encoding = object.get_number("objectEncoding");
        self.phase = SessionPhase::Connected;

        let shared = &self.shared;
        shared.send_control(ControlMessage::WindowAckSize(self.config.window_ack_size));
        shared.send_control(ControlMessage::SetPeerBandwidth {
            size: self.config.peer_bandwidth,
            limit_type: BANDWIDTH_LIMIT_DYNAMIC,
        });
        shared.send_control(ControlMessage::SetChunkSize(shared.encoder().chunk_size()));
        shared.send_command(&Command::result(
            command.transaction_id,
            AmfValue::object([
                ("fmsVer", AmfValue::from(FMS_VERSION)),
                ("capabilities", AmfValue::from(FMS_CAPABILITIES)),
            ]),
            AmfValue::object([
                ("level", AmfValue::from(LEVEL_STATUS)),
                ("code", AmfValue::from(NC_CONNECT_SUCCESS)),
                ("description", AmfValue::from("Connection succeeded.")),
                ("objectEncoding", AmfValue::from(self.object_encoding.unwrap_or(0.0))),
            ]),
        ));

        tracing::info!(
            session_id = self.id(),
            peer = %shared.peer_addr(),
            app = %self.app,
            "Client connected"
        );
        let state = shared.lock();
        shared.emit(
            &state,
            EventKind::Connect {
                app: self.app.clone(),
                args: object.clone(),
            },
        );
    }

    pub(super) fn on_create_stream(&mut self, command: &Command) {
        self.streams += 1;
        self.shared.send_command(&Command::result(
            command.transaction_id,
            AmfValue::Null,
            AmfValue::from(self.streams),
        ));
    }

    pub(super) fn on_publish(&mut self, command: &Command) {
        if !self.phase.is_connected() {
            return;
        }
        let Some(name) = command.arg_str(0) else {
            return;
        };
        let stream_id = command.stream_id;
        let (stream_name, args) = split_stream_name(name);
        let path = format!("/{}/{}", self.app, stream_name);
        let shared = self.shared.clone();

        shared.emit_for(&path, &args, EventKind::PrePublish);

        if !self.config.push_allow.check(shared.peer_addr().ip()) {
            tracing::warn!(session_id = self.id(), path = %path, peer = %shared.peer_addr(), "Publish rejected");
            shared.send_status(
                stream_id,
                LEVEL_ERROR,
                NS_PUBLISH_UNAUTHORIZED,
                "Authorization required.",
            );
            return;
        }

        if self.registry.has_publisher(&path) {
            tracing::warn!(session_id = self.id(), path = %path, "Publish rejected: path taken");
            shared.send_status(
                stream_id,
                LEVEL_ERROR,
                NS_PUBLISH_BAD_NAME,
                "Stream already publishing",
            );
            return;
        }

        if shared.lock().publishing {
            shared.send_status(
                stream_id,
                LEVEL_ERROR,
                NS_PUBLISH_BAD_CONNECTION,
                "Connection already publishing",
            );
            return;
        }

        if let Err(e) = self.registry.register_publisher(&path, self.id()) {
            tracing::warn!(session_id = self.id(), error = %e, "Publish rejected");
            shared.send_status(
                stream_id,
                LEVEL_ERROR,
                NS_PUBLISH_BAD_NAME,
                "Stream already publishing",
            );
            return;
        }

        {
            let mut state = shared.lock();
            state.publishing = true;
            state.publish_stream_id = stream_id;
            state.publish_path = path.clone();
            state.publish_args = args;
        }
        shared.send_stream_status(stream_id, NS_PUBLISH_START, &format!("{} is now published.", path));

        for player in self.registry.idle_players() {
            let waiting = {
                let state = player.lock();
                state.idling && state.play_path == path
            };
            // Whoever removes the idle entry starts playback
            if waiting && self.registry.remove_idle(player.id()) {
                start_play(&self.registry, &player, &shared);
            }
        }

        tracing::info!(session_id = self.id(), path = %path, "Publish started");
        let state = shared.lock();
        shared.emit(&state, EventKind::Publish);
    }

    pub(super) fn on_play(&mut self, command: &Command) {
        if !self.phase.is_connected() {
            return;
        }
        let Some(name) = command.arg_str(0) else {
            return;
        };
        let stream_id = command.stream_id;
        let (stream_name, args) = split_stream_name(name);
        let path = format!("/{}/{}", self.app, stream_name);
        let shared = self.shared.clone();

        shared.emit_for(&path, &args, EventKind::PrePlay);

        if !self.config.pull_allow.check(shared.peer_addr().ip()) {
            tracing::warn!(session_id = self.id(), path = %path, peer = %shared.peer_addr(), "Play rejected");
            shared.send_status(stream_id, LEVEL_ERROR, NS_PLAY_UNAUTHORIZED, "Authorization required.");
            return;
        }

        {
            let mut state = shared.lock();
            if state.playing || state.idling {
                drop(state);
                shared.send_status(
                    stream_id,
                    LEVEL_ERROR,
                    NS_PLAY_BAD_CONNECTION,
                    "Connection already playing",
                );
                return;
            }
            state.play_stream_id = stream_id;
            state.play_path = path.clone();
            state.play_args = args;
            state.idling = true;
        }

        shared.send_stream_begin(stream_id);
        shared.send_stream_status(stream_id, NS_PLAY_RESET, "Playing and resetting stream.");
        shared.send_stream_status(stream_id, NS_PLAY_START, "Started playing stream.");
        let mut sample_access = DataMessage::sample_access();
        sample_access.stream_id = stream_id;
        shared.send_chunk(&sample_access.to_chunk());

        // Wait in the idle set first so a concurrent publish cannot be missed
        self.registry.add_idle(self.id());
        match self.registry.publisher(&path) {
            Some(publisher) => {
                if self.registry.remove_idle(self.id()) {
                    start_play(&self.registry, &shared, &publisher);
                }
            }
            None => {
                tracing::info!(session_id = self.id(), path = %path, "Waiting for publisher");
            }
        }
    }

    pub(super) fn on_pause(&mut self, command: &Command) {
        let pause = command.arg_bool(0).unwrap_or(false);
        let shared = self.shared.clone();
        let (stream_id, path) = {
            let mut state = shared.lock();
            if state.play_stream_id == 0 {
                return;
            }
            state.paused = pause;
            (state.play_stream_id, state.play_path.clone())
        };

        if pause {
            shared.send_stream_eof(stream_id);
            shared.send_stream_status(stream_id, NS_PAUSE_NOTIFY, "Paused live");
        } else {
            shared.send_stream_begin(stream_id);
            if let Some(publisher) = self.registry.publisher(&path) {
                let (clock, audio, video) = {
                    let state = publisher.lock();
                    (
                        state.media.clock,
                        state.media.aac_sequence_header.clone(),
                        state.media.avc_sequence_header.clone(),
                    )
                };
                if let Some(payload) = audio {
                    let chunk = RtmpChunk::new(CSID_AUDIO, MSG_AUDIO, stream_id, payload);
                    shared.send_chunk(&chunk.with_timestamp(clock));
                }
                if let Some(payload) = video {
                    let chunk = RtmpChunk::new(CSID_VIDEO, MSG_VIDEO, stream_id, payload);
                    shared.send_chunk(&chunk.with_timestamp(clock));
                }
            }
            shared.send_stream_status(stream_id, NS_UNPAUSE_NOTIFY, "Unpaused live");
        }
        tracing::debug!(session_id = self.id(), path = %path, paused = pause, "Pause");
    }

    pub(super) fn on_receive_audio(&mut self, command: &Command) {
        let receive = command.arg_bool(0).unwrap_or(true);
        self.shared.lock().receive_audio = receive;
        tracing::debug!(session_id = self.id(), receive_audio = receive, "receiveAudio");
    }

    pub(super) fn on_receive_video(&mut self, command: &Command) {
        let receive = command.arg_bool(0).unwrap_or(true);
        self.shared.lock().receive_video = receive;
        tracing::debug!(session_id = self.id(), receive_video = receive, "receiveVideo");
    }

    pub(super) fn on_delete_stream(&mut self, command: &Command) {
        let stream_id = command.arg_number(0).unwrap_or(0.0) as u32;
        self.delete_stream(stream_id);
    }

    pub(super) fn on_close_stream(&mut self, command: &Command) {
        self.delete_stream(command.stream_id);
    }

    /// Close the play or publish stream with this message stream id
    pub(super) fn delete_stream(&mut self, stream_id: u32) {
        if stream_id == 0 {
            return;
        }
        let (play, publish) = {
            let state = self.shared.lock();
            (
                state.play_stream_id == stream_id,
                state.publish_stream_id == stream_id,
            )
        };
        if play {
            self.close_play();
        }
        if publish {
            self.close_publish();
        }
    }

    fn close_play(&mut self) {
        let shared = self.shared.clone();
        let (idling, path, stream_id, alive) = {
            let state = shared.lock();
            (state.idling, state.play_path.clone(), state.play_stream_id, state.alive)
        };

        if idling {
            self.registry.remove_idle(self.id());
        } else {
            if let Some(publisher) = self.registry.publisher(&path) {
                publisher.lock().players.remove(&self.id());
            }
            let state = shared.lock();
            shared.emit(&state, EventKind::DonePlay);
        }
        tracing::info!(session_id = self.id(), path = %path, "Play stopped");

        if alive {
            shared.send_stream_status(stream_id, NS_PLAY_STOP, "Stopped playing stream.");
        }

        let mut state = shared.lock();
        state.idling = false;
        state.playing = false;
        state.paused = false;
        state.play_stream_id = 0;
        state.play_path.clear();
        state.play_args.clear();
    }

    fn close_publish(&mut self) {
        let shared = self.shared.clone();
        let (path, stream_id, alive, players) = {
            let mut state = shared.lock();
            if !state.publishing {
                state.publish_stream_id = 0;
                state.publish_path.clear();
                state.publish_args.clear();
                return;
            }
            shared.emit(&state, EventKind::DonePublish);
            state.publishing = false;
            if let Some(gop) = state.media.gop.as_mut() {
                gop.clear();
            }
            (
                state.publish_path.clone(),
                state.publish_stream_id,
                state.alive,
                mem::take(&mut state.players),
            )
        };

        if alive {
            shared.send_stream_status(stream_id, NS_UNPUBLISH_SUCCESS, &format!("{} is now unpublished.", path));
        }

        // Players go back to waiting for the next publisher on this path
        for player in self.registry.sessions(players.iter()) {
            let play_stream_id = {
                let mut state = player.lock();
                if !state.alive {
                    continue;
                }
                state.playing = false;
                state.idling = true;
                state.play_stream_id
            };
            player.send_stream_status(play_stream_id, NS_PLAY_UNPUBLISH_NOTIFY, "stream is now unpublished.");
            player.send_stream_eof(play_stream_id);
            player.outbound().flush();
            self.registry.add_idle(player.id());
        }

        if let Err(e) = self.registry.unregister_publisher(&path, self.id()) {
            tracing::warn!(session_id = self.id(), path = %path, error = %e, "Unpublish");
        }
        tracing::info!(session_id = self.id(), path = %path, players = players.len(), "Publish stopped");

        let mut state = shared.lock();
        state.publish_stream_id = 0;
        state.publish_path.clear();
        state.publish_args.clear();
    }
}

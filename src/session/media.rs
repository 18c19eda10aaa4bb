//! Publisher media handling and fan-out to players

use std::sync::Arc;

use bytes::Bytes;

use super::info::CodecInfo;
use super::shared::{SessionShared, PLAY_CACHE_BATCH};
use super::{Session, SessionId};
use crate::events::EventKind;
use crate::media::codec::{audio_codec_name, video_codec_name, SOUND_FORMAT_AAC, VIDEO_CODEC_AVC};
use crate::media::{h264, hevc, AudioSpecificConfig, AudioTagHeader, GopCache, VideoTagHeader};
use crate::protocol::chunk::{with_stream_id, RtmpChunk};
use crate::protocol::constants::*;
use crate::protocol::message::DataMessage;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Audio,
    Video,
    Data,
}

impl Session {
    pub(super) fn handle_audio(&mut self, message: &RtmpChunk) {
        let payload = &message.payload;
        let Some(&first) = payload.first() else {
            return;
        };
        let header = AudioTagHeader::parse(first);
        let shared = self.shared.clone();

        if self.audio_codec.is_none() {
            self.audio_codec = Some(header.sound_format);
            self.audio.codec_name = audio_codec_name(header.sound_format).to_string();
            self.audio.samplerate = header.sample_rate();
            self.audio.channels = header.channels();
            let state = shared.lock();
            shared.emit(&state, EventKind::AudioCodec(self.audio.clone()));
        }

        let is_sequence_header = header.sound_format == SOUND_FORMAT_AAC && payload.get(1) == Some(&0);
        if is_sequence_header {
            match AudioSpecificConfig::from_tag(payload) {
                Ok(config) => {
                    self.audio.profile_name = config.profile_name().to_string();
                    self.audio.samplerate = config.sampling_frequency;
                    self.audio.channels = config.channels();
                }
                Err(e) => {
                    tracing::warn!(session_id = self.id(), error = %e, "Bad AAC sequence header");
                }
            }
            tracing::debug!(
                session_id = self.id(),
                profile = %self.audio.profile_name,
                samplerate = self.audio.samplerate,
                channels = self.audio.channels,
                "AAC sequence header"
            );
        }

        let chunks = self.media_chunks(CSID_AUDIO, MSG_AUDIO, message);
        let players = {
            let mut state = shared.lock();
            state.media.clock = message.timestamp;
            if is_sequence_header {
                state.media.aac_sequence_header = Some(payload.clone());
                shared.emit(&state, EventKind::AudioCodec(self.audio.clone()));
            } else if let Some(gop) = state.media.gop.as_mut() {
                gop.push(chunks.clone());
            }
            state.players.iter().copied().collect::<Vec<_>>()
        };
        fan_out(&self.registry, &players, &chunks, MediaKind::Audio);
    }

    pub(super) fn handle_video(&mut self, message: &RtmpChunk) {
        let payload = &message.payload;
        let Some(&first) = payload.first() else {
            return;
        };
        let header = VideoTagHeader::parse(first);
        let shared = self.shared.clone();
        let packet_type = payload.get(1).copied();

        let is_sequence_header = header.is_avc_family() && header.is_keyframe() && packet_type == Some(0);
        if is_sequence_header {
            let described = if header.codec_id == VIDEO_CODEC_AVC {
                h264::describe_sequence_header(payload)
            } else {
                hevc::describe_sequence_header(payload)
            };
            match described {
                Ok(descriptor) => {
                    self.video.profile_name = descriptor.profile_name.to_string();
                    self.video.level = descriptor.level;
                    if descriptor.width > 0 && descriptor.height > 0 {
                        self.video.width = descriptor.width;
                        self.video.height = descriptor.height;
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = self.id(), error = %e, "Bad video sequence header");
                }
            }
            tracing::debug!(
                session_id = self.id(),
                profile = %self.video.profile_name,
                level = self.video.level,
                width = self.video.width,
                height = self.video.height,
                "Video sequence header"
            );

            let mut state = shared.lock();
            state.media.avc_sequence_header = Some(payload.clone());
            state.media.gop = self
                .config
                .gop_cache
                .then(|| GopCache::with_max_size(self.config.gop_cache_max_size));
            shared.emit(&state, EventKind::VideoCodec(self.video.clone()));
        }

        if self.video_codec.is_none() {
            self.video_codec = Some(header.codec_id);
            self.video.codec_name = video_codec_name(header.codec_id).to_string();
            let state = shared.lock();
            shared.emit(&state, EventKind::VideoCodec(self.video.clone()));
            shared.emit(
                &state,
                EventKind::Codec(CodecInfo {
                    audio: self.audio.clone(),
                    video: self.video.clone(),
                }),
            );
        }

        let chunks = self.media_chunks(CSID_VIDEO, MSG_VIDEO, message);
        let players = {
            let mut state = shared.lock();
            state.media.clock = message.timestamp;
            if header.is_avc_family() {
                if let Some(gop) = state.media.gop.as_mut() {
                    if header.is_keyframe() && packet_type == Some(1) {
                        gop.restart();
                    }
                    if !is_sequence_header {
                        gop.push(chunks.clone());
                    }
                }
            }
            state.players.iter().copied().collect::<Vec<_>>()
        };
        fan_out(&self.registry, &players, &chunks, MediaKind::Video);
    }

    /// `@setDataFrame`: update descriptors and forward as `onMetaData`
    pub(super) fn on_set_data_frame(&mut self, data: &DataMessage) {
        let object = data.data_object().cloned();
        if let Some(object) = &object {
            if let Some(rate) = object.get_number("audiosamplerate") {
                self.audio.samplerate = rate as u32;
            }
            self.audio.channels = match object.get("stereo") {
                Some(stereo) if stereo.is_truthy() => 2,
                _ => 1,
            };
            if let Some(width) = object.get_number("width") {
                self.video.width = width as u32;
            }
            if let Some(height) = object.get_number("height") {
                self.video.height = height as u32;
            }
            if let Some(fps) = object.get_number("framerate") {
                self.video.fps = fps;
            }
        }

        let mut metadata = DataMessage::metadata(object);
        metadata.stream_id = data.stream_id;
        let chunks = self.shared.encoder().encode(&metadata.to_chunk());
        let players = {
            let mut state = self.shared.lock();
            state.media.metadata = Some(chunks.clone());
            state.players.iter().copied().collect::<Vec<_>>()
        };
        tracing::debug!(session_id = self.id(), players = players.len(), "Metadata updated");
        fan_out(&self.registry, &players, &chunks, MediaKind::Data);
    }

    fn media_chunks(&self, csid: u32, message_type: u8, message: &RtmpChunk) -> Bytes {
        let chunk = RtmpChunk::new(csid, message_type, message.stream_id, message.payload.clone())
            .with_timestamp(message.timestamp);
        self.shared.encoder().encode(&chunk)
    }
}

/// Write pre-chunked media to every eligible player
///
/// Each player gets its own play stream id patched in. Every
/// [`PLAY_CACHE_BATCH`] writes the player's queue is flushed.
fn fan_out(registry: &Registry, players: &[SessionId], chunks: &Bytes, kind: MediaKind) {
    for player in registry.sessions(players.iter()) {
        let mut state = player.lock();
        if !state.alive || !state.playing || state.paused {
            continue;
        }
        let wanted = match kind {
            MediaKind::Audio => state.receive_audio,
            MediaKind::Video => state.receive_video,
            MediaKind::Data => true,
        };
        if wanted {
            player.send_bytes(with_stream_id(chunks, state.play_stream_id));
        }
        if kind != MediaKind::Data {
            state.play_cache += 1;
            if state.play_cache >= PLAY_CACHE_BATCH {
                state.play_cache = 0;
                player.outbound().flush();
            }
        }
    }
}

/// Attach `player` to `publisher` and send it the cached stream start
///
/// Sends metadata, the AAC and AVC sequence headers, then the GOP cache.
/// The cache is written while the publisher is locked, so no live frame
/// can overtake it. If the publisher is already going away the player goes
/// back to the idle set.
pub fn start_play(registry: &Registry, player: &Arc<SessionShared>, publisher: &Arc<SessionShared>) {
    let stream_id = {
        let mut state = player.lock();
        if !state.alive {
            return;
        }
        state.idling = false;
        state.playing = true;
        state.play_stream_id
    };

    let attached = {
        let mut state = publisher.lock();
        if state.publishing {
            let media = &state.media;
            if let Some(metadata) = &media.metadata {
                player.send_bytes(with_stream_id(metadata, stream_id));
            }
            if let Some(payload) = &media.aac_sequence_header {
                player.send_chunk(&RtmpChunk::new(CSID_AUDIO, MSG_AUDIO, stream_id, payload.clone()));
            }
            if let Some(payload) = &media.avc_sequence_header {
                player.send_chunk(&RtmpChunk::new(CSID_VIDEO, MSG_VIDEO, stream_id, payload.clone()));
            }
            if let Some(gop) = &media.gop {
                for chunks in gop.iter() {
                    player.send_bytes(with_stream_id(chunks, stream_id));
                }
            }
            state.players.insert(player.id());
            true
        } else {
            false
        }
    };

    let state = {
        let mut state = player.lock();
        if !attached {
            state.playing = false;
            state.idling = true;
        }
        state
    };
    if !attached {
        drop(state);
        registry.add_idle(player.id());
        return;
    }

    player.outbound().flush();
    tracing::info!(
        session_id = player.id(),
        publisher = publisher.id(),
        path = %state.play_path,
        "Play started"
    );
    player.emit(&state, EventKind::Play);
}

//! RTMP chunk stream
//!
//! Messages are split into chunks of at most `chunk_size` payload bytes and
//! interleaved across chunk stream ids (csid). Each chunk starts with a basic
//! header (format + csid) followed by a message header whose size depends on
//! the format:
//!
//! ```text
//! fmt 0: timestamp(3) length(3) type(1) stream_id(4, little-endian)
//! fmt 1: delta(3)     length(3) type(1)
//! fmt 2: delta(3)
//! fmt 3: (nothing, everything inherited)
//! ```
//!
//! A 24-bit timestamp of 0xFFFFFF means a 4-byte extended timestamp follows.
//!
//! [`ChunkDecoder`] is resumable: it can be fed arbitrary slices and keeps
//! partial headers and payloads between calls. Each chunk stream id keeps its
//! last header so later formats can inherit the fields they omit.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::HashMap;

use crate::error::{ProtocolError, Result};
use crate::protocol::constants::*;

/// A complete RTMP message
#[derive(Debug, Clone, PartialEq)]
pub struct RtmpChunk {
    /// Chunk stream id the message travelled on
    pub csid: u32,
    /// Absolute timestamp (the accumulated clock on the receive side)
    pub timestamp: u32,
    pub message_type: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl RtmpChunk {
    pub fn new(csid: u32, message_type: u8, stream_id: u32, payload: Bytes) -> Self {
        Self {
            csid,
            timestamp: 0,
            message_type,
            stream_id,
            payload,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Last seen header for a chunk stream id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkHeader {
    pub fmt: u8,
    pub csid: u32,
    /// Raw timestamp or delta field (0xFFFFFF when extended)
    pub timestamp: u32,
    pub length: u32,
    pub message_type: u8,
    pub stream_id: u32,
}

/// Per-csid reassembly state
#[derive(Debug, Default)]
struct ChunkPacket {
    header: ChunkHeader,
    clock: u32,
    payload: Vec<u8>,
    received: usize,
}

impl ChunkPacket {
    fn length(&self) -> usize {
        self.header.length as usize
    }

    /// Grow the buffer if this message does not fit. Never shrinks.
    fn reserve(&mut self) {
        let length = self.length();
        if self.payload.len() < length {
            self.payload = vec![0u8; length + PACKET_SLACK];
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    Init,
    BasicHeader,
    MessageHeader,
    ExtendedTimestamp,
    Payload,
}

/// Incremental chunk parser
#[derive(Debug)]
pub struct ChunkDecoder {
    state: ParseState,
    header: [u8; MAX_CHUNK_HEADER],
    header_len: usize,
    basic_len: usize,
    csid: u32,
    packets: HashMap<u32, ChunkPacket>,
    chunk_size: u32,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            state: ParseState::Init,
            header: [0u8; MAX_CHUNK_HEADER],
            header_len: 0,
            basic_len: 0,
            csid: 0,
            packets: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Apply a peer SetChunkSize
    pub fn set_chunk_size(&mut self, size: u32) -> Result<()> {
        let size = size & MAX_CHUNK_SIZE;
        if size == 0 {
            return Err(ProtocolError::InvalidChunkSize(size).into());
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Drop a partially received message (Abort message)
    pub fn abort(&mut self, csid: u32) {
        if let Some(packet) = self.packets.get_mut(&csid) {
            packet.received = 0;
        }
    }

    /// Consume bytes from `buf` until one message completes.
    ///
    /// Returns `Ok(None)` once `buf` is exhausted without completing a
    /// message; partial state is kept for the next call. A message type
    /// above [`MSG_TYPE_MAX`] is a protocol error.
    pub fn decode<B: Buf>(&mut self, buf: &mut B) -> Result<Option<RtmpChunk>> {
        loop {
            match self.state {
                ParseState::Init => {
                    if !buf.has_remaining() {
                        return Ok(None);
                    }
                    let first = buf.get_u8();
                    self.header[0] = first;
                    self.header_len = 1;
                    self.basic_len = match first & 0x3F {
                        0 => 2,
                        1 => 3,
                        _ => 1,
                    };
                    self.state = ParseState::BasicHeader;
                }
                ParseState::BasicHeader => {
                    if !self.fill(buf, self.basic_len) {
                        return Ok(None);
                    }
                    self.csid = match self.basic_len {
                        2 => 64 + u32::from(self.header[1]),
                        3 => 64 + u32::from(self.header[1]) + (u32::from(self.header[2]) << 8),
                        _ => u32::from(self.header[0] & 0x3F),
                    };
                    self.state = ParseState::MessageHeader;
                }
                ParseState::MessageHeader => {
                    let fmt = self.header[0] >> 6;
                    let size = self.basic_len + MESSAGE_HEADER_SIZE[fmt as usize];
                    if !self.fill(buf, size) {
                        return Ok(None);
                    }
                    self.apply_message_header(fmt)?;
                    self.state = ParseState::ExtendedTimestamp;
                }
                ParseState::ExtendedTimestamp => {
                    let fmt = self.header[0] >> 6;
                    let mut size = self.basic_len + MESSAGE_HEADER_SIZE[fmt as usize];
                    let extended = self
                        .packets
                        .get(&self.csid)
                        .map_or(false, |p| p.header.timestamp == EXTENDED_TIMESTAMP);
                    if extended {
                        size += 4;
                    }
                    if !self.fill(buf, size) {
                        return Ok(None);
                    }

                    let header = self.header;
                    let packet = self.current_mut();
                    let timestamp = if extended {
                        let at = size - 4;
                        u32::from_be_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
                    } else {
                        packet.header.timestamp
                    };

                    // Continuation chunks repeat the extended field but do
                    // not move the clock
                    if packet.received == 0 {
                        if fmt == CHUNK_FMT_0 {
                            packet.clock = timestamp;
                        } else {
                            packet.clock = packet.clock.wrapping_add(timestamp);
                        }
                        packet.reserve();
                    }
                    self.state = ParseState::Payload;
                }
                ParseState::Payload => {
                    let chunk_size = self.chunk_size as usize;
                    let packet = self.current_mut();
                    let length = packet.length();
                    let n = (chunk_size - packet.received % chunk_size)
                        .min(length - packet.received)
                        .min(buf.remaining());

                    if n == 0 && packet.received < length {
                        return Ok(None);
                    }
                    let start = packet.received;
                    buf.copy_to_slice(&mut packet.payload[start..start + n]);
                    packet.received += n;

                    if packet.received >= length {
                        packet.received = 0;
                        let message = RtmpChunk {
                            csid: packet.header.csid,
                            timestamp: packet.clock,
                            message_type: packet.header.message_type,
                            stream_id: packet.header.stream_id,
                            payload: Bytes::copy_from_slice(&packet.payload[..length]),
                        };
                        self.state = ParseState::Init;
                        return Ok(Some(message));
                    }
                    if packet.received % chunk_size == 0 {
                        self.state = ParseState::Init;
                    }
                }
            }
        }
    }

    /// Copy header bytes until `size` are buffered. True when complete.
    fn fill<B: Buf>(&mut self, buf: &mut B, size: usize) -> bool {
        let n = size.saturating_sub(self.header_len).min(buf.remaining());
        buf.copy_to_slice(&mut self.header[self.header_len..self.header_len + n]);
        self.header_len += n;
        self.header_len >= size
    }

    /// Overlay the fields present for `fmt` onto the csid's last header
    fn apply_message_header(&mut self, fmt: u8) -> Result<()> {
        let h = self.header;
        let at = self.basic_len;
        let csid = self.csid;
        let packet = self.packets.entry(csid).or_default();

        packet.header.fmt = fmt;
        packet.header.csid = csid;
        if fmt <= CHUNK_FMT_1 {
            // A new length mid-message abandons the partial payload
            packet.received = 0;
        }
        if fmt <= CHUNK_FMT_2 {
            packet.header.timestamp = read_u24(&h[at..]);
        }
        if fmt <= CHUNK_FMT_1 {
            packet.header.length = read_u24(&h[at + 3..]);
            packet.header.message_type = h[at + 6];
        }
        if fmt == CHUNK_FMT_0 {
            packet.header.stream_id = u32::from_le_bytes([h[at + 7], h[at + 8], h[at + 9], h[at + 10]]);
        }

        if packet.header.message_type > MSG_TYPE_MAX {
            return Err(ProtocolError::InvalidMessageType(packet.header.message_type).into());
        }
        Ok(())
    }

    fn current_mut(&mut self) -> &mut ChunkPacket {
        self.packets.entry(self.csid).or_default()
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u24(b: &[u8]) -> u32 {
    (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2])
}

/// Basic header length for a chunk stream id
pub fn basic_header_len(csid: u32) -> usize {
    if csid >= 64 + 256 {
        3
    } else if csid >= 64 {
        2
    } else {
        1
    }
}

fn put_basic_header(out: &mut BytesMut, fmt: u8, csid: u32) {
    match basic_header_len(csid) {
        1 => out.put_u8((fmt << 6) | csid as u8),
        2 => {
            out.put_u8(fmt << 6);
            out.put_u8((csid - 64) as u8);
        }
        _ => {
            let id = csid - 64;
            out.put_u8((fmt << 6) | 1);
            out.put_u8((id & 0xFF) as u8);
            out.put_u8((id >> 8) as u8);
        }
    }
}

/// Splits messages into format 0 + format 3 chunks
#[derive(Debug, Clone, Copy)]
pub struct ChunkEncoder {
    chunk_size: u32,
}

impl ChunkEncoder {
    pub fn new(chunk_size: u32) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Exact serialized size of a message
    pub fn encoded_len(&self, chunk: &RtmpChunk) -> usize {
        let basic = basic_header_len(chunk.csid);
        let ext = if chunk.timestamp >= EXTENDED_TIMESTAMP { 4 } else { 0 };
        let len = chunk.payload.len();
        let size = self.chunk_size as usize;
        let pieces = if len == 0 { 1 } else { (len + size - 1) / size };

        basic + MESSAGE_HEADER_SIZE[0] + ext + len + (pieces - 1) * (basic + ext)
    }

    pub fn encode(&self, chunk: &RtmpChunk) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len(chunk));
        self.encode_into(chunk, &mut out);
        out.freeze()
    }

    pub fn encode_into(&self, chunk: &RtmpChunk, out: &mut BytesMut) {
        let extended = chunk.timestamp >= EXTENDED_TIMESTAMP;
        let len = chunk.payload.len();

        put_basic_header(out, CHUNK_FMT_0, chunk.csid);
        put_u24(out, chunk.timestamp.min(EXTENDED_TIMESTAMP));
        put_u24(out, len as u32);
        out.put_u8(chunk.message_type);
        out.put_u32_le(chunk.stream_id);
        if extended {
            out.put_u32(chunk.timestamp);
        }

        for (i, piece) in chunk.payload.chunks(self.chunk_size as usize).enumerate() {
            if i > 0 {
                put_basic_header(out, CHUNK_FMT_3, chunk.csid);
                if extended {
                    out.put_u32(chunk.timestamp);
                }
            }
            out.put_slice(piece);
        }
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

fn put_u24(out: &mut BytesMut, v: u32) {
    out.put_u8((v >> 16) as u8);
    out.put_u8((v >> 8) as u8);
    out.put_u8(v as u8);
}

/// Return `chunks` with the format 0 stream id rewritten.
///
/// `chunks` must start with a format 0 header. Shares the buffer when the id
/// already matches.
pub fn with_stream_id(chunks: &Bytes, stream_id: u32) -> Bytes {
    let Some(&first) = chunks.first() else {
        return chunks.clone();
    };
    let basic = match first & 0x3F {
        0 => 2,
        1 => 3,
        _ => 1,
    };
    let at = basic + 7;
    if chunks.len() < at + 4 {
        return chunks.clone();
    }
    if chunks[at..at + 4] == stream_id.to_le_bytes() {
        return chunks.clone();
    }

    let mut patched = BytesMut::from(&chunks[..]);
    patched[at..at + 4].copy_from_slice(&stream_id.to_le_bytes());
    patched.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(csid: u32, timestamp: u32, len: usize) -> RtmpChunk {
        let payload: Vec<u8> = (0..len).map(|i| (i * 7 % 256) as u8).collect();
        RtmpChunk::new(csid, MSG_VIDEO, 1, Bytes::from(payload)).with_timestamp(timestamp)
    }

    fn decode_all(decoder: &mut ChunkDecoder, data: &[u8]) -> Vec<RtmpChunk> {
        let mut buf = Bytes::copy_from_slice(data);
        let mut out = Vec::new();
        while let Some(msg) = decoder.decode(&mut buf).unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_basic_header_lengths() {
        assert_eq!(basic_header_len(2), 1);
        assert_eq!(basic_header_len(63), 1);
        assert_eq!(basic_header_len(64), 2);
        assert_eq!(basic_header_len(319), 2);
        assert_eq!(basic_header_len(320), 3);
        assert_eq!(basic_header_len(65599), 3);
    }

    #[test]
    fn test_roundtrip_across_csid_ranges() {
        for csid in [3, 63, 64, 200, 319, 320, 1000] {
            let encoder = ChunkEncoder::new(128);
            let msg = message(csid, 1000, 300);
            let wire = encoder.encode(&msg);
            assert_eq!(wire.len(), encoder.encoded_len(&msg));

            let mut decoder = ChunkDecoder::new();
            let decoded = decode_all(&mut decoder, &wire);
            assert_eq!(decoded, vec![msg.clone()], "csid {}", csid);
            assert_eq!(encoder.encode(&decoded[0]), wire);
        }
    }

    #[test]
    fn test_no_trailing_empty_chunk() {
        let encoder = ChunkEncoder::new(128);
        let msg = message(CSID_VIDEO, 0, 256);
        let wire = encoder.encode(&msg);
        // 12 byte header, 128 payload, 1 byte fmt3 header, 128 payload
        assert_eq!(wire.len(), 12 + 128 + 1 + 128);
        assert_eq!(wire[12 + 128], 0xC0 | CSID_VIDEO as u8);
    }

    #[test]
    fn test_empty_payload() {
        let encoder = ChunkEncoder::new(128);
        let msg = RtmpChunk::new(CSID_PROTOCOL, MSG_USER_CONTROL, 0, Bytes::new());
        let wire = encoder.encode(&msg);
        assert_eq!(wire.len(), 12);

        let mut decoder = ChunkDecoder::new();
        assert_eq!(decode_all(&mut decoder, &wire), vec![msg]);
    }

    #[test]
    fn test_extended_timestamp_every_chunk() {
        let encoder = ChunkEncoder::new(128);
        let msg = message(CSID_AUDIO, 0x0100_0000, 200);
        let wire = encoder.encode(&msg);
        assert_eq!(wire.len(), 12 + 4 + 128 + 1 + 4 + 72);
        assert_eq!(&wire[1..4], &[0xFF, 0xFF, 0xFF]);
        assert_eq!(&wire[12..16], &0x0100_0000u32.to_be_bytes());
        assert_eq!(&wire[145..149], &0x0100_0000u32.to_be_bytes());

        let mut decoder = ChunkDecoder::new();
        let decoded = decode_all(&mut decoder, &wire);
        assert_eq!(decoded[0].timestamp, 0x0100_0000);
        assert_eq!(decoded[0].payload, msg.payload);
    }

    #[test]
    fn test_split_at_every_byte() {
        let encoder = ChunkEncoder::new(64);
        let msg = message(CSID_VIDEO, 42, 500);
        let wire = encoder.encode(&msg);

        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(64).unwrap();
        let mut out = Vec::new();
        for byte in wire.iter() {
            let mut one = Bytes::copy_from_slice(&[*byte]);
            if let Some(m) = decoder.decode(&mut one).unwrap() {
                out.push(m);
            }
        }
        assert_eq!(out, vec![msg]);
    }

    #[test]
    fn test_type1_inherits_stream_and_accumulates_clock() {
        let mut wire = BytesMut::new();
        // fmt 0, csid 4, ts 100, len 2, audio, stream 1
        wire.put_slice(&[0x04, 0, 0, 100, 0, 0, 2, MSG_AUDIO, 1, 0, 0, 0, 0xAF, 0x01]);
        // fmt 1, csid 4, delta 20, len 3, audio
        wire.put_slice(&[0x44, 0, 0, 20, 0, 0, 3, MSG_AUDIO, 0xAF, 0x01, 0x02]);
        // fmt 2, csid 4, delta 30 (length inherited)
        wire.put_slice(&[0x84, 0, 0, 30, 1, 2, 3]);
        // fmt 3, csid 4: delta 30 again
        wire.put_slice(&[0xC4, 4, 5, 6]);

        let mut decoder = ChunkDecoder::new();
        let msgs = decode_all(&mut decoder, &wire);
        let clocks: Vec<u32> = msgs.iter().map(|m| m.timestamp).collect();
        assert_eq!(clocks, vec![100, 120, 150, 180]);
        assert!(msgs.iter().all(|m| m.stream_id == 1));
        assert_eq!(&msgs[3].payload[..], &[4, 5, 6]);
    }

    #[test]
    fn test_clock_wraps() {
        let mut wire = BytesMut::new();
        wire.put_slice(&[0x04, 0xFF, 0xFF, 0xFF, 0, 0, 1, MSG_AUDIO, 1, 0, 0, 0]);
        wire.put_u32(0xFFFF_FFF0);
        wire.put_u8(0xAF);
        wire.put_slice(&[0x84, 0, 0, 0x20, 0xAF]);

        let mut decoder = ChunkDecoder::new();
        let msgs = decode_all(&mut decoder, &wire);
        assert_eq!(msgs[0].timestamp, 0xFFFF_FFF0);
        assert_eq!(msgs[1].timestamp, 0x10);
    }

    #[test]
    fn test_interleaved_chunk_streams() {
        let encoder = ChunkEncoder::new(128);
        let audio = encoder.encode(&message(CSID_AUDIO, 10, 200));
        let video = encoder.encode(&message(CSID_VIDEO, 20, 200));

        // first chunk of each, then the remainders
        let mut wire = BytesMut::new();
        wire.put_slice(&audio[..12 + 128]);
        wire.put_slice(&video[..12 + 128]);
        wire.put_slice(&audio[12 + 128..]);
        wire.put_slice(&video[12 + 128..]);

        let mut decoder = ChunkDecoder::new();
        let msgs = decode_all(&mut decoder, &wire);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].csid, CSID_AUDIO);
        assert_eq!(msgs[1].csid, CSID_VIDEO);
    }

    #[test]
    fn test_invalid_message_type() {
        let mut decoder = ChunkDecoder::new();
        let wire = [0x03, 0, 0, 0, 0, 0, 1, 23, 0, 0, 0, 0, 0];
        let mut buf = Bytes::copy_from_slice(&wire);
        assert!(matches!(
            decoder.decode(&mut buf),
            Err(crate::error::Error::Protocol(ProtocolError::InvalidMessageType(23)))
        ));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut decoder = ChunkDecoder::new();
        assert!(decoder.set_chunk_size(0).is_err());
        assert_eq!(decoder.chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_buffer_reused_per_csid() {
        let encoder = ChunkEncoder::new(4096);
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(4096).unwrap();

        decode_all(&mut decoder, &encoder.encode(&message(CSID_VIDEO, 0, 1000)));
        let capacity = decoder.packets[&CSID_VIDEO].payload.len();
        assert_eq!(capacity, 1000 + PACKET_SLACK);

        decode_all(&mut decoder, &encoder.encode(&message(CSID_VIDEO, 0, 500)));
        assert_eq!(decoder.packets[&CSID_VIDEO].payload.len(), capacity);

        decode_all(&mut decoder, &encoder.encode(&message(CSID_VIDEO, 0, 3000)));
        assert_eq!(decoder.packets[&CSID_VIDEO].payload.len(), 3000 + PACKET_SLACK);
    }

    #[test]
    fn test_with_stream_id() {
        let encoder = ChunkEncoder::new(128);
        let wire = encoder.encode(&RtmpChunk::new(CSID_AUDIO, MSG_AUDIO, 0, Bytes::from_static(&[1, 2])));
        let patched = with_stream_id(&wire, 7);
        assert_eq!(&patched[8..12], &7u32.to_le_bytes());
        assert_eq!(&patched[12..], &[1, 2]);

        let same = with_stream_id(&patched, 7);
        assert_eq!(same.as_ptr(), patched.as_ptr());
    }
}

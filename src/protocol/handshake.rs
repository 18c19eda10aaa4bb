//! Server side of the plain RTMP handshake
//!
//! ```text
//! Client                                   Relay
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes) -------------->|
//!   |<------ S0 + S1 + S2 (1 + 2 * 1536) ---|
//!   |------- C2 (1536 bytes) -------------->|
//!   |            [chunk stream]             |
//! ```
//!
//! Only sizes are checked: the version byte is not validated and no digest is
//! looked for in C1. Input may arrive split at any byte boundary; each stage
//! buffers until its byte count is reached.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

/// Progress through the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing received yet
    Uninit,
    /// C0 received, collecting C1
    VersionReceived,
    /// S0S1S2 sent, collecting C2
    C1Received,
    /// C2 consumed; chunk parsing starts with the next byte
    C2Received,
}

/// Resumable server handshake
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    version: u8,
    c1: Box<[u8; HANDSHAKE_SIZE]>,
    filled: usize,
}

impl Handshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::Uninit,
            version: 0,
            c1: Box::new([0u8; HANDSHAKE_SIZE]),
            filled: 0,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::C2Received
    }

    /// Version byte the client sent in C0
    pub fn client_version(&self) -> u8 {
        self.version
    }

    /// Bytes still required to reach the next state
    pub fn bytes_needed(&self) -> usize {
        match self.state {
            HandshakeState::Uninit => 1 + HANDSHAKE_SIZE,
            HandshakeState::VersionReceived | HandshakeState::C1Received => {
                HANDSHAKE_SIZE - self.filled
            }
            HandshakeState::C2Received => 0,
        }
    }

    /// Consume handshake bytes from `buf`.
    ///
    /// Stops as soon as the handshake completes, leaving any chunk data in
    /// `buf`. Returns S0S1S2 once C1 is complete.
    pub fn process<B: Buf>(&mut self, buf: &mut B) -> Option<Bytes> {
        let mut response = None;

        while buf.has_remaining() {
            match self.state {
                HandshakeState::Uninit => {
                    self.version = buf.get_u8();
                    self.filled = 0;
                    self.state = HandshakeState::VersionReceived;
                }
                HandshakeState::VersionReceived => {
                    let n = (HANDSHAKE_SIZE - self.filled).min(buf.remaining());
                    buf.copy_to_slice(&mut self.c1[self.filled..self.filled + n]);
                    self.filled += n;
                    if self.filled == HANDSHAKE_SIZE {
                        response = Some(self.response());
                        self.filled = 0;
                        self.state = HandshakeState::C1Received;
                    }
                }
                HandshakeState::C1Received => {
                    // C2 is read and dropped
                    let n = (HANDSHAKE_SIZE - self.filled).min(buf.remaining());
                    buf.advance(n);
                    self.filled += n;
                    if self.filled == HANDSHAKE_SIZE {
                        self.filled = 0;
                        self.state = HandshakeState::C2Received;
                    }
                }
                HandshakeState::C2Received => break,
            }
        }

        response
    }

    fn response(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);
        out.put_u8(RTMP_VERSION);
        out.put_slice(&generate_s1());
        out.put_slice(&generate_s2(&self.c1));
        out.freeze()
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u32)
        .unwrap_or(0)
}

/// S1: time, four zero bytes, pseudo-random filler
fn generate_s1() -> [u8; HANDSHAKE_SIZE] {
    let mut packet = [0u8; HANDSHAKE_SIZE];
    let time = now_millis();
    packet[0..4].copy_from_slice(&time.to_be_bytes());

    // Filler does not need to be unpredictable
    let mut seed = u64::from(time) | 1;
    for chunk in packet[8..].chunks_mut(8) {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let bytes = seed.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
    packet
}

/// S2: C1 echoed back with our read time in bytes 4..8
fn generate_s2(c1: &[u8; HANDSHAKE_SIZE]) -> [u8; HANDSHAKE_SIZE] {
    let mut echo = *c1;
    echo[4..8].copy_from_slice(&now_millis().to_be_bytes());
    echo
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c0c1() -> Vec<u8> {
        let mut data = vec![RTMP_VERSION];
        data.extend((0..HANDSHAKE_SIZE).map(|i| (i % 251) as u8));
        data
    }

    #[test]
    fn test_full_handshake_in_one_read() {
        let mut hs = Handshake::new();
        let mut input = Bytes::from(c0c1());
        let reply = hs.process(&mut input).expect("S0S1S2");

        assert_eq!(reply.len(), 1 + 2 * HANDSHAKE_SIZE);
        assert_eq!(reply[0], RTMP_VERSION);
        assert_eq!(hs.state(), HandshakeState::C1Received);

        let mut c2 = Bytes::from(vec![0u8; HANDSHAKE_SIZE]);
        assert!(hs.process(&mut c2).is_none());
        assert!(hs.is_done());
    }

    #[test]
    fn test_s2_echoes_c1_payload() {
        let mut hs = Handshake::new();
        let data = c0c1();
        let reply = hs.process(&mut Bytes::from(data.clone())).unwrap();

        let s2 = &reply[1 + HANDSHAKE_SIZE..];
        assert_eq!(&s2[0..4], &data[1..5]);
        assert_eq!(&s2[8..], &data[9..]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut hs = Handshake::new();
        let data = c0c1();
        let mut replies = 0;

        for (i, byte) in data.iter().enumerate() {
            let mut one = Bytes::copy_from_slice(&[*byte]);
            if hs.process(&mut one).is_some() {
                replies += 1;
                assert_eq!(i, HANDSHAKE_SIZE);
            }
        }
        assert_eq!(replies, 1);

        for _ in 0..HANDSHAKE_SIZE - 1 {
            hs.process(&mut Bytes::from_static(&[0]));
        }
        assert_eq!(hs.bytes_needed(), 1);
        assert!(!hs.is_done());
        hs.process(&mut Bytes::from_static(&[0]));
        assert!(hs.is_done());
    }

    #[test]
    fn test_leaves_trailing_chunk_data() {
        let mut hs = Handshake::new();
        hs.process(&mut Bytes::from(c0c1()));

        let mut c2_and_more = BytesMut::new();
        c2_and_more.put_slice(&[7u8; HANDSHAKE_SIZE]);
        c2_and_more.put_slice(&[0x03, 0xAA]);
        let mut buf = c2_and_more.freeze();

        hs.process(&mut buf);
        assert!(hs.is_done());
        assert_eq!(&buf[..], &[0x03, 0xAA]);
    }

    #[test]
    fn test_version_not_validated() {
        let mut hs = Handshake::new();
        let mut data = c0c1();
        data[0] = 6;
        assert!(hs.process(&mut Bytes::from(data)).is_some());
        assert_eq!(hs.client_version(), 6);
    }

    #[test]
    fn test_s1_zero_field() {
        let s1 = generate_s1();
        assert_eq!(&s1[4..8], &[0, 0, 0, 0]);
    }
}

//! RTMP wire protocol: handshake, chunk stream and message types

pub mod chunk;
pub mod constants;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, RtmpChunk};
pub use handshake::{Handshake, HandshakeState};
pub use message::{Command, ControlMessage, DataMessage, UserControlEvent};

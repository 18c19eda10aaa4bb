//! Error types
//!
//! Each layer has its own error enum. They all convert into [`Error`], which
//! is what session and server code propagates with `?`.

use std::fmt;
use std::io;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug)]
pub enum Error {
    /// Socket I/O failure
    Io(io::Error),
    /// Chunk stream violation; the session is torn down
    Protocol(ProtocolError),
    /// AMF0 payload could not be decoded
    Amf(AmfError),
    /// Audio/video descriptor could not be parsed
    Media(MediaError),
    /// Stream registry refused the operation
    Registry(crate::registry::RegistryError),
    /// Peer closed the connection
    ConnectionClosed,
    /// No data within the configured read timeout
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "protocol error: {}", e),
            Error::Amf(e) => write!(f, "AMF error: {}", e),
            Error::Media(e) => write!(f, "media error: {}", e),
            Error::Registry(e) => write!(f, "registry error: {}", e),
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::Timeout => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Amf(e) => Some(e),
            Error::Media(e) => Some(e),
            Error::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<AmfError> for Error {
    fn from(e: AmfError) -> Self {
        Error::Amf(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

impl From<crate::registry::RegistryError> for Error {
    fn from(e: crate::registry::RegistryError) -> Self {
        Error::Registry(e)
    }
}

/// Chunk stream errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message type id above the highest known type
    InvalidMessageType(u8),
    /// Peer announced a chunk size of zero
    InvalidChunkSize(u32),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::InvalidMessageType(t) => write!(f, "invalid message type {}", t),
            ProtocolError::InvalidChunkSize(s) => write!(f, "invalid chunk size {}", s),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// AMF0 decode errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmfError {
    UnexpectedEof,
    InvalidUtf8,
    InvalidObjectEnd,
    InvalidReference(u16),
    NestingTooDeep,
    UnknownMarker(u8),
    /// Command payload does not start with a string
    MissingCommandName,
}

impl fmt::Display for AmfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmfError::UnexpectedEof => write!(f, "unexpected end of AMF data"),
            AmfError::InvalidUtf8 => write!(f, "invalid UTF-8 in AMF string"),
            AmfError::InvalidObjectEnd => write!(f, "missing AMF object end marker"),
            AmfError::InvalidReference(i) => write!(f, "invalid AMF reference {}", i),
            AmfError::NestingTooDeep => write!(f, "AMF nesting too deep"),
            AmfError::UnknownMarker(m) => write!(f, "unknown AMF0 marker 0x{:02x}", m),
            AmfError::MissingCommandName => write!(f, "command name missing"),
        }
    }
}

impl std::error::Error for AmfError {}

/// Media descriptor errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    InvalidAacPacket,
    InvalidAvcPacket,
    InvalidHevcPacket,
    /// SPS ran out of bits before the picture size fields
    TruncatedSps,
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidAacPacket => write!(f, "invalid AAC sequence header"),
            MediaError::InvalidAvcPacket => write!(f, "invalid AVC sequence header"),
            MediaError::InvalidHevcPacket => write!(f, "invalid HEVC sequence header"),
            MediaError::TruncatedSps => write!(f, "truncated SPS"),
        }
    }
}

impl std::error::Error for MediaError {}

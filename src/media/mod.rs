//! Media inspection for relayed streams
//!
//! The relay never transcodes. It only reads tag headers and sequence
//! headers to report codec details, and caches the current GOP for
//! late-joining players.

pub mod aac;
pub mod bits;
pub mod codec;
pub mod gop;
pub mod h264;
pub mod hevc;

pub use aac::{AacPacketType, AudioSpecificConfig};
pub use codec::{AudioTagHeader, VideoTagHeader};
pub use gop::GopCache;
pub use h264::{AvcConfig, AvcPacketType, Sps, VideoDescriptor};
pub use hevc::HevcConfig;

//! H.265/HEVC sequence header parsing
//!
//! Only the HEVCDecoderConfigurationRecord fixed prefix is read:
//! ```text
//! configurationVersion (1) | profile_space (2b) tier (1b) profile_idc (5b)
//! | profile_compatibility_flags (4) | constraint_indicator_flags (6)
//! | general_level_idc (1) | ...
//! ```

use bytes::Bytes;

use super::h264::{VideoDescriptor, AVC_CONFIG_OFFSET};
use crate::error::{MediaError, Result};

const GENERAL_LEVEL_OFFSET: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcConfig {
    pub profile_idc: u8,
    pub tier: u8,
    pub level_idc: u8,
}

impl HevcConfig {
    pub fn parse(record: &[u8]) -> Result<Self> {
        if record.len() <= GENERAL_LEVEL_OFFSET {
            return Err(MediaError::InvalidHevcPacket.into());
        }
        Ok(HevcConfig {
            profile_idc: record[1] & 0x1F,
            tier: (record[1] >> 5) & 0x01,
            level_idc: record[GENERAL_LEVEL_OFFSET],
        })
    }

    /// general_level_idc is 30 times the level number
    pub fn level(&self) -> f64 {
        f64::from(self.level_idc) / 30.0
    }
}

pub fn profile_name(profile_idc: u8) -> &'static str {
    match profile_idc {
        1 => "Main",
        2 => "Main 10",
        3 => "Main Still Picture",
        4 => "Range Extensions",
        _ => "",
    }
}

/// Describe an H.265 sequence header tag
///
/// The dimensions live in the embedded SPS, which is not decoded, so they
/// are reported as zero.
pub fn describe_sequence_header(tag: &Bytes) -> Result<VideoDescriptor> {
    let record = tag
        .get(AVC_CONFIG_OFFSET..)
        .ok_or(MediaError::InvalidHevcPacket)?;
    let config = HevcConfig::parse(record)?;
    Ok(VideoDescriptor {
        profile_name: profile_name(config.profile_idc),
        level: config.level(),
        width: 0,
        height: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hevc_main_level_4_1() {
        let mut tag = vec![0x1C, 0x00, 0x00, 0x00, 0x00];
        tag.extend_from_slice(&[0x01, 0x01, 0x60, 0x00, 0x00, 0x00, 0x90, 0, 0, 0, 0, 0, 123]);
        let info = describe_sequence_header(&Bytes::from(tag)).unwrap();
        assert_eq!(info.profile_name, "Main");
        assert!((info.level - 4.1).abs() < 1e-9);
        assert_eq!(info.width, 0);
    }

    #[test]
    fn test_hevc_tier_and_profile_bits() {
        let mut record = [0u8; 13];
        record[1] = 0x22;
        record[12] = 150;
        let config = HevcConfig::parse(&record).unwrap();
        assert_eq!(config.profile_idc, 2);
        assert_eq!(config.tier, 1);
        assert_eq!(config.level(), 5.0);
        assert_eq!(profile_name(config.profile_idc), "Main 10");
    }

    #[test]
    fn test_hevc_truncated() {
        assert!(HevcConfig::parse(&[0x01, 0x01]).is_err());
        assert!(describe_sequence_header(&Bytes::from_static(&[0x1C, 0x00])).is_err());
    }
}

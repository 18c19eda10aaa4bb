//! H.264/AVC sequence header parsing
//!
//! AVC Video Packet Structure:
//! ```text
//! +----------+----------+-----------------+
//! |FrameType | CodecID  | AVCPacketType   | CompositionTime | Data
//! | (4 bits) | (4 bits) | (1 byte)        | (3 bytes, SI24) |
//! +----------+----------+-----------------+
//! ```
//!
//! AVCDecoderConfigurationRecord (sequence header):
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | lengthSizeMinusOne (1, lower 2 bits)
//! | numOfSPS (1, lower 5 bits) | { spsLength (2) | spsNALUnit }*
//! | numOfPPS (1) | { ppsLength (2) | ppsNALUnit }*
//! ```

use bytes::{Buf, Bytes};

use super::bits::{nal_to_rbsp, BitReader};
use crate::error::{MediaError, Result};

/// AVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// Sequence header (AVCDecoderConfigurationRecord)
    SequenceHeader = 0,
    /// NAL units
    Nalu = 1,
    /// End of sequence
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// Offset of the decoder configuration record inside an FLV video tag
pub const AVC_CONFIG_OFFSET: usize = 5;

/// AVC decoder configuration (from sequence header)
#[derive(Debug, Clone)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    pub nalu_length_size: u8,
    pub sps: Vec<Bytes>,
    pub pps: Vec<Bytes>,
}

impl AvcConfig {
    /// Parse from AVCDecoderConfigurationRecord
    pub fn parse(mut data: Bytes) -> Result<Self> {
        if data.len() < 6 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let version = data.get_u8();
        if version != 1 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let profile = data.get_u8();
        let compatibility = data.get_u8();
        let level = data.get_u8();
        let nalu_length_size = (data.get_u8() & 0x03) + 1;

        let num_sps = (data.get_u8() & 0x1F) as usize;
        let sps = read_parameter_sets(&mut data, num_sps)?;

        // Some encoders stop after the SPS list
        let pps = if data.has_remaining() {
            let num_pps = data.get_u8() as usize;
            read_parameter_sets(&mut data, num_pps)?
        } else {
            Vec::new()
        };

        Ok(AvcConfig {
            profile,
            compatibility,
            level,
            nalu_length_size,
            sps,
            pps,
        })
    }
}

fn read_parameter_sets(data: &mut Bytes, count: usize) -> Result<Vec<Bytes>> {
    let mut sets = Vec::with_capacity(count);
    for _ in 0..count {
        if data.remaining() < 2 {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        let len = data.get_u16() as usize;
        if data.remaining() < len {
            return Err(MediaError::InvalidAvcPacket.into());
        }
        sets.push(data.copy_to_bytes(len));
    }
    Ok(sets)
}

/// Sequence parameter set fields needed for stream reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub profile_idc: u8,
    pub constraint_flags: u8,
    pub level_idc: u8,
    pub width: u32,
    pub height: u32,
}

const HIGH_PROFILES: [u8; 13] = [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135];

impl Sps {
    /// Parse a SPS NAL unit, header byte included
    pub fn parse(nal: &[u8]) -> Result<Self> {
        if nal.len() < 4 {
            return Err(MediaError::TruncatedSps.into());
        }
        let rbsp = nal_to_rbsp(&nal[1..]);
        let mut r = BitReader::new(&rbsp);
        Self::parse_rbsp(&mut r).ok_or_else(|| MediaError::TruncatedSps.into())
    }

    fn parse_rbsp(r: &mut BitReader<'_>) -> Option<Self> {
        let profile_idc = r.read_bits(8)? as u8;
        let constraint_flags = r.read_bits(8)? as u8;
        let level_idc = r.read_bits(8)? as u8;
        let _sps_id = r.read_ue()?;

        if HIGH_PROFILES.contains(&profile_idc) {
            let chroma_format_idc = r.read_ue()?;
            if chroma_format_idc == 3 {
                r.skip_bits(1)?;
            }
            let _bit_depth_luma = r.read_ue()?;
            let _bit_depth_chroma = r.read_ue()?;
            // qpprime_y_zero_transform_bypass_flag
            r.skip_bits(1)?;
            if r.read_flag()? {
                let count = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..count {
                    if r.read_flag()? {
                        skip_scaling_list(r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        let _log2_max_frame_num = r.read_ue()?;
        match r.read_ue()? {
            0 => {
                let _log2_max_poc_lsb = r.read_ue()?;
            }
            1 => {
                r.skip_bits(1)?;
                r.read_se()?;
                r.read_se()?;
                let cycle = r.read_ue()?;
                if cycle > 255 {
                    return None;
                }
                for _ in 0..cycle {
                    r.read_se()?;
                }
            }
            _ => {}
        }

        let _max_num_ref_frames = r.read_ue()?;
        r.skip_bits(1)?;
        let width_in_mbs = r.read_ue()?.saturating_add(1);
        let height_in_map_units = r.read_ue()?.saturating_add(1);
        let frame_mbs_only = r.read_flag()?;
        if !frame_mbs_only {
            // mb_adaptive_frame_field_flag
            r.skip_bits(1)?;
        }
        // direct_8x8_inference_flag
        r.skip_bits(1)?;

        let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0u32, 0u32, 0u32, 0u32);
        if r.read_flag()? {
            crop_left = r.read_ue()?;
            crop_right = r.read_ue()?;
            crop_top = r.read_ue()?;
            crop_bottom = r.read_ue()?;
        }

        let field_factor: u32 = if frame_mbs_only { 1 } else { 2 };
        let width = width_in_mbs
            .saturating_mul(16)
            .saturating_sub(crop_left.saturating_add(crop_right).saturating_mul(2));
        let height = height_in_map_units
            .saturating_mul(16 * field_factor)
            .saturating_sub(crop_top.saturating_add(crop_bottom).saturating_mul(2));

        Some(Sps {
            profile_idc,
            constraint_flags,
            level_idc,
            width,
            height,
        })
    }
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Option<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = r.read_se()?;
            next_scale = (last_scale + delta_scale + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Some(())
}

pub fn profile_name(profile_idc: u8) -> &'static str {
    match profile_idc {
        66 => "Baseline",
        77 => "Main",
        88 => "Extended",
        100 => "High",
        110 => "High 10",
        122 => "High 4:2:2",
        244 => "High 4:4:4",
        _ => "",
    }
}

/// What a video sequence header tells us about the stream
#[derive(Debug, Clone, PartialEq)]
pub struct VideoDescriptor {
    pub profile_name: &'static str,
    pub level: f64,
    pub width: u32,
    pub height: u32,
}

/// Describe an H.264 sequence header tag
///
/// Width and height come from the first SPS; they stay zero if the record
/// has none.
pub fn describe_sequence_header(tag: &Bytes) -> Result<VideoDescriptor> {
    if tag.len() <= AVC_CONFIG_OFFSET {
        return Err(MediaError::InvalidAvcPacket.into());
    }
    let config = AvcConfig::parse(tag.slice(AVC_CONFIG_OFFSET..))?;

    let mut descriptor = VideoDescriptor {
        profile_name: profile_name(config.profile),
        level: f64::from(config.level) / 10.0,
        width: 0,
        height: 0,
    };
    if let Some(nal) = config.sps.first() {
        let sps = Sps::parse(nal)?;
        descriptor.profile_name = profile_name(sps.profile_idc);
        descriptor.level = f64::from(sps.level_idc) / 10.0;
        descriptor.width = sps.width;
        descriptor.height = sps.height;
    }
    Ok(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS_BASELINE_720P: &[u8] = &[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE8];
    const SPS_HIGH_1080P: &[u8] = &[
        0x67, 0x64, 0x00, 0x28, 0xAD, 0x84, 0x3F, 0xFF, 0x82, 0x11, 0x50, 0xA9, 0x99, 0x94, 0x07,
        0x80, 0x22, 0x7E, 0x54,
    ];
    const SPS_MAIN_INTERLACED: &[u8] = &[0x67, 0x4D, 0x40, 0x1E, 0xEC, 0x80, 0x5A, 0x12, 0x64];

    fn sequence_header_tag(sps: &[u8]) -> Bytes {
        let mut tag = vec![0x17, 0x00, 0x00, 0x00, 0x00];
        tag.extend_from_slice(&[0x01, sps[1], sps[2], sps[3], 0xFF, 0xE1]);
        tag.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        tag.extend_from_slice(sps);
        tag.extend_from_slice(&[0x01, 0x00, 0x04, 0x68, 0xCE, 0x3C, 0x80]);
        Bytes::from(tag)
    }

    #[test]
    fn test_avc_config_parse() {
        let tag = sequence_header_tag(SPS_BASELINE_720P);
        let config = AvcConfig::parse(tag.slice(AVC_CONFIG_OFFSET..)).unwrap();
        assert_eq!(config.profile, 66);
        assert_eq!(config.level, 31);
        assert_eq!(config.nalu_length_size, 4);
        assert_eq!(config.sps.len(), 1);
        assert_eq!(config.pps.len(), 1);
        assert_eq!(&config.pps[0][..], &[0x68, 0xCE, 0x3C, 0x80]);
    }

    #[test]
    fn test_avc_config_rejects_bad_version_and_truncation() {
        assert!(AvcConfig::parse(Bytes::from_static(&[0x02, 0x42, 0, 0x1F, 0xFF, 0xE0])).is_err());
        assert!(AvcConfig::parse(Bytes::from_static(&[0x01, 0x42, 0, 0x1F, 0xFF, 0xE1, 0x00])).is_err());
        assert!(AvcConfig::parse(Bytes::from_static(&[0x01, 0x42])).is_err());
    }

    #[test]
    fn test_sps_baseline() {
        let sps = Sps::parse(SPS_BASELINE_720P).unwrap();
        assert_eq!(sps.profile_idc, 66);
        assert_eq!(sps.level_idc, 31);
        assert_eq!((sps.width, sps.height), (1280, 720));
    }

    #[test]
    fn test_sps_high_with_scaling_lists_and_cropping() {
        let sps = Sps::parse(SPS_HIGH_1080P).unwrap();
        assert_eq!(sps.profile_idc, 100);
        assert_eq!((sps.width, sps.height), (1920, 1080));
    }

    #[test]
    fn test_sps_field_coding_doubles_height() {
        let sps = Sps::parse(SPS_MAIN_INTERLACED).unwrap();
        assert_eq!((sps.width, sps.height), (720, 576));
    }

    #[test]
    fn test_sps_truncated() {
        assert!(Sps::parse(&SPS_HIGH_1080P[..8]).is_err());
    }

    #[test]
    fn test_describe_sequence_header() {
        let info = describe_sequence_header(&sequence_header_tag(SPS_HIGH_1080P)).unwrap();
        assert_eq!(info.profile_name, "High");
        assert_eq!(info.level, 4.0);
        assert_eq!((info.width, info.height), (1920, 1080));

        let info = describe_sequence_header(&sequence_header_tag(SPS_BASELINE_720P)).unwrap();
        assert_eq!(info.profile_name, "Baseline");
        assert!((info.level - 3.1).abs() < 1e-9);
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(profile_name(77), "Main");
        assert_eq!(profile_name(244), "High 4:4:4");
        assert_eq!(profile_name(1), "");
    }
}

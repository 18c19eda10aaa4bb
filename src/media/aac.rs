//! AAC sequence header parsing
//!
//! An FLV AAC tag is:
//! ```text
//! +-----------+----------+----------+----------+-----------+----------
//! |SoundFormat|SoundRate |SoundSize |SoundType | AACType   | data
//! | (4 bits)  | (2 bits) | (1 bit)  | (1 bit)  | (1 byte)  |
//! +-----------+----------+----------+----------+-----------+----------
//! ```
//! AACType 0 carries the AudioSpecificConfig, 1 a raw frame.

use bytes::Bytes;

use super::bits::BitReader;
use crate::error::{MediaError, Result};

/// AACPacketType byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    SequenceHeader = 0,
    Raw = 1,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

const CHANNELS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 8];

const OBJECT_TYPE_SBR: u8 = 5;
const OBJECT_TYPE_PS: u8 = 29;

/// AudioSpecificConfig fields the relay reports
#[derive(Debug, Clone)]
pub struct AudioSpecificConfig {
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    pub sampling_frequency: u32,
    pub channel_configuration: u8,
    /// SBR signalled explicitly (HE-AAC)
    pub sbr: bool,
    /// Parametric stereo signalled explicitly (HE-AAC v2)
    pub ps: bool,
    pub raw: Bytes,
}

impl AudioSpecificConfig {
    /// Parse a full FLV AAC sequence header tag (sound byte + AACType + config)
    pub fn from_tag(tag: &Bytes) -> Result<Self> {
        if tag.len() < 4 {
            return Err(MediaError::InvalidAacPacket.into());
        }
        Self::parse(tag.slice(2..))
    }

    pub fn parse(data: Bytes) -> Result<Self> {
        let invalid = || MediaError::InvalidAacPacket;
        let mut r = BitReader::new(&data);

        let mut audio_object_type = read_object_type(&mut r).ok_or_else(invalid)?;
        let (sampling_frequency_index, mut sampling_frequency) =
            read_frequency(&mut r).ok_or_else(invalid)?;
        let channel_configuration = r.read_bits(4).ok_or_else(invalid)? as u8;

        let mut sbr = false;
        let mut ps = false;
        if audio_object_type == OBJECT_TYPE_SBR || audio_object_type == OBJECT_TYPE_PS {
            // Explicit hierarchical signalling: the extension rate and the core type follow
            sbr = true;
            ps = audio_object_type == OBJECT_TYPE_PS;
            let (_, extension_frequency) = read_frequency(&mut r).ok_or_else(invalid)?;
            sampling_frequency = extension_frequency;
            audio_object_type = read_object_type(&mut r).ok_or_else(invalid)?;
        }

        if sampling_frequency == 0 {
            return Err(invalid().into());
        }

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
            sbr,
            ps,
            raw: data.clone(),
        })
    }

    pub fn channels(&self) -> u8 {
        CHANNELS
            .get(self.channel_configuration as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn profile_name(&self) -> &'static str {
        match self.audio_object_type {
            1 => "Main",
            2 if self.ps => "HEv2",
            2 if self.sbr => "HE",
            2 => "LC",
            3 => "SSR",
            4 => "LTP",
            5 => "SBR",
            _ => "",
        }
    }
}

fn read_object_type(r: &mut BitReader<'_>) -> Option<u8> {
    let object_type = r.read_bits(5)? as u8;
    if object_type == 31 {
        return Some(32 + r.read_bits(6)? as u8);
    }
    Some(object_type)
}

fn read_frequency(r: &mut BitReader<'_>) -> Option<(u8, u32)> {
    let index = r.read_bits(4)? as u8;
    let frequency = if index == 0x0F {
        r.read_bits(24)?
    } else {
        SAMPLING_FREQUENCIES.get(index as usize).copied().unwrap_or(0)
    };
    Some((index, frequency))
}

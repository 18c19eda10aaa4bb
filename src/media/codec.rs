//! FLV audio/video tag header fields and codec names

/// Sample rates for the 2-bit FLV sound rate field
pub const AUDIO_SOUND_RATE: [u32; 4] = [5512, 11025, 22050, 44100];

/// Audio codec names indexed by FLV sound format
pub const AUDIO_CODEC_NAME: [&str; 17] = [
    "",
    "ADPCM",
    "MP3",
    "LinearLE",
    "Nellymoser16",
    "Nellymoser8",
    "Nellymoser",
    "G711A",
    "G711U",
    "",
    "AAC",
    "Speex",
    "",
    "OPUS",
    "MP3-8K",
    "DeviceSpecific",
    "Uncompressed",
];

/// Video codec names indexed by FLV codec id
pub const VIDEO_CODEC_NAME: [&str; 13] = [
    "",
    "Jpeg",
    "Sorenson-H263",
    "ScreenVideo",
    "On2-VP6",
    "On2-VP6-Alpha",
    "ScreenVideo2",
    "H264",
    "",
    "",
    "",
    "",
    "H265",
];

pub const SOUND_FORMAT_AAC: u8 = 10;
pub const VIDEO_CODEC_AVC: u8 = 7;
pub const VIDEO_CODEC_HEVC: u8 = 12;

pub const FRAME_TYPE_KEY: u8 = 1;

pub fn audio_codec_name(sound_format: u8) -> &'static str {
    AUDIO_CODEC_NAME.get(sound_format as usize).copied().unwrap_or("")
}

pub fn video_codec_name(codec_id: u8) -> &'static str {
    VIDEO_CODEC_NAME.get(codec_id as usize).copied().unwrap_or("")
}

/// Decoded first byte of an FLV audio tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTagHeader {
    pub sound_format: u8,
    pub sound_rate: u8,
    pub sound_size: u8,
    pub sound_type: u8,
}

impl AudioTagHeader {
    pub fn parse(b0: u8) -> Self {
        Self {
            sound_format: b0 >> 4,
            sound_rate: (b0 >> 2) & 0x03,
            sound_size: (b0 >> 1) & 0x01,
            sound_type: b0 & 0x01,
        }
    }

    /// Nominal sample rate, including the fixed-rate codecs
    pub fn sample_rate(&self) -> u32 {
        match self.sound_format {
            4 | 11 => 16000,
            5 | 14 => 8000,
            _ => AUDIO_SOUND_RATE[self.sound_rate as usize],
        }
    }

    pub fn channels(&self) -> u8 {
        self.sound_type + 1
    }
}

/// Decoded first byte of an FLV video tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTagHeader {
    pub frame_type: u8,
    pub codec_id: u8,
}

impl VideoTagHeader {
    pub fn parse(b0: u8) -> Self {
        Self {
            frame_type: (b0 >> 4) & 0x0F,
            codec_id: b0 & 0x0F,
        }
    }

    /// H.264 or H.265, the codecs with sequence headers and GOP caching
    pub fn is_avc_family(&self) -> bool {
        self.codec_id == VIDEO_CODEC_AVC || self.codec_id == VIDEO_CODEC_HEVC
    }

    pub fn is_keyframe(&self) -> bool {
        self.frame_type == FRAME_TYPE_KEY
    }
}

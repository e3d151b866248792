//! `OpusHead` identification header
//!
//! The 19-byte structure a decoder needs before the first packet:
//!
//! | offset | size | field                         |
//! |--------|------|-------------------------------|
//! | 0      | 8    | `"OpusHead"`                  |
//! | 8      | 1    | version (1)                   |
//! | 9      | 1    | channel count                 |
//! | 10     | 2    | pre-skip, u16 LE              |
//! | 12     | 4    | input sample rate, u32 LE     |
//! | 16     | 2    | output gain, i16 LE           |
//! | 18     | 1    | channel mapping family        |

use crate::constants::{TARGET_CHANNELS, TARGET_SAMPLE_RATE};

pub const OPUS_HEAD_MAGIC: &[u8; 8] = b"OpusHead";
pub const OPUS_HEAD_LEN: usize = 19;
pub const OPUS_HEAD_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub channels: u8,
    pub pre_skip: u16,
    pub input_sample_rate: u32,
    pub output_gain: i16,
    pub channel_mapping: u8,
}

impl Default for OpusHead {
    fn default() -> Self {
        Self::for_stream(TARGET_SAMPLE_RATE, TARGET_CHANNELS as u8)
    }
}

impl OpusHead {
    /// Header for a plain stream: no pre-skip, unity gain, mapping family 0
    pub fn for_stream(sample_rate: u32, channels: u8) -> Self {
        Self {
            channels,
            pre_skip: 0,
            input_sample_rate: sample_rate,
            output_gain: 0,
            channel_mapping: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; OPUS_HEAD_LEN] {
        let mut b = [0u8; OPUS_HEAD_LEN];
        b[0..8].copy_from_slice(OPUS_HEAD_MAGIC);
        b[8] = OPUS_HEAD_VERSION;
        b[9] = self.channels;
        b[10..12].copy_from_slice(&self.pre_skip.to_le_bytes());
        b[12..16].copy_from_slice(&self.input_sample_rate.to_le_bytes());
        b[16..18].copy_from_slice(&self.output_gain.to_le_bytes());
        b[18] = self.channel_mapping;
        b
    }
}

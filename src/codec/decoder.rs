//! Opus decoder wrapper
//!
//! Synchronous decoding of single packets into planar [`DecodedBuffer`]s.
//! The asynchronous, ordered decode capability built on top of it lives in
//! [`crate::codec::worker`].

use opus::{Channels, Decoder};

use crate::audio::types::DecodedBuffer;
use crate::codec::header::OpusHead;
use crate::error::CodecError;

/// Largest Opus packet duration (120 ms) at 48 kHz stereo
const MAX_DECODE_SAMPLES: usize = 48_000 * 2 * 120 / 1000;

/// Opus decoder wrapper
pub struct OpusDecoder {
    decoder: Decoder,
    sample_rate: u32,
    channels: u16,
    /// Decoding buffer (reused to avoid allocations)
    decode_buffer: Vec<f32>,
    /// Frames decoded
    frames_decoded: u64,
    /// Total samples produced (per channel)
    samples_produced: u64,
}

impl OpusDecoder {
    /// Create a new Opus decoder
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::DecoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        Ok(Self {
            decoder,
            sample_rate,
            channels,
            decode_buffer: vec![0.0f32; MAX_DECODE_SAMPLES],
            frames_decoded: 0,
            samples_produced: 0,
        })
    }

    /// Create a decoder from an identification header
    pub fn from_head(head: &OpusHead) -> Result<Self, CodecError> {
        if head.channel_mapping != 0 {
            return Err(CodecError::DecoderInit(format!(
                "Unsupported channel mapping family: {}",
                head.channel_mapping
            )));
        }
        Self::new(head.input_sample_rate, head.channels as u16)
    }

    /// Decode one Opus packet
    pub fn decode(&mut self, data: &[u8]) -> Result<DecodedBuffer, CodecError> {
        let samples = self
            .decoder
            .decode_float(data, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        let total_samples = samples * self.channels as usize;
        self.frames_decoded += 1;
        self.samples_produced += samples as u64;

        Ok(DecodedBuffer::from_interleaved(
            &self.decode_buffer[..total_samples],
            self.channels,
            self.sample_rate,
        ))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn samples_produced(&self) -> u64 {
        self.samples_produced
    }
}

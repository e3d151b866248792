//! Opus encoder wrapper
//!
//! Produces the packets carried in downlink wire frames. The client itself
//! only decodes; the encoder drives the loopback tool and codec tests.

use bytes::Bytes;
use opus::{Application, Channels, Encoder};

use crate::error::CodecError;

/// Max Opus packet is 1275 bytes per frame; leave headroom for repacketizing
const ENCODE_BUFFER_SIZE: usize = 4000;

/// Opus encoder wrapper tuned for speech
pub struct OpusEncoder {
    encoder: Encoder,
    channels: u16,
    /// Samples per channel per packet
    frame_size: usize,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    /// Frame counter for statistics
    frames_encoded: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl OpusEncoder {
    /// Create a mono VoIP encoder producing `frame_ms` packets
    pub fn voice(sample_rate: u32, frame_ms: u32) -> Result<Self, CodecError> {
        Self::new(sample_rate, 1, frame_ms, Application::Voip)
    }

    pub fn new(
        sample_rate: u32,
        channels: u16,
        frame_ms: u32,
        application: Application,
    ) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::EncoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let mut encoder = Encoder::new(sample_rate, opus_channels, application)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        encoder
            .set_signal(opus::Signal::Voice)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set signal type: {}", e)))?;
        encoder
            .set_vbr(true)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;

        Ok(Self {
            encoder,
            channels,
            frame_size: (sample_rate as usize * frame_ms as usize) / 1000,
            encode_buffer: vec![0u8; ENCODE_BUFFER_SIZE],
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    /// Encode one frame of interleaved samples (`frame_size * channels` long)
    pub fn encode(&mut self, samples: &[f32]) -> Result<Bytes, CodecError> {
        let expected_len = self.frame_size * self.channels as usize;
        if samples.len() != expected_len {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self
            .encoder
            .encode_float(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    /// Samples per channel per packet
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    pub fn bytes_produced(&self) -> u64 {
        self.bytes_produced
    }
}

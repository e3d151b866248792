//! Microphone uplink
//!
//! Turns captured frames into `input_audio_buffer.append` envelopes:
//! gain, resample to the transport rate, PCM16 LE, base64.

use crate::audio::meter::InputLevel;
use crate::audio::pcm::encode_pcm16_base64;
use crate::audio::resample::resample_linear;
use crate::audio::types::CaptureFrame;
use crate::config::CaptureConfig;
use crate::constants::TARGET_SAMPLE_RATE;
use crate::protocol::messages::OutboundMessage;

pub struct Uplink {
    gain: f32,
    out_rate: u32,
    meter: InputLevel,
    frames_sent: u64,
    samples_sent: u64,
}

impl Uplink {
    pub fn new(gain: f32) -> Self {
        Self {
            gain,
            out_rate: TARGET_SAMPLE_RATE,
            meter: InputLevel::new(),
            frames_sent: 0,
            samples_sent: 0,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(config.input_gain)
    }

    /// Envelope for one frame, stamped with the current wall clock
    pub fn process(&mut self, frame: &CaptureFrame) -> OutboundMessage {
        let audio = self.encode(frame);
        OutboundMessage::append_now(audio)
    }

    /// Envelope for one frame with an explicit `t0` (epoch milliseconds)
    pub fn process_at(&mut self, frame: &CaptureFrame, t0: i64) -> OutboundMessage {
        let audio = self.encode(frame);
        OutboundMessage::append(audio, t0)
    }

    /// Gain and resample one frame to the transport rate
    pub fn condition(&mut self, frame: &CaptureFrame) -> Vec<f32> {
        let gained: Vec<f32> = frame.samples.iter().map(|s| s * self.gain).collect();
        self.meter.update(&gained);
        resample_linear(&gained, frame.sample_rate, self.out_rate)
    }

    /// Sent once the microphone stops
    pub fn commit(&self) -> OutboundMessage {
        tracing::debug!(
            "Committing input after {} frames ({} samples)",
            self.frames_sent,
            self.samples_sent
        );
        OutboundMessage::Commit
    }

    /// Smoothed microphone level in 0..=1
    pub fn level(&self) -> f32 {
        self.meter.level()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn samples_sent(&self) -> u64 {
        self.samples_sent
    }

    fn encode(&mut self, frame: &CaptureFrame) -> String {
        let resampled = self.condition(frame);
        self.frames_sent += 1;
        self.samples_sent += resampled.len() as u64;
        encode_pcm16_base64(&resampled)
    }
}

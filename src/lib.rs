//! # Voice Agent Audio
//!
//! Real-time audio path of a voice-agent client: microphone capture framed
//! for low-latency transport, and jitter-buffered Opus playback of the
//! agent's reply stream.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────── UPLINK ──────────────────────────────────┐
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────┐   ┌────────────────┐  │
//! │  │ Microphone │──▶│    Frame     │──▶│   Linear   │──▶│ PCM16 + base64 │──┼──▶ transport
//! │  │ (callback) │   │ Accumulator  │   │ Resampler  │   │    envelope    │  │
//! │  └────────────┘   └──────────────┘   └────────────┘   └────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────── DOWNLINK ─────────────────────────────────┐
//! │  ┌────────────┐   ┌──────────────┐   ┌────────────┐   ┌────────────────┐  │
//! │  │ Wire Frame │──▶│   Reorder    │──▶│   Decode   │──▶│    Playback    │──┼──▶ speakers
//! │  │   Codec    │   │   Buffer     │   │  Pipeline  │   │   Scheduler    │  │
//! │  └────────────┘   └──────────────┘   └────────────┘   └────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound handling is single-writer: one [`session::PlaybackSession`] owns
//! the reorder window, the stream cursor and the playhead, and is driven by
//! one event loop.

pub mod audio;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate of the transport pipeline in both directions
    pub const TARGET_SAMPLE_RATE: u32 = 24_000;

    /// Channel count of the transport pipeline (mono)
    pub const TARGET_CHANNELS: u16 = 1;

    /// Capture and decode frame duration in milliseconds
    pub const FRAME_DURATION_MS: u32 = 20;

    /// Frame duration in microseconds, used for presentation timestamps
    pub const FRAME_DURATION_US: u64 = FRAME_DURATION_MS as u64 * 1000;

    /// Delay applied before the first chunk of an utterance plays
    pub const PREBUFFER_SEC: f64 = 0.25;

    /// Minimum lead of any newly scheduled chunk over the output clock
    pub const SAFETY_MARGIN_SEC: f64 = 0.12;

    /// Maximum number of out-of-order packets held by the reorder buffer
    pub const REORDER_WINDOW: usize = 8;

    /// Gain applied to microphone samples before resampling
    pub const DEFAULT_INPUT_GAIN: f32 = 0.95;

    /// Capacity of the callback-to-processing frame channel (in frames)
    pub const CAPTURE_CHANNEL_CAPACITY: usize = 256;
}

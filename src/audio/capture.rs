//! Microphone capture and fixed-duration framing
//!
//! The cpal input callback runs on the platform's real-time thread. It only
//! copies samples into a [`FrameAccumulator`] and hands finished frames to a
//! bounded channel; resampling and encoding happen on the consumer side.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, Receiver, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::audio::device::{get_default_input_device, get_device_by_id, AudioDevice};
use crate::audio::types::CaptureFrame;
use crate::error::AudioError;

/// Samples per frame for a frame duration at a sample rate,
/// `max(1, floor(sample_rate * frame_ms / 1000))`.
pub fn frame_size_for(sample_rate: u32, frame_ms: u32) -> usize {
    ((sample_rate as u64 * frame_ms as u64) / 1000).max(1) as usize
}

/// Collects arbitrary-length sample chunks into fixed-size frames.
///
/// Leftover samples are kept across pushes and never emitted early.
pub struct FrameAccumulator {
    buf: Box<[f32]>,
    /// Write offset into `buf`
    pos: usize,
    frames_emitted: u64,
}

impl FrameAccumulator {
    pub fn new(frame_size: usize) -> Self {
        Self {
            buf: vec![0.0; frame_size.max(1)].into_boxed_slice(),
            pos: 0,
            frames_emitted: 0,
        }
    }

    /// Accumulator sized for `frame_ms` of audio at `sample_rate`
    pub fn with_duration(sample_rate: u32, frame_ms: u32) -> Self {
        Self::new(frame_size_for(sample_rate, frame_ms))
    }

    /// Copy `samples` in, calling `emit` with an owned copy of every frame
    /// that fills up. Returns the number of frames emitted.
    pub fn push<F>(&mut self, samples: &[f32], mut emit: F) -> usize
    where
        F: FnMut(Vec<f32>),
    {
        let frame_size = self.buf.len();
        let mut offset = 0;
        let mut emitted = 0;

        while offset < samples.len() {
            let take = (frame_size - self.pos).min(samples.len() - offset);
            self.buf[self.pos..self.pos + take].copy_from_slice(&samples[offset..offset + take]);
            self.pos += take;
            offset += take;

            if self.pos == frame_size {
                // The buffer is reused immediately, so the frame must be a copy
                emit(self.buf.to_vec());
                self.pos = 0;
                emitted += 1;
            }
        }

        self.frames_emitted += emitted as u64;
        emitted
    }

    /// Convenience wrapper around [`push`](Self::push) that collects frames
    pub fn push_collect(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        self.push(samples, |frame| frames.push(frame));
        frames
    }

    pub fn frame_size(&self) -> usize {
        self.buf.len()
    }

    /// Samples held back waiting for the next frame to fill
    pub fn pending(&self) -> usize {
        self.pos
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }
}

/// Copy channel 0 of interleaved audio into `out`, replacing its contents
pub fn first_channel_into(interleaved: &[f32], channels: u16, out: &mut Vec<f32>) {
    out.clear();
    let channels = channels.max(1) as usize;
    out.extend(interleaved.iter().step_by(channels).copied());
}

/// Mono microphone capture feeding fixed-duration frames into a channel
pub struct MicCapture {
    device_id: Option<String>,

    /// Whether capture is running
    running: Arc<AtomicBool>,

    /// Stream thread handle
    thread_handle: Option<JoinHandle<()>>,

    frames_rx: Receiver<CaptureFrame>,
    frames_tx: crossbeam_channel::Sender<CaptureFrame>,

    /// Channel for stream errors
    error_rx: Option<Receiver<AudioError>>,

    frames_captured: Arc<AtomicU64>,
    frames_dropped: Arc<AtomicU64>,

    config: StreamConfig,
    frame_ms: u32,
}

impl MicCapture {
    /// Prepare capture on `device_id`, or the default input device when `None`.
    ///
    /// The stream runs at the device's native rate and channel count; frames
    /// carry `frame_ms` of mono audio at that rate.
    pub fn new(
        device_id: Option<&str>,
        frame_ms: u32,
        channel_capacity: usize,
    ) -> Result<Self, AudioError> {
        let device = open_input(device_id)?;
        let default_config = device.default_input_config()?;
        let config: StreamConfig = default_config.config();

        tracing::info!(
            "Input device {}: {}Hz, {} channels",
            device.name,
            config.sample_rate.0,
            config.channels
        );

        let (frames_tx, frames_rx) = bounded(channel_capacity.max(1));

        Ok(Self {
            device_id: device_id.map(str::to_string),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            frames_rx,
            frames_tx,
            error_rx: None,
            frames_captured: Arc::new(AtomicU64::new(0)),
            frames_dropped: Arc::new(AtomicU64::new(0)),
            config,
            frame_ms,
        })
    }

    /// Start capturing audio
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        let device = open_input(self.device_id.as_deref())?;
        let (error_tx, error_rx) = bounded::<AudioError>(16);
        self.error_rx = Some(error_rx);

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let frames_tx = self.frames_tx.clone();
        let frames_captured = self.frames_captured.clone();
        let frames_dropped = self.frames_dropped.clone();
        let config = self.config.clone();
        let channels = self.config.channels;
        let sample_rate = self.config.sample_rate.0;
        let frame_ms = self.frame_ms;

        self.frames_captured.store(0, Ordering::SeqCst);
        self.frames_dropped.store(0, Ordering::SeqCst);

        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let cpal_device = device.into_inner();
                let start_time = Instant::now();
                let mut accumulator = FrameAccumulator::with_duration(sample_rate, frame_ms);
                let mut mono = Vec::with_capacity(accumulator.frame_size() * 4);
                let mut sequence: u64 = 0;

                let stream = cpal_device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }

                        first_channel_into(data, channels, &mut mono);
                        let timestamp = start_time.elapsed().as_micros() as u64;

                        accumulator.push(&mono, |samples| {
                            let frame = CaptureFrame::new(samples, sample_rate, timestamp, sequence);
                            sequence += 1;
                            match frames_tx.try_send(frame) {
                                Ok(()) => {
                                    frames_captured.fetch_add(1, Ordering::Relaxed);
                                }
                                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                                    frames_dropped.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        });
                    },
                    move |err| {
                        let _ = error_tx.try_send(AudioError::StreamError(err.to_string()));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start capture stream: {}", e);
                            return;
                        }

                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build capture stream: {}", e);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receiving end of the captured frame channel
    pub fn frames(&self) -> Receiver<CaptureFrame> {
        self.frames_rx.clone()
    }

    /// Native capture rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn frame_size(&self) -> usize {
        frame_size_for(self.sample_rate(), self.frame_ms)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Frames lost because the consumer fell behind
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Check for errors
    pub fn check_errors(&self) -> Option<AudioError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_input(device_id: Option<&str>) -> Result<AudioDevice, AudioError> {
    match device_id {
        Some(id) => get_device_by_id(id),
        None => get_default_input_device(),
    }
}

//! cpal-backed output timeline
//!
//! The output clock is the number of frames the device callback has
//! rendered, divided by the device rate. Scheduled chunks are resampled to
//! the device rate before they are queued, so the callback only copies.
//! A chunk scheduled where the previous one ends continues the same
//! resampler stream and starts on the device frame right after it.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::device::{get_default_output_device, get_device_by_id, AudioDevice};
use crate::audio::playback::{OutputTimeline, ScheduleHandle};
use crate::audio::resample::StreamResampler;
use crate::audio::types::DecodedBuffer;
use crate::error::AudioError;

/// A chunk waiting to be rendered, already at the device rate
struct PendingChunk {
    start_frame: u64,
    /// One plane per source channel
    planes: Vec<Vec<f32>>,
}

impl PendingChunk {
    fn len(&self) -> u64 {
        self.planes.first().map_or(0, |p| p.len() as u64)
    }

    fn end_frame(&self) -> u64 {
        self.start_frame + self.len()
    }
}

/// Turns scheduled buffers into device-rate chunks
struct DeviceFeed {
    device_rate: u32,
    /// One per source channel
    resamplers: Vec<StreamResampler>,
    /// Device frame right after the last queued sample of the current run
    next_frame: Option<u64>,
    /// Source time where the current run ends
    run_end: f64,
}

impl DeviceFeed {
    fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            resamplers: Vec::new(),
            next_frame: None,
            run_end: 0.0,
        }
    }

    fn frame_at(&self, at: f64) -> u64 {
        (at.max(0.0) * self.device_rate as f64).round() as u64
    }

    fn continues_run(&self, buffer: &DecodedBuffer, at: f64) -> bool {
        self.next_frame.is_some()
            && (at - self.run_end).abs() < 0.5 / self.device_rate as f64
            && self.resamplers.len() == buffer.planes.len()
            && self
                .resamplers
                .first()
                .is_some_and(|r| r.in_rate() == buffer.sample_rate)
    }

    /// Resample `buffer` for playback at source time `at`.
    ///
    /// A gap, overlap or format change starts a new run; the few samples the
    /// previous run still held back are dropped.
    fn prepare(&mut self, buffer: &DecodedBuffer, at: f64) -> Option<PendingChunk> {
        let start_frame = match self.next_frame {
            Some(frame) if self.continues_run(buffer, at) => frame,
            _ => {
                self.resamplers = buffer
                    .planes
                    .iter()
                    .map(|_| StreamResampler::new(buffer.sample_rate, self.device_rate))
                    .collect();
                self.frame_at(at)
            }
        };

        let planes = self
            .resamplers
            .iter_mut()
            .zip(&buffer.planes)
            .map(|(resampler, plane)| resampler.process(plane))
            .collect();
        let chunk = PendingChunk {
            start_frame,
            planes,
        };

        self.next_frame = Some(chunk.end_frame());
        self.run_end = at + buffer.duration();
        (chunk.len() > 0).then_some(chunk)
    }
}

struct Shared {
    frames_rendered: AtomicU64,
    incoming: SegQueue<PendingChunk>,
    next_id: AtomicU64,
    running: AtomicBool,
    chunks_missed: AtomicU64,
}

struct StreamThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Output timeline over a cpal output stream.
///
/// Clones share the same stream; the stream stops when the last clone drops.
#[derive(Clone)]
pub struct CpalTimeline {
    shared: Arc<Shared>,
    feed: Arc<Mutex<DeviceFeed>>,
    sample_rate: u32,
    channels: u16,
    _stream: Arc<StreamThread>,
}

impl CpalTimeline {
    /// Open `device_id`, or the default output device when `None`, and start
    /// rendering silence immediately so the clock runs.
    pub fn open(device_id: Option<&str>) -> Result<Self, AudioError> {
        let device = match device_id {
            Some(id) => get_device_by_id(id)?,
            None => get_default_output_device()?,
        };
        let config: StreamConfig = device.default_output_config()?.config();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels;

        tracing::info!(
            "Output device {}: {}Hz, {} channels",
            device.name,
            sample_rate,
            channels
        );

        let shared = Arc::new(Shared {
            frames_rendered: AtomicU64::new(0),
            incoming: SegQueue::new(),
            next_id: AtomicU64::new(0),
            running: AtomicBool::new(true),
            chunks_missed: AtomicU64::new(0),
        });

        let handle = spawn_stream(device, config, shared.clone())?;

        Ok(Self {
            shared: shared.clone(),
            feed: Arc::new(Mutex::new(DeviceFeed::new(sample_rate))),
            sample_rate,
            channels,
            _stream: Arc::new(StreamThread {
                shared,
                handle: Some(handle),
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Chunks whose whole span had already been rendered when they reached
    /// the callback
    pub fn chunks_missed(&self) -> u64 {
        self.shared.chunks_missed.load(Ordering::Relaxed)
    }
}

impl OutputTimeline for CpalTimeline {
    fn now(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Relaxed) as f64 / self.sample_rate as f64
    }

    fn schedule(&mut self, buffer: DecodedBuffer, at: f64) -> ScheduleHandle {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let duration = buffer.duration();

        if let Some(chunk) = self.feed.lock().prepare(&buffer, at) {
            self.shared.incoming.push(chunk);
        }

        ScheduleHandle {
            id,
            start: at,
            end: at + duration,
        }
    }
}

fn spawn_stream(
    device: AudioDevice,
    config: StreamConfig,
    shared: Arc<Shared>,
) -> Result<JoinHandle<()>, AudioError> {
    thread::Builder::new()
        .name("playback-output".to_string())
        .spawn(move || {
            let cpal_device = device.into_inner();
            let channels = config.channels.max(1) as usize;
            let render_shared = shared.clone();
            let mut active: VecDeque<PendingChunk> = VecDeque::with_capacity(64);

            let stream = cpal_device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(data, channels, &render_shared, &mut active);
                },
                move |err| {
                    tracing::error!("Output stream error: {}", err);
                },
                None,
            );

            match stream {
                Ok(stream) => {
                    if let Err(e) = stream.play() {
                        tracing::error!("Failed to start output stream: {}", e);
                        return;
                    }

                    while shared.running.load(Ordering::Relaxed) {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to build output stream: {}", e);
                }
            }
        })
        .map_err(|e| AudioError::StreamError(e.to_string()))
}

/// Fill one device buffer from the active chunks and advance the clock
fn render(data: &mut [f32], channels: usize, shared: &Shared, active: &mut VecDeque<PendingChunk>) {
    data.fill(0.0);

    let base = shared.frames_rendered.load(Ordering::Relaxed);
    let frames = (data.len() / channels) as u64;
    let end = base + frames;

    while let Some(chunk) = shared.incoming.pop() {
        if chunk.end_frame() <= base {
            shared.chunks_missed.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let pos = active
            .iter()
            .position(|c| c.start_frame > chunk.start_frame)
            .unwrap_or(active.len());
        active.insert(pos, chunk);
    }

    for chunk in active.iter() {
        if chunk.start_frame >= end {
            break;
        }
        let from = chunk.start_frame.max(base);
        let to = chunk.end_frame().min(end);
        let last_plane = chunk.planes.len().saturating_sub(1);

        for t in from..to {
            let src = (t - chunk.start_frame) as usize;
            let dst = (t - base) as usize * channels;
            for ch in 0..channels {
                data[dst + ch] += chunk.planes[ch.min(last_plane)][src];
            }
        }
    }

    while active.front().is_some_and(|c| c.end_frame() <= end) {
        active.pop_front();
    }

    shared.frames_rendered.fetch_add(frames, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::resample::resample_linear;

    fn shared() -> Shared {
        Shared {
            frames_rendered: AtomicU64::new(0),
            incoming: SegQueue::new(),
            next_id: AtomicU64::new(0),
            running: AtomicBool::new(true),
            chunks_missed: AtomicU64::new(0),
        }
    }

    #[test]
    fn test_render_places_chunk_at_start_frame() {
        let shared = shared();
        let mut active = VecDeque::new();
        shared.incoming.push(PendingChunk {
            start_frame: 2,
            planes: vec![vec![0.5, 0.25, 0.125]],
        });

        let mut data = vec![1.0f32; 8]; // 4 stereo frames
        render(&mut data, 2, &shared, &mut active);
        assert_eq!(data, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5, 0.25, 0.25]);
        assert_eq!(shared.frames_rendered.load(Ordering::Relaxed), 4);

        let mut data = vec![0.0f32; 4];
        render(&mut data, 2, &shared, &mut active);
        assert_eq!(data, vec![0.125, 0.125, 0.0, 0.0]);
        assert!(active.is_empty());
    }

    #[test]
    fn test_render_drops_missed_chunks() {
        let shared = shared();
        shared.frames_rendered.store(100, Ordering::Relaxed);
        let mut active = VecDeque::new();
        shared.incoming.push(PendingChunk {
            start_frame: 10,
            planes: vec![vec![0.5; 20]],
        });

        let mut data = vec![0.0f32; 4];
        render(&mut data, 1, &shared, &mut active);
        assert!(data.iter().all(|&s| s == 0.0));
        assert_eq!(shared.chunks_missed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_adjacent_chunks_resample_as_one_signal() {
        let whole: Vec<f32> = (0..960).map(|i| i as f32 / 960.0).collect();
        let expected = resample_linear(&whole, 24_000, 48_000);
        let mut feed = DeviceFeed::new(48_000);

        let first = feed
            .prepare(&DecodedBuffer::mono(whole[..480].to_vec(), 24_000), 1.0)
            .unwrap();
        let second = feed
            .prepare(&DecodedBuffer::mono(whole[480..].to_vec(), 24_000), 1.02)
            .unwrap();

        assert_eq!(first.start_frame, 48_000);
        assert_eq!(second.start_frame, first.end_frame());

        let played: Vec<f32> = first.planes[0]
            .iter()
            .chain(&second.planes[0])
            .copied()
            .collect();
        for j in 950..970 {
            assert!(
                (played[j] - expected[j]).abs() < 1e-6,
                "frame {}: {} vs {}",
                j,
                played[j],
                expected[j]
            );
        }
    }

    #[test]
    fn test_gap_starts_new_run() {
        let mut feed = DeviceFeed::new(48_000);
        let first = feed
            .prepare(&DecodedBuffer::mono(vec![0.5; 480], 24_000), 0.0)
            .unwrap();
        assert_eq!(first.start_frame, 0);

        // 10 ms of silence between the two chunks
        let second = feed
            .prepare(&DecodedBuffer::mono(vec![0.5; 480], 24_000), 0.03)
            .unwrap();
        assert_eq!(second.start_frame, 1440);
        assert_eq!(second.len(), 958);

        // A rate change also restarts, even when contiguous
        let third = feed
            .prepare(&DecodedBuffer::mono(vec![0.5; 960], 48_000), 0.05)
            .unwrap();
        assert_eq!(third.start_frame, 2400);
        assert_eq!(third.len(), 960);
    }
}

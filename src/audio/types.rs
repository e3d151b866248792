//! Frame and buffer types shared by the uplink and downlink paths

/// One fixed-size frame of captured mono audio
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureFrame {
    /// Mono f32 samples, exactly the accumulator's frame size
    pub samples: Vec<f32>,
    /// Rate the samples were captured at
    pub sample_rate: u32,
    /// Timestamp in microseconds since capture start
    pub timestamp: u64,
    /// Frame sequence number
    pub sequence: u64,
}

impl CaptureFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, timestamp: u64, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp,
            sequence,
        }
    }

    /// Get frame duration in microseconds
    pub fn duration_us(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1_000_000) / self.sample_rate as u64
    }
}

/// Decoded PCM ready for scheduling, stored planar (one `Vec` per channel)
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedBuffer {
    pub sample_rate: u32,
    pub planes: Vec<Vec<f32>>,
}

impl DecodedBuffer {
    /// Wrap a single mono plane
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            planes: vec![samples],
        }
    }

    /// Split interleaved samples into planes
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1) as usize;
        let frames = samples.len() / channels;
        let mut planes = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (plane, &sample) in planes.iter_mut().zip(frame) {
                plane.push(sample);
            }
        }
        Self {
            sample_rate,
            planes,
        }
    }

    pub fn channel_count(&self) -> u16 {
        self.planes.len() as u16
    }

    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn plane(&self, channel: usize) -> Option<&[f32]> {
        self.planes.get(channel).map(Vec::as_slice)
    }
}

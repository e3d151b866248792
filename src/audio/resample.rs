//! Linear-interpolation resampling to the transport rate
//!
//! [`resample_linear`] is stateless: every call treats its input as a
//! self-contained block, which is what the uplink does with each captured
//! frame. [`StreamResampler`] carries its phase across blocks for playback,
//! where consecutive chunks form one continuous signal.

/// Number of output samples produced for `input_len` samples,
/// `round(input_len * out_rate / in_rate)`.
pub fn output_len(input_len: usize, in_rate: u32, out_rate: u32) -> usize {
    if in_rate == 0 {
        return 0;
    }
    (input_len as f64 * out_rate as f64 / in_rate as f64).round() as usize
}

/// Resample mono `input` from `in_rate` to `out_rate` by linear interpolation.
///
/// Output sample `j` reads source position `p = j * in_rate / out_rate` and
/// blends `input[floor(p)]` with its right neighbour, which is clamped to the
/// last input sample. Empty input or a zero rate yields an empty output.
pub fn resample_linear(input: &[f32], in_rate: u32, out_rate: u32) -> Vec<f32> {
    if input.is_empty() || in_rate == 0 || out_rate == 0 {
        return Vec::new();
    }
    if in_rate == out_rate {
        return input.to_vec();
    }

    let len = output_len(input.len(), in_rate, out_rate);
    let step = in_rate as f64 / out_rate as f64;
    let last = input.len() - 1;

    (0..len)
        .map(|j| {
            let pos = j as f64 * step;
            let k = (pos.floor() as usize).min(last);
            let frac = (pos - k as f64) as f32;
            let next = (k + 1).min(last);
            input[k] * (1.0 - frac) + input[next] * frac
        })
        .collect()
}

/// Linear resampler over a stream of blocks.
///
/// Feeding a signal block by block yields the same samples as
/// [`resample_linear`] over the whole signal. An output whose right
/// neighbour lies in the next block is held back until that block arrives.
#[derive(Debug, Clone)]
pub struct StreamResampler {
    in_rate: u32,
    out_rate: u32,
    /// Source position of the next output relative to the start of the next
    /// block, in units of `1 / out_rate` input samples. Negative means it
    /// falls between `last` and the first sample of the next block.
    phase: i64,
    last: Option<f32>,
}

impl StreamResampler {
    pub fn new(in_rate: u32, out_rate: u32) -> Self {
        Self {
            in_rate,
            out_rate,
            phase: 0,
            last: None,
        }
    }

    pub fn in_rate(&self) -> u32 {
        self.in_rate
    }

    /// Resample the next block of the stream
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if input.is_empty() || self.in_rate == 0 || self.out_rate == 0 {
            return Vec::new();
        }
        if self.in_rate == self.out_rate {
            self.last = input.last().copied();
            return input.to_vec();
        }

        let scale = i64::from(self.out_rate);
        let step = i64::from(self.in_rate);
        let n = input.len() as i64;
        let mut output = Vec::with_capacity(output_len(input.len(), self.in_rate, self.out_rate) + 1);

        loop {
            let k = self.phase.div_euclid(scale);
            if k + 1 >= n {
                break;
            }
            let frac = self.phase.rem_euclid(scale) as f32 / scale as f32;
            let left = match (k, self.last) {
                (-1, Some(last)) => last,
                (-1, None) => input[0],
                _ => input[k as usize],
            };
            let right = input[(k + 1) as usize];
            output.push(left * (1.0 - frac) + right * frac);
            self.phase += step;
        }

        self.phase -= n * scale;
        self.last = input.last().copied();
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_output_len() {
        assert_eq!(output_len(960, 48_000, 24_000), 480);
        assert_eq!(output_len(4096, 44_100, 24_000), 2229);
        assert_eq!(output_len(441, 44_100, 24_000), 240);
        assert_eq!(output_len(10, 0, 24_000), 0);
    }

    #[test]
    fn test_downsample_by_two_picks_even_samples() {
        let input: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let out = resample_linear(&input, 48_000, 24_000);
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_upsample_interpolates_and_clamps() {
        let out = resample_linear(&[0.0, 1.0], 12_000, 24_000);
        assert_eq!(out.len(), 4);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
        assert!((out[2] - 1.0).abs() < 1e-6);
        // Right neighbour clamped to the last sample
        assert!((out[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_edge_cases() {
        assert!(resample_linear(&[], 48_000, 24_000).is_empty());
        assert_eq!(resample_linear(&[0.3, 0.4], 24_000, 24_000), vec![0.3, 0.4]);
        assert_eq!(resample_linear(&[0.7], 16_000, 24_000), vec![0.7, 0.7]);
    }

    #[test]
    fn test_stream_matches_whole_signal_across_blocks() {
        let whole: Vec<f32> = (0..960).map(|i| i as f32 / 960.0).collect();
        let expected = resample_linear(&whole, 24_000, 48_000);

        let mut stream = StreamResampler::new(24_000, 48_000);
        let mut chunked = stream.process(&whole[..480]);
        assert_eq!(chunked.len(), 958);
        chunked.extend(stream.process(&whole[480..]));

        // The two outputs at source position 959 and after wait for more input
        assert_eq!(chunked.len(), expected.len() - 2);
        for (j, (a, b)) in chunked.iter().zip(&expected).enumerate() {
            assert!((a - b).abs() < 1e-6, "sample {}: {} vs {}", j, a, b);
        }
        assert!((chunked[959] - 0.49947917).abs() < 1e-6);
    }

    #[test]
    fn test_stream_downsample_keeps_phase() {
        let input: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let mut stream = StreamResampler::new(48_000, 24_000);

        let mut out = stream.process(&input[..3]);
        out.extend(stream.process(&input[3..]));
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_stream_edge_cases() {
        let mut stream = StreamResampler::new(24_000, 48_000);
        assert_eq!(stream.process(&[0.0, 1.0]), vec![0.0, 0.5]);
        assert!(stream.process(&[]).is_empty());
        // The held sample bridges into the next block
        assert_eq!(stream.process(&[1.0]), vec![1.0, 1.0]);
        assert!(StreamResampler::new(0, 48_000).process(&[1.0]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_dc_signal_is_preserved(
            value in -1.0f32..1.0,
            len in 1usize..2048,
            in_rate in prop::sample::select(vec![8_000u32, 16_000, 22_050, 44_100, 48_000, 96_000]),
            out_rate in prop::sample::select(vec![8_000u32, 16_000, 24_000, 48_000]),
        ) {
            let input = vec![value; len];
            let out = resample_linear(&input, in_rate, out_rate);
            prop_assert_eq!(out.len(), output_len(len, in_rate, out_rate));
            for sample in out {
                prop_assert!((sample - value).abs() < 1e-5);
            }
        }

        #[test]
        fn prop_stream_blocks_match_whole_signal(
            signal in prop::collection::vec(-1.0f32..1.0, 2..600),
            split in 1usize..600,
            in_rate in prop::sample::select(vec![16_000u32, 22_050, 24_000, 44_100, 48_000]),
            out_rate in prop::sample::select(vec![16_000u32, 24_000, 44_100, 48_000]),
        ) {
            let split = split.min(signal.len() - 1);
            let expected = resample_linear(&signal, in_rate, out_rate);

            let mut stream = StreamResampler::new(in_rate, out_rate);
            let mut chunked = stream.process(&signal[..split]);
            chunked.extend(stream.process(&signal[split..]));

            for (a, b) in chunked.iter().zip(&expected) {
                prop_assert!((a - b).abs() < 1e-4);
            }
        }
    }
}

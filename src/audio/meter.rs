//! Microphone level for activity indicators

/// RMS below this is treated as silence
const NOISE_FLOOR: f32 = 0.005;

/// RMS span above the floor that maps to full scale
const FULL_SCALE_SPAN: f32 = 0.03;

/// Weight of the previous level in the moving average
const SMOOTHING: f32 = 0.8;

/// Smoothed 0..=1 input level
#[derive(Debug, Clone, Default)]
pub struct InputLevel {
    level: f32,
}

impl InputLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root mean square of a block
    pub fn rms(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = samples.iter().map(|s| s * s).sum();
        (sum / samples.len() as f32).sqrt()
    }

    /// Gate and normalize a block's RMS into 0..=1
    pub fn instantaneous(samples: &[f32]) -> f32 {
        ((Self::rms(samples) - NOISE_FLOOR) / FULL_SCALE_SPAN).clamp(0.0, 1.0)
    }

    /// Fold a block into the smoothed level and return it
    pub fn update(&mut self, samples: &[f32]) -> f32 {
        let level = Self::instantaneous(samples);
        self.level = self.level * SMOOTHING + level * (1.0 - SMOOTHING);
        self.level
    }

    pub fn level(&self) -> f32 {
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(InputLevel::instantaneous(&[0.0; 480]), 0.0);
        assert_eq!(InputLevel::instantaneous(&[0.004; 480]), 0.0);
        assert_eq!(InputLevel::instantaneous(&[]), 0.0);
    }

    #[test]
    fn test_loud_input_saturates() {
        assert_eq!(InputLevel::instantaneous(&[0.5; 480]), 1.0);
    }

    #[test]
    fn test_smoothing() {
        let mut meter = InputLevel::new();
        let first = meter.update(&[0.5; 480]);
        assert!((first - 0.2).abs() < 1e-6);
        let second = meter.update(&[0.5; 480]);
        assert!((second - 0.36).abs() < 1e-6);
        let decayed = meter.update(&[0.0; 480]);
        assert!((decayed - 0.288).abs() < 1e-6);
    }
}

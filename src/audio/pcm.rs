//! 16-bit PCM encoding for the uplink envelope

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::{BufMut, Bytes, BytesMut};

/// Convert one float sample to i16.
///
/// Clamps to [-1, 1], scales negative values by 32768 and positive values by
/// 32767, then rounds. Non-finite input maps to 0.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 { s * 32768.0 } else { s * 32767.0 };
    scaled.round() as i16
}

/// Encode float samples as little-endian signed 16-bit PCM
pub fn encode_pcm16(samples: &[f32]) -> Bytes {
    let mut out = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        out.put_i16_le(f32_to_i16(sample));
    }
    out.freeze()
}

/// Standard (padded) base64 of a byte sequence
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// PCM16 little-endian, then base64, in one step
pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    encode_base64(&encode_pcm16(samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversion() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32768);
        assert_eq!(f32_to_i16(0.5), 16384);
        assert_eq!(f32_to_i16(-0.5), -16384);
    }

    #[test]
    fn test_clamps_and_rejects_non_finite() {
        assert_eq!(f32_to_i16(3.0), 32767);
        assert_eq!(f32_to_i16(-7.5), -32768);
        assert_eq!(f32_to_i16(f32::NAN), 0);
        assert_eq!(f32_to_i16(f32::INFINITY), 0);
        assert_eq!(f32_to_i16(f32::NEG_INFINITY), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        let bytes = encode_pcm16(&[1.0, -1.0, 0.0]);
        assert_eq!(&bytes[..], &[0xFF, 0x7F, 0x00, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_base64() {
        assert_eq!(encode_pcm16_base64(&[1.0, -1.0, 0.0]), "/38AgAAA");
        assert_eq!(encode_pcm16_base64(&[]), "");
    }
}

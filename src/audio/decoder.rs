//! # PCM16 Sample Decoding
//!
//! Converts raw little-endian PCM16 bytes (as received from clients) into
//! normalized 32-bit float samples.
//!
//! ## Conversion:
//! Each pair of bytes is a signed 16-bit integer `s` in `[-32768, 32767]`,
//! mapped to `s / 32768.0`, so every sample lands in `[-1.0, 1.0)`.

use byteorder::{ByteOrder, LittleEndian};

/// Scale factor between the i16 range and the normalized float range.
pub const PCM16_SCALE: f32 = 32768.0;

/// Decode a little-endian PCM16 byte buffer into normalized float samples.
///
/// ## Odd-length input:
/// A trailing byte that doesn't form a whole sample is ignored. This never
/// fails; an empty buffer decodes to an empty vector.
///
/// ## Rust Concepts:
/// - **chunks_exact(2)**: Iterates over whole 2-byte pairs and leaves the remainder out
/// - **LittleEndian::read_i16**: Interprets a 2-byte slice as a little-endian i16
pub fn decode_pcm16(buffer: &[u8]) -> Vec<f32> {
    buffer
        .chunks_exact(2)
        .map(|pair| LittleEndian::read_i16(pair) as f32 / PCM16_SCALE)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_decode_known_values() {
        let bytes = pcm_bytes(&[0, 16384, -16384, 32767, -32768]);
        let samples = decode_pcm16(&bytes);

        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[1], 0.5);
        assert_eq!(samples[2], -0.5);
        assert!((samples[3] - 0.999_969_5).abs() < 1e-6);
        assert_eq!(samples[4], -1.0);
    }

    #[test]
    fn test_decode_length_and_range() {
        // Every byte value pattern, walked in pairs
        let bytes: Vec<u8> = (0..=255u8).chain((0..=255u8).rev()).collect();
        let samples = decode_pcm16(&bytes);

        assert_eq!(samples.len(), bytes.len() / 2);
        for sample in samples {
            assert!((-1.0..1.0).contains(&sample), "sample out of range: {}", sample);
        }
    }

    #[test]
    fn test_odd_length_truncates_last_byte() {
        let mut bytes = pcm_bytes(&[1000, -1000]);
        bytes.push(0x7f);

        let samples = decode_pcm16(&bytes);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples, decode_pcm16(&bytes[..4]));
    }

    #[test]
    fn test_empty_buffer() {
        assert!(decode_pcm16(&[]).is_empty());
        assert!(decode_pcm16(&[0x01]).is_empty());
    }
}

//! G.711 mu-law decoding.
//!
//! Expands 8-bit mu-law samples (the PCMU codec negotiated by telephony
//! clients) to 16-bit linear PCM. The expansion follows ITU-T G.711: invert
//! the byte, split into sign/exponent/mantissa, and undo the bias of 0x84.

use byteorder::{LittleEndian, WriteBytesExt};

/// Bias added during mu-law companding.
const BIAS: i16 = 0x84;

/// Decode a single mu-law byte to a linear 16-bit sample.
pub fn decode_sample(encoded: u8) -> i16 {
    let inverted = !encoded;
    let sign = inverted & 0x80;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = inverted & 0x0F;

    let magnitude = (((mantissa as i16) << 3) + BIAS) << exponent;
    let sample = magnitude - BIAS;

    if sign != 0 {
        -sample
    } else {
        sample
    }
}

/// Decode a mu-law frame into 16-bit little-endian PCM bytes, the layout the
/// recognition backend expects on its binary channel.
pub fn decode_to_pcm16_le(data: &[u8]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        // Vec<u8> writes cannot fail
        pcm.write_i16::<LittleEndian>(decode_sample(byte))
            .expect("write to Vec");
    }
    pcm
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian, ReadBytesExt};
    use std::io::Cursor;

    #[test]
    fn test_silence_decodes_near_zero() {
        // 0xFF is positive zero, 0x7F is negative zero in mu-law
        assert_eq!(decode_sample(0xFF), 0);
        assert_eq!(decode_sample(0x7F), 0);
    }

    #[test]
    fn test_extremes_decode_to_full_scale() {
        // 0x00 is the largest negative value, 0x80 the largest positive
        assert_eq!(decode_sample(0x00), -8031 << 2);
        assert_eq!(decode_sample(0x80), 8031 << 2);
    }

    #[test]
    fn test_sign_symmetry() {
        for value in 0u8..=0x7F {
            let positive = decode_sample(value | 0x80);
            let negative = decode_sample(value);
            assert_eq!(positive, -negative, "asymmetry at {:#04x}", value);
        }
    }

    #[test]
    fn test_decode_frame_layout() {
        let pcm = decode_to_pcm16_le(&[0xFF, 0x00, 0x80]);
        assert_eq!(pcm.len(), 6);

        let mut cursor = Cursor::new(pcm);
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), 0);
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), -8031 << 2);
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), 8031 << 2);
    }
}

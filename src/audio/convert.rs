// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Lossy conversion between float samples and PCM bytes.
//!
//! Floats are clamped to [-1.0, 1.0] when encoding. Integer formats are scaled
//! symmetrically (e.g. by 32767 for 16-bit), so full scale negative values are
//! never produced.

use super::format::{AudioFormat, SampleEncoding};

const SCALE_8: f32 = 127.0;
const SCALE_16: f32 = 32767.0;
const SCALE_24: f32 = 8_388_607.0;
const SCALE_32: f64 = 2_147_483_647.0;

/// Converts single-channel runs of samples for one sample layout.
#[derive(Debug, Clone, Copy)]
pub struct PcmConverter {
    bits: u16,
    encoding: SampleEncoding,
    big_endian: bool,
}

impl PcmConverter {
    pub fn new(format: &AudioFormat) -> Self {
        PcmConverter {
            bits: format.bits_per_sample(),
            encoding: format.encoding(),
            big_endian: format.is_big_endian(),
        }
    }

    /// Size in bytes of one encoded sample.
    pub fn sample_size(&self) -> usize {
        (self.bits as usize).div_ceil(8)
    }

    /// Encodes `src` into `dst`, which must hold `src.len() * sample_size()` bytes.
    pub fn encode(&self, src: &[f32], dst: &mut [u8]) {
        let size = self.sample_size();
        for (sample, out) in src.iter().zip(dst.chunks_exact_mut(size)) {
            self.encode_one(sample.clamp(-1.0, 1.0), out);
        }
    }

    /// Decodes `src` into `dst`. Decodes as many whole samples as both sides allow.
    pub fn decode(&self, src: &[u8], dst: &mut [f32]) {
        let size = self.sample_size();
        for (bytes, out) in src.chunks_exact(size).zip(dst.iter_mut()) {
            *out = self.decode_one(bytes);
        }
    }

    fn encode_one(&self, value: f32, out: &mut [u8]) {
        match (self.encoding, self.bits) {
            (SampleEncoding::Signed, 8) => out[0] = ((value * SCALE_8) as i8) as u8,
            (SampleEncoding::Unsigned, 8) => out[0] = ((value * SCALE_8) as i16 + 128) as u8,
            (SampleEncoding::Signed, 16) => {
                self.put(out, &((value * SCALE_16) as i16).to_le_bytes());
            }
            (SampleEncoding::Unsigned, 16) => {
                let v = ((value * SCALE_16) as i32 + 32768) as u16;
                self.put(out, &v.to_le_bytes());
            }
            (SampleEncoding::Signed, 24) => {
                let v = (value * SCALE_24) as i32;
                self.put(out, &v.to_le_bytes()[..3]);
            }
            (SampleEncoding::Unsigned, 24) => {
                let v = ((value * SCALE_24) as i32 + 8_388_608) as u32;
                self.put(out, &v.to_le_bytes()[..3]);
            }
            (SampleEncoding::Signed, 32) => {
                self.put(out, &((value as f64 * SCALE_32) as i32).to_le_bytes());
            }
            (SampleEncoding::Unsigned, 32) => {
                let v = ((value as f64 * SCALE_32) as i64 + 2_147_483_648) as u32;
                self.put(out, &v.to_le_bytes());
            }
            (SampleEncoding::Float, 32) => self.put(out, &value.to_le_bytes()),
            (SampleEncoding::Float, 64) => self.put(out, &(value as f64).to_le_bytes()),
            _ => out.fill(0),
        }
    }

    fn decode_one(&self, bytes: &[u8]) -> f32 {
        let mut le = [0u8; 8];
        let size = self.sample_size();
        le[..size].copy_from_slice(&bytes[..size]);
        if self.big_endian {
            le[..size].reverse();
        }

        match (self.encoding, self.bits) {
            (SampleEncoding::Signed, 8) => (le[0] as i8) as f32 / SCALE_8,
            (SampleEncoding::Unsigned, 8) => (le[0] as i16 - 128) as f32 / SCALE_8,
            (SampleEncoding::Signed, 16) => i16::from_le_bytes([le[0], le[1]]) as f32 / SCALE_16,
            (SampleEncoding::Unsigned, 16) => {
                (u16::from_le_bytes([le[0], le[1]]) as i32 - 32768) as f32 / SCALE_16
            }
            (SampleEncoding::Signed, 24) => {
                // Sign extend from the top byte.
                let v = i32::from_le_bytes([0, le[0], le[1], le[2]]) >> 8;
                v as f32 / SCALE_24
            }
            (SampleEncoding::Unsigned, 24) => {
                let v = u32::from_le_bytes([le[0], le[1], le[2], 0]) as i32 - 8_388_608;
                v as f32 / SCALE_24
            }
            (SampleEncoding::Signed, 32) => {
                (i32::from_le_bytes([le[0], le[1], le[2], le[3]]) as f64 / SCALE_32) as f32
            }
            (SampleEncoding::Unsigned, 32) => {
                let v = u32::from_le_bytes([le[0], le[1], le[2], le[3]]) as i64 - 2_147_483_648;
                (v as f64 / SCALE_32) as f32
            }
            (SampleEncoding::Float, 32) => f32::from_le_bytes([le[0], le[1], le[2], le[3]]),
            (SampleEncoding::Float, 64) => f64::from_le_bytes(le) as f32,
            _ => 0.0,
        }
    }

    /// Writes little endian bytes in the configured byte order.
    #[inline]
    fn put(&self, out: &mut [u8], le_bytes: &[u8]) {
        out[..le_bytes.len()].copy_from_slice(le_bytes);
        if self.big_endian {
            out[..le_bytes.len()].reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(bits: u16, encoding: SampleEncoding, big_endian: bool) -> PcmConverter {
        PcmConverter::new(&AudioFormat::new(44100, 1, bits, encoding, big_endian).unwrap())
    }

    #[test]
    fn test_encode_16_bit_little_endian() {
        let conv = converter(16, SampleEncoding::Signed, false);
        let mut out = [0u8; 6];
        conv.encode(&[1.0, -1.0, 0.0], &mut out);
        assert_eq!(out, [0xff, 0x7f, 0x01, 0x80, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_clamps() {
        let conv = converter(16, SampleEncoding::Signed, false);
        let mut out = [0u8; 2];
        conv.encode(&[4.0], &mut out);
        assert_eq!(i16::from_le_bytes(out), 32767);
    }

    #[test]
    fn test_unsigned_silence_is_midpoint() {
        let conv = converter(8, SampleEncoding::Unsigned, false);
        let mut out = [0u8; 2];
        conv.encode(&[0.0, 0.0], &mut out);
        assert_eq!(out, [0x80, 0x80]);
    }

    #[test]
    fn test_decode_24_bit_big_endian() {
        let conv = converter(24, SampleEncoding::Signed, true);
        let mut out = [0.0f32; 2];
        // 0x7fffff (full scale) followed by 0xc00000 (-0.5 roughly).
        conv.decode(&[0x7f, 0xff, 0xff, 0xc0, 0x00, 0x00], &mut out);
        assert_eq!(out[0], 1.0);
        assert!((out[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_float_passthrough() {
        let conv = converter(32, SampleEncoding::Float, true);
        let mut bytes = [0u8; 4];
        conv.encode(&[0.25], &mut bytes);
        assert_eq!(bytes, 0.25f32.to_be_bytes());

        let mut out = [0.0f32; 1];
        conv.decode(&bytes, &mut out);
        assert_eq!(out[0], 0.25);
    }
}

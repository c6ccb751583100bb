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

use std::{fmt, str::FromStr};

/// Errors produced when describing an audio format.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Sample rate must be greater than 0")]
    ZeroSampleRate,

    #[error("Channel count must be greater than 0")]
    ZeroChannels,

    #[error("Unsupported {encoding} sample size: {bits} bits")]
    UnsupportedBits { encoding: SampleEncoding, bits: u16 },

    #[error("Unsupported sample encoding: {0}")]
    UnknownEncoding(String),
}

/// How individual samples are stored in a PCM byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Two's complement integer samples.
    Signed,
    /// Offset binary integer samples (silence is the midpoint).
    Unsigned,
    /// IEEE floating point samples.
    Float,
}

impl FromStr for SampleEncoding {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" | "Int" | "signed" | "Signed" => Ok(SampleEncoding::Signed),
            "unsigned" | "Unsigned" => Ok(SampleEncoding::Unsigned),
            "float" | "Float" => Ok(SampleEncoding::Float),
            _ => Err(FormatError::UnknownEncoding(s.to_string())),
        }
    }
}

impl SampleEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleEncoding::Signed => "signed",
            SampleEncoding::Unsigned => "unsigned",
            SampleEncoding::Float => "float",
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Describes a PCM stream: rate, channel layout, sample size, encoding and byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
    encoding: SampleEncoding,
    big_endian: bool,
}

impl AudioFormat {
    /// Creates a new audio format, rejecting combinations the converters can't handle.
    pub fn new(
        sample_rate: u32,
        channels: u16,
        bits_per_sample: u16,
        encoding: SampleEncoding,
        big_endian: bool,
    ) -> Result<Self, FormatError> {
        if sample_rate == 0 {
            return Err(FormatError::ZeroSampleRate);
        }
        if channels == 0 {
            return Err(FormatError::ZeroChannels);
        }

        let supported = match encoding {
            SampleEncoding::Signed | SampleEncoding::Unsigned => {
                matches!(bits_per_sample, 8 | 16 | 24 | 32)
            }
            SampleEncoding::Float => matches!(bits_per_sample, 32 | 64),
        };
        if !supported {
            return Err(FormatError::UnsupportedBits {
                encoding,
                bits: bits_per_sample,
            });
        }

        Ok(AudioFormat {
            sample_rate,
            channels,
            bits_per_sample,
            encoding,
            big_endian,
        })
    }

    /// 16-bit signed little endian at the given rate and channel count.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Result<Self, FormatError> {
        AudioFormat::new(sample_rate, channels, 16, SampleEncoding::Signed, false)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn encoding(&self) -> SampleEncoding {
        self.encoding
    }

    pub fn is_big_endian(&self) -> bool {
        self.big_endian
    }

    /// Number of bytes used by a single sample of a single channel.
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Number of bytes used by one frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }
}

impl Default for AudioFormat {
    /// 44.1kHz, stereo, 16-bit signed little endian.
    fn default() -> Self {
        AudioFormat {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            encoding: SampleEncoding::Signed,
            big_endian: false,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}-bit {} {}",
            self.sample_rate,
            self.channels,
            self.bits_per_sample,
            self.encoding,
            if self.big_endian { "BE" } else { "LE" }
        )
    }
}

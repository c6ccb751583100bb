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
use std::{str::FromStr, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::format::{AudioFormat, SampleEncoding};

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_BITS_PER_SAMPLE: u16 = 16;
const DEFAULT_LATENCY: Duration = Duration::from_millis(50);
const DEFAULT_WORK_BUFFER_FRAMES: usize = 512;

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Audio {
    /// The output device. Names starting with "mock" select a mock line.
    device: Option<String>,

    /// Output sample rate in Hz (default: 44100)
    sample_rate: Option<u32>,

    /// Output channel count (default: 2)
    channels: Option<u16>,

    /// Bits per sample (default: 16)
    bits_per_sample: Option<u16>,

    /// Sample format: "int", "unsigned" or "float" (default: "int")
    sample_format: Option<String>,

    /// Byte order of the PCM stream (default: little endian)
    big_endian: Option<bool>,

    /// How much audio the output line buffers ahead, e.g. "50ms".
    latency: Option<String>,

    /// Frames moved per pusher iteration (default: 512)
    work_buffer_frames: Option<usize>,
}

impl Audio {
    /// New will create a new Audio configuration for the given device.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            ..Default::default()
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns true if the configured device is a mock line.
    pub fn is_mock(&self) -> bool {
        self.device().starts_with("mock")
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS)
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample.unwrap_or(DEFAULT_BITS_PER_SAMPLE)
    }

    /// Returns the sample encoding (default: signed integer)
    pub fn sample_format(&self) -> Result<SampleEncoding, ConfigError> {
        match self.sample_format.as_deref() {
            Some(format) => Ok(SampleEncoding::from_str(format)?),
            None => Ok(SampleEncoding::Signed),
        }
    }

    pub fn big_endian(&self) -> bool {
        self.big_endian.unwrap_or(false)
    }

    /// Returns the full PCM format described by this configuration.
    pub fn format(&self) -> Result<AudioFormat, ConfigError> {
        Ok(AudioFormat::new(
            self.sample_rate(),
            self.channels(),
            self.bits_per_sample(),
            self.sample_format()?,
            self.big_endian(),
        )?)
    }

    /// Returns the output latency (default: 50ms)
    pub fn latency(&self) -> Result<Duration, ConfigError> {
        match &self.latency {
            Some(latency) => Ok(DurationString::from_string(latency.clone())
                .map_err(|reason| ConfigError::Duration {
                    value: latency.clone(),
                    reason: reason.to_string(),
                })?
                .into()),
            None => Ok(DEFAULT_LATENCY),
        }
    }

    pub fn work_buffer_frames(&self) -> usize {
        self.work_buffer_frames
            .unwrap_or(DEFAULT_WORK_BUFFER_FRAMES)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use config::{Config, File, FileFormat};

    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::default();
        assert_eq!(audio.device(), "default");
        assert!(!audio.is_mock());
        assert_eq!(audio.format().unwrap(), AudioFormat::default());
        assert_eq!(audio.latency().unwrap(), Duration::from_millis(50));
        assert_eq!(audio.work_buffer_frames(), 512);
    }

    #[test]
    fn test_deserialize() {
        let yaml = r#"
            device: mock-line
            sample_rate: 48000
            channels: 1
            bits_per_sample: 32
            sample_format: float
            latency: 20ms
        "#;

        let audio: Audio = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(audio.is_mock());
        let format = audio.format().unwrap();
        assert_eq!(format.sample_rate(), 48000);
        assert_eq!(format.channels(), 1);
        assert_eq!(format.encoding(), SampleEncoding::Float);
        assert_eq!(audio.latency().unwrap(), Duration::from_millis(20));
    }

    #[test]
    fn test_bad_values() {
        let yaml = r#"
            sample_format: double
            latency: soon
        "#;

        let audio: Audio = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(matches!(audio.format(), Err(ConfigError::Format(_))));
        assert!(matches!(
            audio.latency(),
            Err(ConfigError::Duration { .. })
        ));
    }
}

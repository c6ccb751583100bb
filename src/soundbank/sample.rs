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
use std::{fmt, sync::Arc};

use super::error::SoundbankError;
use crate::audio::{convert::PcmConverter, format::AudioFormat};

/// How a sample loops while a voice plays it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    /// Play once to the end.
    #[default]
    NoLoop,
    /// Loop for the life of the voice.
    Forward,
    /// Loop until the note is released, then play through to the end.
    UntilRelease,
}

/// A loop region in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleLoop {
    pub start: usize,
    pub length: usize,
    pub mode: LoopMode,
}

impl SampleLoop {
    pub fn new(start: usize, length: usize, mode: LoopMode) -> Self {
        SampleLoop {
            start,
            length,
            mode,
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.length
    }

    /// Checks the loop against a sample of `frames` frames.
    pub fn validate(&self, frames: usize) -> Result<(), SoundbankError> {
        let valid = self.mode == LoopMode::NoLoop || self.length > 0;
        if !valid || self.end() > frames {
            return Err(SoundbankError::LoopOutOfRange {
                start: self.start,
                length: self.length,
                frames,
            });
        }
        Ok(())
    }
}

/// Recorded audio plus its playback metadata.
///
/// The raw PCM is kept as given. It is decoded once into mono float frames,
/// which voices share read-only.
pub struct Sample {
    name: String,
    data: Vec<u8>,
    format: AudioFormat,
    frames: Arc<[f32]>,
    /// MIDI key the sample sounds at when played back at its own rate.
    unity_note: u8,
    /// Tuning correction in cents.
    fine_tune: i16,
    /// Attenuation in centibels.
    attenuation: i16,
    sample_loop: Option<SampleLoop>,
}

impl Sample {
    /// Decodes `data` in `format` into a sample, mixing multiple channels down to mono.
    pub fn new(name: &str, data: Vec<u8>, format: AudioFormat) -> Result<Sample, SoundbankError> {
        let channels = format.channels() as usize;
        let frame_count = data.len() / format.frame_size();
        if frame_count == 0 {
            return Err(SoundbankError::EmptySample(name.to_string()));
        }

        let mut interleaved = vec![0.0f32; frame_count * channels];
        PcmConverter::new(&format).decode(&data, &mut interleaved);

        let frames: Arc<[f32]> = if channels == 1 {
            interleaved.into()
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(Sample {
            name: name.to_string(),
            data,
            format,
            frames,
            unity_note: 60,
            fine_tune: 0,
            attenuation: 0,
            sample_loop: None,
        })
    }

    /// Encodes mono float frames as 16-bit PCM at `sample_rate` and builds a sample from them.
    pub fn from_frames(
        name: &str,
        frames: &[f32],
        sample_rate: u32,
    ) -> Result<Sample, SoundbankError> {
        let format = AudioFormat::pcm16(sample_rate, 1)?;
        let converter = PcmConverter::new(&format);
        let mut data = vec![0u8; frames.len() * converter.sample_size()];
        converter.encode(frames, &mut data);
        Sample::new(name, data, format)
    }

    pub fn with_unity_note(mut self, unity_note: u8) -> Sample {
        self.unity_note = unity_note.min(127);
        self
    }

    pub fn with_fine_tune(mut self, cents: i16) -> Sample {
        self.fine_tune = cents;
        self
    }

    pub fn with_attenuation(mut self, centibels: i16) -> Sample {
        self.attenuation = centibels;
        self
    }

    /// Sets the loop, rejecting loops that don't fit inside the sample.
    pub fn with_loop(mut self, sample_loop: SampleLoop) -> Result<Sample, SoundbankError> {
        sample_loop.validate(self.frames.len())?;
        self.sample_loop = Some(sample_loop);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate()
    }

    /// Decoded mono frames.
    pub fn frames(&self) -> &Arc<[f32]> {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn unity_note(&self) -> u8 {
        self.unity_note
    }

    pub fn fine_tune(&self) -> i16 {
        self.fine_tune
    }

    pub fn attenuation(&self) -> i16 {
        self.attenuation
    }

    pub fn sample_loop(&self) -> Option<SampleLoop> {
        self.sample_loop
    }
}

impl fmt::Debug for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sample")
            .field("name", &self.name)
            .field("format", &self.format)
            .field("frames", &self.frames.len())
            .field("unity_note", &self.unity_note)
            .field("loop", &self.sample_loop)
            .finish()
    }
}

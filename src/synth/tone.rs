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
use std::f32::consts::TAU;

use crate::audio::buffer::AudioFrameBuffer;

use super::mixer::{ChannelMixer, MidiChannel, PITCH_BEND_CENTER, PITCH_BEND_MAX};

/// Pitch bend range in semitones.
const BEND_RANGE: f32 = 2.0;

/// Peak level of a full velocity note.
const LEVEL: f32 = 0.2;

struct Tone {
    key: u8,
    phase: f32,
    amplitude: f32,
    releasing: bool,
}

/// A bare sine wave mixer. It plays notes, follows the pitch wheel, and fades
/// released notes out linearly; every other channel message is ignored.
pub struct ToneMixer {
    sample_rate: f32,
    /// Amplitude lost per frame while releasing.
    release_step: f32,
    tones: Vec<Tone>,
    scratch: Vec<f32>,
    pitch_bend: u16,
    active: bool,
}

impl ToneMixer {
    pub fn new(sample_rate: u32, release_seconds: f32) -> Self {
        let sample_rate = sample_rate as f32;
        ToneMixer {
            sample_rate,
            release_step: LEVEL / (release_seconds * sample_rate).max(1.0),
            tones: Vec::new(),
            scratch: Vec::new(),
            pitch_bend: PITCH_BEND_CENTER,
            active: true,
        }
    }

    /// Notes currently sounding, including ones fading out.
    pub fn sounding(&self) -> usize {
        self.tones.len()
    }

    fn frequency(&self, key: u8) -> f32 {
        let bend =
            (self.pitch_bend as f32 - PITCH_BEND_CENTER as f32) / PITCH_BEND_CENTER as f32 * BEND_RANGE;
        440.0 * 2f32.powf((key as f32 - 69.0 + bend) / 12.0)
    }
}

impl MidiChannel for ToneMixer {
    fn note_on(&mut self, key: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(key, 0);
            return;
        }
        self.tones.push(Tone {
            key,
            phase: 0.0,
            amplitude: LEVEL * velocity as f32 / 127.0,
            releasing: false,
        });
    }

    fn note_off(&mut self, key: u8, _velocity: u8) {
        for tone in self.tones.iter_mut().filter(|t| t.key == key) {
            tone.releasing = true;
        }
    }

    fn all_notes_off(&mut self) {
        for tone in &mut self.tones {
            tone.releasing = true;
        }
    }

    fn set_pitch_bend(&mut self, bend: u16) {
        self.pitch_bend = bend.min(PITCH_BEND_MAX);
    }

    fn pitch_bend(&self) -> u16 {
        self.pitch_bend
    }
}

impl ChannelMixer for ToneMixer {
    fn process(&mut self, buffers: &mut [AudioFrameBuffer], offset: usize, len: usize) -> bool {
        if !self.active {
            return false;
        }
        if self.tones.is_empty() || buffers.is_empty() {
            return true;
        }

        self.scratch.clear();
        self.scratch.resize(len, 0.0);
        for index in 0..self.tones.len() {
            let increment = TAU * self.frequency(self.tones[index].key) / self.sample_rate;
            let release_step = self.release_step;
            let tone = &mut self.tones[index];
            for out in self.scratch.iter_mut() {
                *out += tone.phase.sin() * tone.amplitude;
                tone.phase = (tone.phase + increment) % TAU;
                if tone.releasing {
                    tone.amplitude = (tone.amplitude - release_step).max(0.0);
                }
            }
        }
        for buffer in buffers.iter_mut() {
            let out = &mut buffer.array()[offset..offset + len];
            for (o, s) in out.iter_mut().zip(self.scratch.iter()) {
                *o += s;
            }
        }
        self.tones.retain(|t| t.amplitude > 0.0);
        true
    }

    fn stop(&mut self) {
        self.active = false;
        self.tones.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;

    fn buffers() -> Vec<AudioFrameBuffer> {
        let format = AudioFormat::pcm16(44100, 2).unwrap();
        vec![AudioFrameBuffer::new(441, format), AudioFrameBuffer::new(441, format)]
    }

    #[test]
    fn test_plays_and_releases() {
        let mut mixer = ToneMixer::new(44100, 0.005);
        let mut out = buffers();
        mixer.note_on(69, 127);
        assert!(mixer.process(&mut out, 0, 441));
        let left = out[0].samples().unwrap();
        assert_eq!(left, out[1].samples().unwrap());
        assert!(left.iter().any(|s| s.abs() > 0.1));

        mixer.note_off(69, 0);
        assert!(mixer.process(&mut out, 0, 441));
        assert_eq!(mixer.sounding(), 0);
    }

    #[test]
    fn test_pitch_bend() {
        let mut mixer = ToneMixer::new(44100, 0.01);
        assert_eq!(mixer.pitch_bend(), PITCH_BEND_CENTER);
        assert!((mixer.frequency(69) - 440.0).abs() < 1e-3);
        mixer.set_pitch_bend(0);
        assert!((mixer.frequency(69) - 440.0 * 2f32.powf(-2.0 / 12.0)).abs() < 1e-2);
        // Everything else stays inert.
        mixer.set_mono(true);
        assert!(!mixer.mono());
    }

    #[test]
    fn test_stop() {
        let mut mixer = ToneMixer::new(44100, 0.01);
        let mut out = buffers();
        mixer.note_on(60, 100);
        mixer.stop();
        assert!(!mixer.process(&mut out, 0, 441));
        assert!(out[0].is_silent());
    }
}

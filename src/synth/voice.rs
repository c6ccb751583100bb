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
use std::{
    f32::consts::FRAC_PI_2,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tracing::debug;

use crate::{
    audio::{buffer::AudioFrameBuffer, resampler::Interpolation},
    soundbank::{connection::default_connections, connection::ConnectionBlock, Performer},
};

use super::{
    envelope::Envelope,
    modulation::{evaluate, ControllerState, Modulation, ModulationContext},
    oscillator::SampleOscillator,
};

/// Voice ages are ordered across every channel.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(0);

/// Whether a voice is held by its key, held by the sustain pedal, or released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    Key,
    Pedal,
    Released,
}

struct VoiceOscillator {
    oscillator: SampleOscillator,
    /// Pitch at the current key ignoring modulation, in input frames per output frame.
    base_pitch: f32,
    /// Linear gain from the oscillator's attenuation.
    gain: f32,
}

/// One performer sounding for one note.
pub struct Voice {
    id: u64,
    performer: Arc<Performer>,
    connections: Vec<ConnectionBlock>,
    key: u8,
    velocity: u8,
    hold: Hold,
    oscillators: Vec<VoiceOscillator>,
    envelope: Envelope,
    /// Left and right gains at the end of the last block.
    last_gains: Option<(f32, f32)>,
    scratch: Vec<f32>,
    mix: Vec<f32>,
}

/// Pitch ratio for playing a sample recorded at `sample_rate` with `unity_note`
/// at `key`, detuned by `cents`.
pub fn pitch_ratio(sample_rate: u32, output_rate: u32, key: u8, unity_note: u8, cents: f32) -> f32 {
    let cents = (key as f32 - unity_note as f32) * 100.0 + cents;
    sample_rate as f32 / output_rate as f32 * 2f32.powf(cents / 1200.0)
}

impl Voice {
    pub fn new(
        performer: Arc<Performer>,
        key: u8,
        velocity: u8,
        state: &ControllerState,
        output_rate: u32,
        interpolation: Interpolation,
    ) -> Self {
        let mut connections = if performer.uses_default_connections() {
            default_connections()
        } else {
            Vec::new()
        };
        connections.extend_from_slice(performer.connections());

        let modulation = evaluate(
            &connections,
            &ModulationContext {
                state,
                key,
                velocity,
            },
        );
        let pitch_scale = 2f32.powf(modulation.pitch / 1200.0);

        let oscillators = performer
            .oscillators()
            .iter()
            .map(|wavetable| {
                let sample = wavetable.sample();
                let base_pitch = pitch_ratio(
                    sample.sample_rate(),
                    output_rate,
                    key,
                    wavetable.unity_note(),
                    wavetable.fine_tune() as f32,
                );
                VoiceOscillator {
                    oscillator: SampleOscillator::new(
                        sample.frames().clone(),
                        wavetable.sample_loop(),
                        interpolation.resampler(),
                        base_pitch * pitch_scale,
                    ),
                    base_pitch,
                    gain: 10f32.powf(-(wavetable.attenuation() as f32) / 200.0),
                }
            })
            .collect();

        debug!(
            performer = performer.name(),
            key,
            velocity,
            "Starting voice"
        );

        Voice {
            id: NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed),
            envelope: Envelope::new(modulation.envelope(), output_rate),
            performer,
            connections,
            key,
            velocity,
            hold: Hold::Key,
            oscillators,
            last_gains: None,
            scratch: Vec::new(),
            mix: Vec::new(),
        }
    }

    /// Start order. Lower ids are older.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn performer(&self) -> &Arc<Performer> {
        &self.performer
    }

    pub fn exclusive_class(&self) -> u32 {
        self.performer.exclusive_class()
    }

    pub fn hold(&self) -> Hold {
        self.hold
    }

    pub fn is_finished(&self) -> bool {
        self.envelope.is_finished() || self.oscillators.iter().all(|o| o.oscillator.is_finished())
    }

    /// Note off: starts the release, or hands the voice to the sustain pedal.
    pub fn note_off(&mut self, sustain: bool) {
        if self.hold != Hold::Key {
            return;
        }
        if sustain {
            self.hold = Hold::Pedal;
        } else {
            self.release();
        }
    }

    pub fn release(&mut self) {
        if self.hold == Hold::Released {
            return;
        }
        self.hold = Hold::Released;
        self.envelope.release();
        for osc in &mut self.oscillators {
            osc.oscillator.release();
        }
    }

    /// Fades the voice out as quickly as possible without clicking.
    pub fn choke(&mut self) {
        self.hold = Hold::Released;
        self.envelope.choke();
    }

    fn modulation(&self, state: &ControllerState) -> Modulation {
        evaluate(
            &self.connections,
            &ModulationContext {
                state,
                key: self.key,
                velocity: self.velocity,
            },
        )
    }

    /// Adds `len` frames into `buffers[..][offset..offset + len]`. Mono output gets
    /// the voice as is; otherwise it is panned across the first two buffers.
    /// Returns false once the voice has finished.
    pub fn render(
        &mut self,
        state: &ControllerState,
        buffers: &mut [AudioFrameBuffer],
        offset: usize,
        len: usize,
    ) -> bool {
        if self.is_finished() {
            return false;
        }
        if buffers.is_empty() || len == 0 {
            return true;
        }

        let modulation = self.modulation(state);
        let pitch_scale = 2f32.powf(modulation.pitch / 1200.0);
        let amplitude = modulation.amplitude();

        if self.mix.len() < len {
            self.mix.resize(len, 0.0);
            self.scratch.resize(len, 0.0);
        }
        let mix = &mut self.mix[..len];
        let scratch = &mut self.scratch[..len];
        mix.fill(0.0);
        for osc in &mut self.oscillators {
            osc.oscillator.render(scratch, osc.base_pitch * pitch_scale);
            for (m, s) in mix.iter_mut().zip(scratch.iter()) {
                *m += s * osc.gain;
            }
        }
        self.envelope.apply(mix);

        let pan = modulation.pan_position() * FRAC_PI_2;
        let gains = if buffers.len() == 1 {
            (amplitude, 0.0)
        } else {
            (amplitude * pan.cos(), amplitude * pan.sin())
        };
        // Ramp from the previous block's gains so controller moves don't click.
        let (start_left, start_right) = self.last_gains.unwrap_or(gains);
        self.last_gains = Some(gains);
        let step_left = (gains.0 - start_left) / len as f32;
        let step_right = (gains.1 - start_right) / len as f32;

        let (left, rest) = buffers.split_at_mut(1);
        let left = &mut left[0].array()[offset..offset + len];
        for (i, (out, s)) in left.iter_mut().zip(mix.iter()).enumerate() {
            *out += s * (start_left + step_left * i as f32);
        }
        if let Some(right) = rest.first_mut() {
            let right = &mut right.array()[offset..offset + len];
            for (i, (out, s)) in right.iter_mut().zip(mix.iter()).enumerate() {
                *out += s * (start_right + step_right * i as f32);
            }
        }

        !self.is_finished()
    }
}

/// The voices of one channel, with a polyphony limit.
pub struct VoiceManager {
    voices: Vec<Voice>,
    limit: usize,
}

impl VoiceManager {
    pub fn new(limit: usize) -> Self {
        VoiceManager {
            voices: Vec::with_capacity(limit),
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Adds a voice, dropping the oldest one if the channel is full.
    pub fn start(&mut self, voice: Voice) {
        if self.voices.len() >= self.limit {
            self.steal_oldest();
        }
        self.voices.push(voice);
    }

    /// Id of the oldest voice.
    pub fn oldest(&self) -> Option<u64> {
        self.voices.iter().map(Voice::id).min()
    }

    /// Removes the oldest voice. Returns false if there was none.
    pub fn steal_oldest(&mut self) -> bool {
        let Some(index) = self
            .voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.id())
            .map(|(i, _)| i)
        else {
            return false;
        };
        let voice = self.voices.remove(index);
        debug!(key = voice.key(), "Stealing voice");
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = &Voice> {
        self.voices.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Voice> {
        self.voices.iter_mut()
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Renders every voice, dropping the ones that finish.
    pub fn render(
        &mut self,
        state: &ControllerState,
        buffers: &mut [AudioFrameBuffer],
        offset: usize,
        len: usize,
    ) {
        self.voices
            .retain_mut(|voice| voice.render(state, buffers, offset, len));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::format::AudioFormat,
        soundbank::{
            connection::Destination, LoopMode, Sample, SampleLoop, Wavetable,
        },
    };

    fn performer(sample_loop: bool) -> Arc<Performer> {
        let frames: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.1).sin() * 0.5).collect();
        let mut sample = Sample::from_frames("sine", &frames, 44100).unwrap();
        if sample_loop {
            sample = sample
                .with_loop(SampleLoop::new(100, 800, LoopMode::Forward))
                .unwrap();
        }
        let mut performer = Performer::new("test");
        performer.add_oscillator(Wavetable::new(Arc::new(sample)));
        performer.add_connection(ConnectionBlock::constant(Destination::EnvelopeRelease, -6000.0));
        Arc::new(performer)
    }

    fn buffers(channels: u16, size: usize) -> Vec<AudioFrameBuffer> {
        let format = AudioFormat::pcm16(44100, channels).unwrap();
        (0..channels)
            .map(|_| AudioFrameBuffer::new(size, format))
            .collect()
    }

    fn energy(buffer: &AudioFrameBuffer) -> f32 {
        buffer
            .samples()
            .map(|s| s.iter().map(|x| x * x).sum())
            .unwrap_or(0.0)
    }

    #[test]
    fn test_pitch_ratio() {
        assert_eq!(pitch_ratio(44100, 44100, 60, 60, 0.0), 1.0);
        assert!((pitch_ratio(44100, 44100, 72, 60, 0.0) - 2.0).abs() < 1e-6);
        assert!((pitch_ratio(22050, 44100, 60, 60, 0.0) - 0.5).abs() < 1e-6);
        assert!((pitch_ratio(44100, 44100, 60, 60, -1200.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_voice_renders_and_pans() {
        let state = ControllerState::default();
        let mut voice = Voice::new(performer(true), 60, 127, &state, 44100, Interpolation::Linear);
        let mut out = buffers(2, 256);
        assert!(voice.render(&state, &mut out, 0, 256));
        let (left, right) = (energy(&out[0]), energy(&out[1]));
        assert!(left > 0.0);
        assert!((left - right).abs() / left < 1e-3);

        let mut state = ControllerState::default();
        state.controllers[10] = 0;
        let mut voice = Voice::new(performer(true), 60, 127, &state, 44100, Interpolation::Linear);
        let mut out = buffers(2, 256);
        voice.render(&state, &mut out, 0, 256);
        assert!(energy(&out[0]) > 0.0);
        assert!(energy(&out[1]) < 1e-6);
    }

    #[test]
    fn test_mono_output() {
        let state = ControllerState::default();
        let mut voice = Voice::new(performer(true), 60, 127, &state, 44100, Interpolation::Cubic);
        let mut out = buffers(1, 128);
        voice.render(&state, &mut out, 0, 128);
        assert!(energy(&out[0]) > 0.0);
    }

    #[test]
    fn test_release_and_sustain() {
        let state = ControllerState::default();
        let mut voice = Voice::new(performer(true), 60, 100, &state, 44100, Interpolation::Linear);
        let mut out = buffers(2, 512);

        voice.note_off(true);
        assert_eq!(voice.hold(), Hold::Pedal);
        voice.note_off(false);
        assert_eq!(voice.hold(), Hold::Pedal);
        assert!(voice.render(&state, &mut out, 0, 512));

        voice.release();
        assert_eq!(voice.hold(), Hold::Released);
        let mut rendered = 0;
        while voice.render(&state, &mut out, 0, 512) {
            rendered += 1;
            assert!(rendered < 100, "release never finished");
        }
        assert!(voice.is_finished());
    }

    #[test]
    fn test_one_shot_ends_with_sample() {
        let state = ControllerState::default();
        let mut voice = Voice::new(performer(false), 60, 100, &state, 44100, Interpolation::Point);
        let mut out = buffers(2, 2048);
        assert!(!voice.render(&state, &mut out, 0, 2048));
    }

    #[test]
    fn test_voice_manager_steals_oldest() {
        let state = ControllerState::default();
        let mut manager = VoiceManager::new(2);
        for key in [60, 62, 64] {
            manager.start(Voice::new(performer(true), key, 100, &state, 44100, Interpolation::Linear));
        }
        assert_eq!(manager.len(), 2);
        let keys: Vec<u8> = manager.iter().map(Voice::key).collect();
        assert_eq!(keys, vec![62, 64]);

        let oldest = manager.oldest().unwrap();
        assert_eq!(manager.iter().next().unwrap().id(), oldest);
        assert!(manager.steal_oldest());
        assert!(manager.steal_oldest());
        assert!(!manager.steal_oldest());
        assert!(manager.is_empty());
    }
}

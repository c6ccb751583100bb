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
use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    audio::{buffer::AudioFrameBuffer, resampler::Interpolation},
    soundbank::{Instrument, Patch, Soundbank},
};

use super::{
    mixer::{MidiChannel, PITCH_BEND_MAX},
    modulation::ControllerState,
    voice::{Hold, Voice, VoiceManager},
};

/// The General MIDI percussion channel (channel 10).
pub const PERCUSSION_CHANNEL: u8 = 9;

const BANK_SELECT_MSB: u8 = 0;
const DATA_ENTRY_MSB: u8 = 6;
const SUSTAIN: u8 = 64;
const BANK_SELECT_LSB: u8 = 32;
const DATA_ENTRY_LSB: u8 = 38;
const RPN_LSB: u8 = 100;
const RPN_MSB: u8 = 101;
const ALL_SOUND_OFF: u8 = 120;
const RESET_ALL_CONTROLLERS: u8 = 121;
const LOCAL_CONTROL: u8 = 122;
const ALL_NOTES_OFF: u8 = 123;
const OMNI_OFF: u8 = 124;
const OMNI_ON: u8 = 125;
const MONO_ON: u8 = 126;
const POLY_ON: u8 = 127;

/// One MIDI channel of the synthesizer: controller state, the selected
/// instrument and the voices it is playing.
pub struct Channel {
    number: u8,
    soundbank: Arc<Soundbank>,
    instrument: Option<Arc<Instrument>>,
    program: u8,
    bank: u16,
    state: ControllerState,
    voices: VoiceManager,
    /// Velocity of each key's last note on, for release-triggered performers.
    note_velocity: [u8; 128],
    output_rate: u32,
    interpolation: Interpolation,
    local_control: bool,
    mono: bool,
    omni: bool,
    mute: bool,
    solo: bool,
}

impl Channel {
    pub fn new(
        number: u8,
        soundbank: Arc<Soundbank>,
        polyphony: usize,
        output_rate: u32,
        interpolation: Interpolation,
    ) -> Self {
        let mut channel = Channel {
            number,
            soundbank,
            instrument: None,
            program: 0,
            bank: 0,
            state: ControllerState::default(),
            voices: VoiceManager::new(polyphony),
            note_velocity: [0; 128],
            output_rate,
            interpolation,
            local_control: true,
            mono: false,
            omni: false,
            mute: false,
            solo: false,
        };
        channel.program_change_with_bank(0, 0);
        channel
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn instrument(&self) -> Option<&Arc<Instrument>> {
        self.instrument.as_ref()
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut VoiceManager {
        &mut self.voices
    }

    pub fn sustain(&self) -> bool {
        self.state.controllers[SUSTAIN as usize] >= 64
    }

    fn is_percussion(&self) -> bool {
        self.number == PERCUSSION_CHANNEL
    }

    /// Adds the channel's voices into `buffers`.
    pub fn render(&mut self, buffers: &mut [AudioFrameBuffer], offset: usize, len: usize) {
        self.voices.render(&self.state, buffers, offset, len);
    }

    fn start_voices(&mut self, key: u8, velocity: u8, release_triggered: bool) {
        let Some(instrument) = self.instrument.clone() else {
            debug!(channel = self.number, key, "No instrument selected");
            return;
        };

        for performer in instrument.performers_for(key, velocity) {
            if performer.is_release_triggered() != release_triggered {
                continue;
            }

            let class = performer.exclusive_class();
            if class != 0 {
                for voice in self.voices.iter_mut() {
                    if voice.exclusive_class() == class {
                        voice.choke();
                    }
                }
            }
            if !performer.is_self_non_exclusive() {
                for voice in self.voices.iter_mut() {
                    if voice.key() == key && Arc::ptr_eq(voice.performer(), performer) {
                        voice.choke();
                    }
                }
            }

            let mut voice = Voice::new(
                performer.clone(),
                key,
                velocity,
                &self.state,
                self.output_rate,
                self.interpolation,
            );
            if release_triggered {
                // The key is already up, so it plays straight into its release.
                voice.note_off(false);
            }
            self.voices.start(voice);
        }
    }

    fn data_entry(&mut self) {
        let rpn = (
            self.state.controllers[RPN_MSB as usize],
            self.state.controllers[RPN_LSB as usize],
        );
        if rpn == (0, 0) {
            self.state.bend_range_semitones = self.state.controllers[DATA_ENTRY_MSB as usize];
            self.state.bend_range_cents = self.state.controllers[DATA_ENTRY_LSB as usize];
            debug!(
                channel = self.number,
                semitones = self.state.bend_range_semitones,
                cents = self.state.bend_range_cents,
                "Pitch bend range"
            );
        }
    }

    fn release_pedal(&mut self) {
        for voice in self.voices.iter_mut() {
            if voice.hold() == Hold::Pedal {
                voice.release();
            }
        }
    }
}

impl MidiChannel for Channel {
    fn note_on(&mut self, key: u8, velocity: u8) {
        let key = key & 0x7f;
        if velocity == 0 {
            self.note_off(key, 64);
            return;
        }
        if self.mono {
            let sustain = self.sustain();
            for voice in self.voices.iter_mut() {
                voice.note_off(sustain);
            }
        }
        self.note_velocity[key as usize] = velocity;
        self.start_voices(key, velocity, false);
    }

    fn note_off(&mut self, key: u8, _velocity: u8) {
        let key = key & 0x7f;
        let sustain = self.sustain();
        for voice in self.voices.iter_mut() {
            if voice.key() == key {
                voice.note_off(sustain);
            }
        }
        let velocity = self.note_velocity[key as usize];
        if velocity > 0 {
            self.note_velocity[key as usize] = 0;
            self.start_voices(key, velocity, true);
        }
    }

    fn all_notes_off(&mut self) {
        let sustain = self.sustain();
        for voice in self.voices.iter_mut() {
            voice.note_off(sustain);
        }
        self.note_velocity = [0; 128];
    }

    fn all_sound_off(&mut self) {
        self.voices.clear();
        self.note_velocity = [0; 128];
    }

    fn set_poly_pressure(&mut self, key: u8, pressure: u8) {
        self.state.poly_pressure[key as usize & 0x7f] = pressure & 0x7f;
    }

    fn poly_pressure(&self, key: u8) -> u8 {
        self.state.poly_pressure[key as usize & 0x7f]
    }

    fn set_channel_pressure(&mut self, pressure: u8) {
        self.state.channel_pressure = pressure & 0x7f;
    }

    fn channel_pressure(&self) -> u8 {
        self.state.channel_pressure
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        let (controller, value) = (controller & 0x7f, value & 0x7f);
        let was_sustained = self.sustain();
        self.state.controllers[controller as usize] = value;

        match controller {
            DATA_ENTRY_MSB | DATA_ENTRY_LSB => self.data_entry(),
            SUSTAIN => {
                if was_sustained && !self.sustain() {
                    self.release_pedal();
                }
            }
            ALL_SOUND_OFF => self.all_sound_off(),
            RESET_ALL_CONTROLLERS => self.reset_all_controllers(),
            LOCAL_CONTROL => {
                self.local_control(value >= 64);
            }
            ALL_NOTES_OFF => self.all_notes_off(),
            OMNI_OFF => self.set_omni(false),
            OMNI_ON => self.set_omni(true),
            MONO_ON => self.set_mono(true),
            POLY_ON => self.set_mono(false),
            _ => {}
        }
    }

    fn controller(&self, controller: u8) -> u8 {
        self.state.controllers[controller as usize & 0x7f]
    }

    fn program_change(&mut self, program: u8) {
        let bank = (self.state.controllers[BANK_SELECT_MSB as usize] as u16) << 7
            | self.state.controllers[BANK_SELECT_LSB as usize] as u16;
        self.program_change_with_bank(bank, program);
    }

    fn program_change_with_bank(&mut self, bank: u16, program: u8) {
        let program = program & 0x7f;
        self.bank = bank;
        self.program = program;
        let patch = if self.is_percussion() {
            Patch::percussion(bank, program)
        } else {
            Patch::new(bank, program)
        };
        self.instrument = self.soundbank.instrument(&patch);
        match &self.instrument {
            Some(instrument) => debug!(
                channel = self.number,
                patch = %patch,
                instrument = instrument.name(),
                "Program change"
            ),
            None => warn!(channel = self.number, patch = %patch, "No instrument for patch"),
        }
    }

    fn program(&self) -> u8 {
        self.program
    }

    fn bank(&self) -> u16 {
        self.bank
    }

    fn set_pitch_bend(&mut self, bend: u16) {
        self.state.pitch_bend = bend.min(PITCH_BEND_MAX);
    }

    fn pitch_bend(&self) -> u16 {
        self.state.pitch_bend
    }

    fn reset_all_controllers(&mut self) {
        let was_sustained = self.sustain();
        self.state.reset();
        if was_sustained {
            self.release_pedal();
        }
    }

    fn local_control(&mut self, on: bool) -> bool {
        self.local_control = on;
        self.local_control
    }

    fn set_mono(&mut self, on: bool) {
        if self.mono != on {
            self.all_notes_off();
        }
        self.mono = on;
    }

    fn mono(&self) -> bool {
        self.mono
    }

    /// Omni only changes what the channel reports. Channel filtering happens at the
    /// MIDI input.
    fn set_omni(&mut self, on: bool) {
        if self.omni != on {
            self.all_notes_off();
        }
        self.omni = on;
    }

    fn omni(&self) -> bool {
        self.omni
    }

    fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    fn mute(&self) -> bool {
        self.mute
    }

    fn set_solo(&mut self, solo: bool) {
        self.solo = solo;
    }

    fn solo(&self) -> bool {
        self.solo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soundbank::{
        builtin::{self, BASS, ORGAN, PIANO},
        connection::{ConnectionBlock, Destination},
        Performer, Sample, Wavetable,
    };

    fn channel(number: u8) -> Channel {
        let bank = Arc::new(builtin::builtin().unwrap());
        Channel::new(number, bank, 16, 44100, Interpolation::Linear)
    }

    fn held(channel: &Channel) -> usize {
        channel
            .voices()
            .iter()
            .filter(|v| v.hold() != Hold::Released)
            .count()
    }

    #[test]
    fn test_program_change() {
        let mut channel = channel(0);
        assert_eq!(channel.instrument().unwrap().name(), "Piano");
        channel.program_change(ORGAN);
        assert_eq!(channel.program(), ORGAN);
        assert_eq!(channel.instrument().unwrap().name(), "Organ");

        // Unknown bank falls back to bank 0.
        channel.control_change(0, 1);
        channel.program_change(BASS);
        assert_eq!(channel.bank(), 128);
        assert_eq!(channel.instrument().unwrap().name(), "Bass");

        channel.program_change_with_bank(0, PIANO);
        assert_eq!(channel.instrument().unwrap().name(), "Piano");

        let drums = self::channel(PERCUSSION_CHANNEL);
        assert_eq!(drums.instrument().unwrap().name(), "Standard Kit");
    }

    #[test]
    fn test_note_on_off() {
        let mut channel = channel(0);
        channel.note_on(60, 100);
        channel.note_on(64, 100);
        assert_eq!(held(&channel), 2);
        channel.note_off(60, 0);
        assert_eq!(held(&channel), 1);
        // Velocity 0 is a note off.
        channel.note_on(64, 0);
        assert_eq!(held(&channel), 0);
    }

    #[test]
    fn test_same_key_retrigger_chokes_previous() {
        let mut channel = channel(0);
        channel.note_on(60, 100);
        channel.note_on(60, 100);
        assert_eq!(channel.voices().len(), 2);
        assert_eq!(held(&channel), 1);
    }

    #[test]
    fn test_exclusive_class_chokes() {
        let mut channel = channel(PERCUSSION_CHANNEL);
        channel.note_on(46, 100);
        channel.note_on(36, 100);
        assert_eq!(held(&channel), 2);
        // Closed hat shares the open hat's class.
        channel.note_on(42, 100);
        let sounding: Vec<u8> = channel
            .voices()
            .iter()
            .filter(|v| v.hold() != Hold::Released)
            .map(Voice::key)
            .collect();
        assert_eq!(sounding, vec![36, 42]);
    }

    #[test]
    fn test_sustain_defers_release() {
        let mut channel = channel(0);
        channel.control_change(64, 127);
        channel.note_on(60, 100);
        channel.note_off(60, 0);
        assert_eq!(held(&channel), 1);
        assert_eq!(channel.voices().iter().next().unwrap().hold(), Hold::Pedal);

        channel.control_change(64, 0);
        assert_eq!(held(&channel), 0);
    }

    #[test]
    fn test_mono_mode() {
        let mut channel = channel(0);
        channel.control_change(126, 1);
        assert!(channel.mono());
        channel.note_on(60, 100);
        channel.note_on(62, 100);
        assert_eq!(held(&channel), 1);
        channel.control_change(127, 0);
        assert!(!channel.mono());
        assert_eq!(held(&channel), 0);
    }

    #[test]
    fn test_all_notes_and_sound_off() {
        let mut channel = channel(0);
        channel.note_on(60, 100);
        channel.note_on(62, 100);
        channel.control_change(123, 0);
        assert_eq!(held(&channel), 0);
        assert_eq!(channel.voices().len(), 2);
        channel.control_change(120, 0);
        assert!(channel.voices().is_empty());
    }

    #[test]
    fn test_pitch_bend_range_rpn() {
        let mut channel = channel(0);
        channel.control_change(101, 0);
        channel.control_change(100, 0);
        channel.control_change(6, 12);
        channel.control_change(38, 50);
        assert_eq!(channel.state.bend_range_semitones, 12);
        assert_eq!(channel.state.bend_range_cents, 50);

        // Another parameter selected: data entry is ignored.
        channel.control_change(100, 1);
        channel.control_change(6, 2);
        assert_eq!(channel.state.bend_range_semitones, 12);
    }

    #[test]
    fn test_reset_all_controllers() {
        let mut channel = channel(0);
        channel.set_pitch_bend(0);
        channel.control_change(1, 90);
        channel.control_change(7, 30);
        channel.control_change(11, 10);
        channel.set_channel_pressure(50);
        channel.set_poly_pressure(60, 70);
        channel.control_change(121, 0);

        assert_eq!(channel.pitch_bend(), 8192);
        assert_eq!(channel.controller(1), 0);
        assert_eq!(channel.controller(7), 30);
        assert_eq!(channel.controller(11), 127);
        assert_eq!(channel.channel_pressure(), 0);
        assert_eq!(channel.poly_pressure(60), 0);
    }

    #[test]
    fn test_pitch_bend_clamped() {
        let mut channel = channel(0);
        assert_eq!(channel.pitch_bend(), 8192);
        channel.set_pitch_bend(20000);
        assert_eq!(channel.pitch_bend(), PITCH_BEND_MAX);
    }

    #[test]
    fn test_release_triggered_performer() {
        let sample = Arc::new(Sample::from_frames("click", &[0.5; 4410], 44100).unwrap());
        let mut sustain = Performer::new("sustain");
        sustain.add_oscillator(Wavetable::new(sample.clone()));
        let mut release = Performer::new("release");
        release.add_oscillator(Wavetable::new(sample));
        release.set_release_triggered(true);
        release.add_connection(ConnectionBlock::constant(Destination::EnvelopeRelease, 0.0));

        let mut bank = Soundbank::new("test", "", "");
        bank.add_instrument(Instrument::new(
            "keys",
            Patch::new(0, 0),
            vec![sustain, release],
        ));
        let mut channel = Channel::new(0, Arc::new(bank), 8, 44100, Interpolation::Linear);

        channel.note_on(60, 100);
        assert_eq!(channel.voices().len(), 1);
        channel.note_off(60, 0);
        let names: Vec<&str> = channel
            .voices()
            .iter()
            .map(|v| v.performer().name())
            .collect();
        assert_eq!(names, vec!["sustain", "release"]);
    }

    #[test]
    fn test_mode_flags() {
        let mut channel = channel(0);
        channel.control_change(125, 0);
        assert!(channel.omni());
        channel.control_change(124, 0);
        assert!(!channel.omni());
        channel.set_mute(true);
        channel.set_solo(true);
        assert!(channel.mute() && channel.solo());
        assert!(!channel.local_control(false));
        channel.control_change(122, 127);
        assert!(channel.local_control);
    }
}

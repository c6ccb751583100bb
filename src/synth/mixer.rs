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

//! The MIDI channel surface and the mixer contract built on it.
//!
//! [`MidiChannel`] covers everything a MIDI channel can be told or asked. Every
//! method has an inert default: setters do nothing, getters answer zero or
//! false. Implementations override only what they support.

use crate::audio::buffer::AudioFrameBuffer;

/// Center position of the 14 bit pitch wheel.
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Largest 14 bit pitch wheel value.
pub const PITCH_BEND_MAX: u16 = 16383;

pub trait MidiChannel {
    fn note_on(&mut self, _key: u8, _velocity: u8) {}

    fn note_off(&mut self, _key: u8, _velocity: u8) {}

    /// Releases every held note.
    fn all_notes_off(&mut self) {}

    /// Silences every voice immediately.
    fn all_sound_off(&mut self) {}

    fn set_poly_pressure(&mut self, _key: u8, _pressure: u8) {}

    fn poly_pressure(&self, _key: u8) -> u8 {
        0
    }

    fn set_channel_pressure(&mut self, _pressure: u8) {}

    fn channel_pressure(&self) -> u8 {
        0
    }

    fn control_change(&mut self, _controller: u8, _value: u8) {}

    fn controller(&self, _controller: u8) -> u8 {
        0
    }

    fn program_change(&mut self, _program: u8) {}

    fn program_change_with_bank(&mut self, _bank: u16, _program: u8) {}

    fn program(&self) -> u8 {
        0
    }

    fn bank(&self) -> u16 {
        0
    }

    /// Sets the 14 bit pitch wheel position, 0 to 16383 with 8192 centered.
    fn set_pitch_bend(&mut self, _bend: u16) {}

    fn pitch_bend(&self) -> u16 {
        0
    }

    fn reset_all_controllers(&mut self) {}

    /// Turns local control on or off and returns the resulting state.
    fn local_control(&mut self, _on: bool) -> bool {
        false
    }

    fn set_mono(&mut self, _on: bool) {}

    fn mono(&self) -> bool {
        false
    }

    fn set_omni(&mut self, _on: bool) {}

    fn omni(&self) -> bool {
        false
    }

    fn set_mute(&mut self, _mute: bool) {}

    fn mute(&self) -> bool {
        false
    }

    fn set_solo(&mut self, _solo: bool) {}

    fn solo(&self) -> bool {
        false
    }
}

/// An audio source attached to a synthesizer channel.
///
/// A mixer is active until [`ChannelMixer::stop`] is called. After that,
/// [`ChannelMixer::process`] returns false and the synthesizer drops the mixer
/// on its next block. Stopping can't be undone.
pub trait ChannelMixer: MidiChannel + Send {
    /// Adds `len` frames of audio into `buffers[..][offset..offset + len]`, one
    /// buffer per output channel. Returns false once the mixer has nothing more to
    /// produce.
    fn process(&mut self, buffers: &mut [AudioFrameBuffer], offset: usize, len: usize) -> bool;

    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::AudioFormat;

    /// Overrides nothing beyond what a mixer must provide.
    struct Bare {
        active: bool,
    }

    impl MidiChannel for Bare {}

    impl ChannelMixer for Bare {
        fn process(&mut self, _buffers: &mut [AudioFrameBuffer], _offset: usize, _len: usize) -> bool {
            self.active
        }

        fn stop(&mut self) {
            self.active = false;
        }
    }

    #[test]
    fn test_inert_defaults() {
        let mut mixer = Bare { active: true };

        assert_eq!(mixer.pitch_bend(), 0);
        assert!(!mixer.mono());
        assert!(!mixer.omni());
        assert!(!mixer.mute());
        assert!(!mixer.solo());
        assert_eq!(mixer.program(), 0);
        assert_eq!(mixer.bank(), 0);
        assert_eq!(mixer.channel_pressure(), 0);
        assert_eq!(mixer.poly_pressure(60), 0);
        assert_eq!(mixer.controller(7), 0);

        // Setters are accepted and change nothing.
        mixer.note_on(60, 100);
        mixer.set_pitch_bend(PITCH_BEND_MAX);
        mixer.set_mono(true);
        mixer.set_solo(true);
        mixer.control_change(7, 127);
        mixer.program_change_with_bank(1, 5);
        mixer.reset_all_controllers();
        assert_eq!(mixer.pitch_bend(), 0);
        assert!(!mixer.mono());
        assert!(!mixer.solo());
        assert_eq!(mixer.controller(7), 0);
        assert_eq!(mixer.program(), 0);
        assert!(!mixer.local_control(true));
    }

    #[test]
    fn test_stop_is_final() {
        let format = AudioFormat::pcm16(44100, 2).unwrap();
        let mut buffers = vec![AudioFrameBuffer::new(16, format)];
        let mut mixer: Box<dyn ChannelMixer> = Box::new(Bare { active: true });

        assert!(mixer.process(&mut buffers, 0, 16));
        mixer.stop();
        assert!(!mixer.process(&mut buffers, 0, 16));
        mixer.note_on(60, 100);
        assert!(!mixer.process(&mut buffers, 0, 16));
    }
}

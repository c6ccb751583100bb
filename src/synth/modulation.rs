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

//! Evaluation of connection blocks against live channel state.

use crate::soundbank::connection::{ConnectionBlock, Destination, Source, SourceKind};

use super::envelope::{timecents_to_seconds, EnvelopeParams};
use super::mixer::PITCH_BEND_CENTER;

/// Controller values a channel starts with and returns to on reset.
const CONTROLLER_DEFAULTS: [(usize, u8); 4] = [(7, 100), (10, 64), (11, 127), (101, 127)];

/// The performance state of one MIDI channel, as seen by modulation sources.
#[derive(Debug, Clone)]
pub struct ControllerState {
    pub controllers: [u8; 128],
    pub poly_pressure: [u8; 128],
    pub channel_pressure: u8,
    pub pitch_bend: u16,
    /// Pitch bend range in semitones.
    pub bend_range_semitones: u8,
    /// Pitch bend range fine adjustment in cents.
    pub bend_range_cents: u8,
}

impl Default for ControllerState {
    fn default() -> Self {
        let mut controllers = [0; 128];
        for (controller, value) in CONTROLLER_DEFAULTS {
            controllers[controller] = value;
        }
        // No registered parameter selected.
        controllers[100] = 127;
        ControllerState {
            controllers,
            poly_pressure: [0; 128],
            channel_pressure: 0,
            pitch_bend: PITCH_BEND_CENTER,
            bend_range_semitones: 2,
            bend_range_cents: 0,
        }
    }
}

impl ControllerState {
    /// Resets the controllers that "reset all controllers" covers. Volume, pan,
    /// bank select and the bend range survive.
    pub fn reset(&mut self) {
        for controller in [1, 2, 4, 5, 64, 65, 66, 67, 68, 69] {
            self.controllers[controller] = 0;
        }
        self.controllers[11] = 127;
        self.controllers[100] = 127;
        self.controllers[101] = 127;
        self.poly_pressure = [0; 128];
        self.channel_pressure = 0;
        self.pitch_bend = PITCH_BEND_CENTER;
    }

    /// Pitch bend range in semitones, including the fine adjustment.
    pub fn bend_range(&self) -> f32 {
        self.bend_range_semitones as f32 + self.bend_range_cents as f32 / 100.0
    }
}

/// Channel state plus the note a voice is playing.
#[derive(Debug, Clone, Copy)]
pub struct ModulationContext<'a> {
    pub state: &'a ControllerState,
    pub key: u8,
    pub velocity: u8,
}

impl ModulationContext<'_> {
    /// The raw value of a source, normalized to 0..1 (pitch bend range excepted).
    pub fn value(&self, kind: SourceKind) -> f32 {
        let seven_bit = |v: u8| v as f32 / 128.0;
        match kind {
            SourceKind::NoteOnVelocity => seven_bit(self.velocity),
            SourceKind::KeyNumber => seven_bit(self.key),
            SourceKind::PitchWheel => self.state.pitch_bend as f32 / 16384.0,
            SourceKind::ChannelPressure => seven_bit(self.state.channel_pressure),
            SourceKind::PolyPressure => seven_bit(self.state.poly_pressure[self.key as usize & 0x7f]),
            SourceKind::Controller(c) => seven_bit(self.state.controllers[c as usize & 0x7f]),
            SourceKind::PitchBendRange => self.state.bend_range(),
        }
    }

    fn shaped(&self, source: Option<Source>) -> f32 {
        source.map_or(1.0, |s| s.shape(self.value(s.kind)))
    }
}

/// Summed destination values for one voice.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Modulation {
    /// Centibels.
    pub gain: f32,
    /// Cents.
    pub pitch: f32,
    /// -500 to 500.
    pub pan: f32,
    pub delay: Option<f32>,
    pub attack: Option<f32>,
    pub hold: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
}

fn accumulate(slot: &mut Option<f32>, value: f32) {
    *slot = Some(slot.unwrap_or(0.0) + value);
}

impl Modulation {
    /// Envelope settings from the envelope destinations. Times default to
    /// instantaneous and sustain to full level.
    pub fn envelope(&self) -> EnvelopeParams {
        let time = |tc: Option<f32>| timecents_to_seconds(tc.unwrap_or(-12000.0));
        EnvelopeParams {
            delay: time(self.delay),
            attack: time(self.attack),
            hold: time(self.hold),
            decay: time(self.decay),
            sustain: self.sustain.unwrap_or(1000.0) / 1000.0,
            release: time(self.release),
        }
    }

    /// Linear gain for `gain`, where 0 cB is unity.
    pub fn amplitude(&self) -> f32 {
        10f32.powf(self.gain / 200.0)
    }

    /// Pan position from 0 (left) to 1 (right).
    pub fn pan_position(&self) -> f32 {
        (0.5 + self.pan / 1000.0).clamp(0.0, 1.0)
    }
}

/// Sums every block's contribution into its destination.
pub fn evaluate<'a>(
    blocks: impl IntoIterator<Item = &'a ConnectionBlock>,
    context: &ModulationContext<'_>,
) -> Modulation {
    let mut modulation = Modulation::default();
    for block in blocks {
        let mut input = context.shaped(block.source) * context.shaped(block.control);
        if block.absolute {
            input = input.abs();
        }
        let value = input * block.scale;
        match block.destination {
            Destination::Gain => modulation.gain += value,
            Destination::Pitch => modulation.pitch += value,
            Destination::Pan => modulation.pan += value,
            Destination::EnvelopeDelay => accumulate(&mut modulation.delay, value),
            Destination::EnvelopeAttack => accumulate(&mut modulation.attack, value),
            Destination::EnvelopeHold => accumulate(&mut modulation.hold, value),
            Destination::EnvelopeDecay => accumulate(&mut modulation.decay, value),
            Destination::EnvelopeSustain => accumulate(&mut modulation.sustain, value),
            Destination::EnvelopeRelease => accumulate(&mut modulation.release, value),
        }
    }
    modulation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soundbank::connection::default_connections;

    fn context(state: &ControllerState, velocity: u8) -> ModulationContext<'_> {
        ModulationContext {
            state,
            key: 60,
            velocity,
        }
    }

    #[test]
    fn test_defaults_at_rest() {
        let state = ControllerState::default();
        let modulation = evaluate(&default_connections(), &context(&state, 127));
        // Full velocity and expression, volume at 100: a few dB down.
        assert!(modulation.gain < 0.0 && modulation.gain > -120.0, "{}", modulation.gain);
        assert_eq!(modulation.pitch, 0.0);
        assert_eq!(modulation.pan, 0.0);
        assert_eq!(modulation.pan_position(), 0.5);
    }

    #[test]
    fn test_velocity_attenuates() {
        let state = ControllerState::default();
        let loud = evaluate(&default_connections(), &context(&state, 127));
        let soft = evaluate(&default_connections(), &context(&state, 20));
        assert!(soft.gain < loud.gain - 100.0);
        assert!(soft.amplitude() < loud.amplitude());
    }

    #[test]
    fn test_pitch_bend() {
        let mut state = ControllerState::default();
        state.pitch_bend = 16383;
        let up = evaluate(&default_connections(), &context(&state, 100));
        assert!((up.pitch - 200.0).abs() < 0.1, "{}", up.pitch);

        state.pitch_bend = 0;
        state.bend_range_semitones = 12;
        let down = evaluate(&default_connections(), &context(&state, 100));
        assert_eq!(down.pitch, -1200.0);
    }

    #[test]
    fn test_pan() {
        let mut state = ControllerState::default();
        state.controllers[10] = 0;
        let left = evaluate(&default_connections(), &context(&state, 100));
        assert_eq!(left.pan, -500.0);
        assert_eq!(left.pan_position(), 0.0);
    }

    #[test]
    fn test_absolute_block_ignores_sign() {
        let mut state = ControllerState::default();
        state.pitch_bend = 0;
        let wheel = Source::new(SourceKind::PitchWheel)
            .polarity(crate::soundbank::connection::Polarity::Bipolar);
        let signed = [ConnectionBlock::new(wheel, 100.0, Destination::Pitch)];
        let absolute = [ConnectionBlock::new(wheel, 100.0, Destination::Pitch).with_absolute()];

        assert_eq!(evaluate(&signed, &context(&state, 100)).pitch, -100.0);
        assert_eq!(evaluate(&absolute, &context(&state, 100)).pitch, 100.0);
    }

    #[test]
    fn test_envelope_destinations() {
        let state = ControllerState::default();
        let blocks = [
            ConnectionBlock::constant(Destination::EnvelopeAttack, 0.0),
            ConnectionBlock::constant(Destination::EnvelopeRelease, 1200.0),
            ConnectionBlock::constant(Destination::EnvelopeSustain, 500.0),
        ];
        let envelope = evaluate(&blocks, &context(&state, 100)).envelope();
        assert_eq!(envelope.attack, 1.0);
        assert_eq!(envelope.release, 2.0);
        assert_eq!(envelope.sustain, 0.5);
        assert_eq!(envelope.delay, 0.0);
        assert_eq!(envelope.decay, 0.0);
    }

    #[test]
    fn test_reset() {
        let mut state = ControllerState::default();
        state.controllers[7] = 20;
        state.controllers[11] = 0;
        state.controllers[64] = 127;
        state.pitch_bend = 0;
        state.bend_range_semitones = 12;
        state.reset();
        assert_eq!(state.controllers[7], 20);
        assert_eq!(state.controllers[11], 127);
        assert_eq!(state.controllers[64], 0);
        assert_eq!(state.pitch_bend, PITCH_BEND_CENTER);
        assert_eq!(state.bend_range_semitones, 12);
    }
}

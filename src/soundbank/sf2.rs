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

//! SoundFont 2 style regions: generator tables and modulators.

use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use super::{
    connection::{ConnectionBlock, Destination, Direction, Polarity, Source, SourceKind, Transform},
    error::SoundbankError,
    performer::{Performer, Wavetable},
    sample::{LoopMode, Sample},
};

pub const GENERATOR_PAN: u16 = 17;
pub const GENERATOR_DELAY_VOL_ENV: u16 = 33;
pub const GENERATOR_ATTACK_VOL_ENV: u16 = 34;
pub const GENERATOR_HOLD_VOL_ENV: u16 = 35;
pub const GENERATOR_DECAY_VOL_ENV: u16 = 36;
pub const GENERATOR_SUSTAIN_VOL_ENV: u16 = 37;
pub const GENERATOR_RELEASE_VOL_ENV: u16 = 38;
pub const GENERATOR_KEY_RANGE: u16 = 43;
pub const GENERATOR_VEL_RANGE: u16 = 44;
pub const GENERATOR_INITIAL_ATTENUATION: u16 = 48;
pub const GENERATOR_COARSE_TUNE: u16 = 51;
pub const GENERATOR_FINE_TUNE: u16 = 52;
pub const GENERATOR_SAMPLE_MODES: u16 = 54;
pub const GENERATOR_EXCLUSIVE_CLASS: u16 = 57;
pub const GENERATOR_OVERRIDING_ROOT_KEY: u16 = 58;

/// Envelope times default to effectively instant.
const DEFAULT_TIMECENTS: i16 = -12000;

/// Controller palette indices for non-CC modulator sources.
const SOURCE_NONE: u8 = 0;
const SOURCE_VELOCITY: u8 = 2;
const SOURCE_KEY: u8 = 3;
const SOURCE_POLY_PRESSURE: u8 = 10;
const SOURCE_CHANNEL_PRESSURE: u8 = 13;
const SOURCE_PITCH_WHEEL: u8 = 14;
const SOURCE_PITCH_WHEEL_SENSITIVITY: u8 = 16;

/// Decodes a 16 bit modulator source operator. Returns `None` for "no source"
/// and for sources this synthesizer doesn't model.
pub fn decode_source(operator: u16) -> Option<Source> {
    let index = (operator & 0x7f) as u8;
    let is_cc = operator & 0x80 != 0;
    let direction = if operator & 0x100 != 0 {
        Direction::MaxMin
    } else {
        Direction::MinMax
    };
    let polarity = if operator & 0x200 != 0 {
        Polarity::Bipolar
    } else {
        Polarity::Unipolar
    };
    let transform = match operator >> 10 {
        0 => Transform::Linear,
        1 => Transform::Concave,
        2 => Transform::Convex,
        3 => Transform::Switch,
        _ => return None,
    };

    let kind = if is_cc {
        SourceKind::Controller(index)
    } else {
        match index {
            SOURCE_NONE => return None,
            SOURCE_VELOCITY => SourceKind::NoteOnVelocity,
            SOURCE_KEY => SourceKind::KeyNumber,
            SOURCE_POLY_PRESSURE => SourceKind::PolyPressure,
            SOURCE_CHANNEL_PRESSURE => SourceKind::ChannelPressure,
            SOURCE_PITCH_WHEEL => SourceKind::PitchWheel,
            SOURCE_PITCH_WHEEL_SENSITIVITY => SourceKind::PitchBendRange,
            _ => return None,
        }
    };

    Some(Source {
        kind,
        direction,
        polarity,
        transform,
    })
}

/// Encodes a source operator. The inverse of [`decode_source`].
pub fn encode_source(source: &Source) -> u16 {
    let (index, cc) = match source.kind {
        SourceKind::Controller(n) => (n & 0x7f, true),
        SourceKind::NoteOnVelocity => (SOURCE_VELOCITY, false),
        SourceKind::KeyNumber => (SOURCE_KEY, false),
        SourceKind::PolyPressure => (SOURCE_POLY_PRESSURE, false),
        SourceKind::ChannelPressure => (SOURCE_CHANNEL_PRESSURE, false),
        SourceKind::PitchWheel => (SOURCE_PITCH_WHEEL, false),
        SourceKind::PitchBendRange => (SOURCE_PITCH_WHEEL_SENSITIVITY, false),
    };
    let transform = match source.transform {
        Transform::Linear => 0,
        Transform::Concave => 1,
        Transform::Convex => 2,
        Transform::Switch => 3,
    };
    index as u16
        | if cc { 0x80 } else { 0 }
        | if source.direction == Direction::MaxMin { 0x100 } else { 0 }
        | if source.polarity == Polarity::Bipolar { 0x200 } else { 0 }
        | (transform << 10)
}

/// SF2 modulator output transforms.
const MOD_TRANSFORM_LINEAR: u16 = 0;
const MOD_TRANSFORM_ABSOLUTE: u16 = 2;

/// A SoundFont 2 modulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sf2Modulator {
    pub source_operator: u16,
    /// Generator id the modulator drives.
    pub destination_operator: u16,
    pub amount: i16,
    pub amount_source_operator: u16,
    /// Output transform: 0 leaves the output alone, 2 takes its absolute value.
    pub transform: u16,
}

/// Decodes an operator where 0 means "no source". `Err` is a non-zero operator
/// that names a source this synthesizer doesn't model.
fn optional_source(operator: u16) -> Result<Option<Source>, ()> {
    if operator == 0 {
        return Ok(None);
    }
    decode_source(operator).map(Some).ok_or(())
}

impl Sf2Modulator {
    /// Converts to a connection block. Returns `None` if the destination, either
    /// source, or the output transform isn't modeled; such a modulator is dropped
    /// rather than applied as a constant.
    pub fn to_connection(&self) -> Option<ConnectionBlock> {
        let (destination, scale) = generator_destination(self.destination_operator)?;
        let source = optional_source(self.source_operator).ok()?;
        let control = optional_source(self.amount_source_operator).ok()?;
        let block = ConnectionBlock {
            source,
            control,
            scale: self.amount as f32 * scale,
            destination,
            absolute: false,
        };
        match self.transform {
            MOD_TRANSFORM_LINEAR => Some(block),
            // |sources * amount| in generator units.
            MOD_TRANSFORM_ABSOLUTE => Some(ConnectionBlock {
                scale: (self.amount as f32).abs() * scale,
                ..block.with_absolute()
            }),
            _ => None,
        }
    }
}

/// Maps a generator onto a connection destination and the factor that converts
/// its units. Attenuation is negated into gain, coarse tune scaled to cents.
fn generator_destination(generator: u16) -> Option<(Destination, f32)> {
    Some(match generator {
        GENERATOR_PAN => (Destination::Pan, 1.0),
        GENERATOR_DELAY_VOL_ENV => (Destination::EnvelopeDelay, 1.0),
        GENERATOR_ATTACK_VOL_ENV => (Destination::EnvelopeAttack, 1.0),
        GENERATOR_HOLD_VOL_ENV => (Destination::EnvelopeHold, 1.0),
        GENERATOR_DECAY_VOL_ENV => (Destination::EnvelopeDecay, 1.0),
        GENERATOR_RELEASE_VOL_ENV => (Destination::EnvelopeRelease, 1.0),
        GENERATOR_INITIAL_ATTENUATION => (Destination::Gain, -1.0),
        GENERATOR_COARSE_TUNE => (Destination::Pitch, 100.0),
        GENERATOR_FINE_TUNE => (Destination::Pitch, 1.0),
        _ => return None,
    })
}

/// A SoundFont 2 region: a sample with generators and modulators.
#[derive(Debug, Clone)]
pub struct Sf2Region {
    generators: BTreeMap<u16, i16>,
    modulators: Vec<Sf2Modulator>,
    sample: Arc<Sample>,
}

impl Sf2Region {
    pub fn new(sample: Arc<Sample>) -> Self {
        Sf2Region {
            generators: BTreeMap::new(),
            modulators: Vec::new(),
            sample,
        }
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }

    pub fn put(&mut self, generator: u16, amount: i16) {
        self.generators.insert(generator, amount);
    }

    /// Stores a range generator, packed low byte first.
    pub fn put_range(&mut self, generator: u16, lo: u8, hi: u8) {
        self.put(generator, i16::from_le_bytes([lo, hi]));
    }

    pub fn get(&self, generator: u16) -> Option<i16> {
        self.generators.get(&generator).copied()
    }

    /// Reads a range generator, defaulting to the full MIDI range.
    pub fn range(&self, generator: u16) -> (u8, u8) {
        match self.get(generator) {
            Some(amount) => {
                let [lo, hi] = amount.to_le_bytes();
                (lo, hi)
            }
            None => (0, 127),
        }
    }

    pub fn add_modulator(&mut self, modulator: Sf2Modulator) {
        self.modulators.push(modulator);
    }

    pub fn modulators(&self) -> &[Sf2Modulator] {
        &self.modulators
    }

    /// Converts the generators and modulators into a performer.
    pub fn to_performer(&self, name: &str) -> Result<Performer, SoundbankError> {
        let mut performer = Performer::new(name);
        let (lo, hi) = self.range(GENERATOR_KEY_RANGE);
        performer.set_key_range(lo, hi)?;
        let (lo, hi) = self.range(GENERATOR_VEL_RANGE);
        performer.set_velocity_range(lo, hi)?;
        performer.set_exclusive_class(self.get(GENERATOR_EXCLUSIVE_CLASS).unwrap_or(0).max(0) as u32);

        let mut wavetable = Wavetable::new(self.sample.clone());
        if let Some(root) = self.get(GENERATOR_OVERRIDING_ROOT_KEY) {
            if (0..=127).contains(&root) {
                wavetable.set_unity_note(root as u8);
            }
        }
        wavetable.set_loop_mode(match self.get(GENERATOR_SAMPLE_MODES).unwrap_or(0) {
            1 => LoopMode::Forward,
            3 => LoopMode::UntilRelease,
            _ => LoopMode::NoLoop,
        });
        performer.add_oscillator(wavetable);

        // Constant generator contributions.
        for generator in [
            GENERATOR_PAN,
            GENERATOR_INITIAL_ATTENUATION,
            GENERATOR_COARSE_TUNE,
            GENERATOR_FINE_TUNE,
        ] {
            if let Some(amount) = self.get(generator) {
                if let Some((destination, scale)) = generator_destination(generator) {
                    performer.add_connection(ConnectionBlock::constant(
                        destination,
                        amount as f32 * scale,
                    ));
                }
            }
        }

        for generator in [
            GENERATOR_DELAY_VOL_ENV,
            GENERATOR_ATTACK_VOL_ENV,
            GENERATOR_HOLD_VOL_ENV,
            GENERATOR_DECAY_VOL_ENV,
            GENERATOR_RELEASE_VOL_ENV,
        ] {
            if let Some((destination, _)) = generator_destination(generator) {
                let amount = self.get(generator).unwrap_or(DEFAULT_TIMECENTS);
                performer.add_connection(ConnectionBlock::constant(destination, amount as f32));
            }
        }

        // Sustain is stored as attenuation; the envelope wants a level.
        let sustain_cb = self.get(GENERATOR_SUSTAIN_VOL_ENV).unwrap_or(0).clamp(0, 1440);
        performer.add_connection(ConnectionBlock::constant(
            Destination::EnvelopeSustain,
            1000.0 * 10f32.powf(-(sustain_cb as f32) / 200.0),
        ));

        for modulator in &self.modulators {
            match modulator.to_connection() {
                Some(block) => performer.add_connection(block),
                None => debug!(
                    source = modulator.source_operator,
                    amount_source = modulator.amount_source_operator,
                    destination = modulator.destination_operator,
                    transform = modulator.transform,
                    "Skipping unsupported modulator"
                ),
            }
        }

        Ok(performer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Arc<Sample> {
        Arc::new(
            Sample::from_frames("s", &[0.0; 100], 44100)
                .unwrap()
                .with_loop(crate::soundbank::sample::SampleLoop::new(
                    20,
                    80,
                    LoopMode::Forward,
                ))
                .unwrap(),
        )
    }

    fn constant(performer: &Performer, destination: Destination) -> Vec<f32> {
        performer
            .connections()
            .iter()
            .filter(|c| c.source.is_none() && c.destination == destination)
            .map(|c| c.scale)
            .collect()
    }

    #[test]
    fn test_decode_source() {
        // CC 7, max to min, unipolar, concave.
        let source = decode_source(0x80 | 7 | 0x100 | (1 << 10)).unwrap();
        assert_eq!(source.kind, SourceKind::Controller(7));
        assert_eq!(source.direction, Direction::MaxMin);
        assert_eq!(source.polarity, Polarity::Unipolar);
        assert_eq!(source.transform, Transform::Concave);

        // Pitch wheel, bipolar, linear.
        let source = decode_source(14 | 0x200).unwrap();
        assert_eq!(source.kind, SourceKind::PitchWheel);
        assert_eq!(source.polarity, Polarity::Bipolar);

        assert!(decode_source(0).is_none());
        assert!(decode_source(4 << 10 | 2).is_none());
        assert!(decode_source(99).is_none());
    }

    #[test]
    fn test_encode_matches_decode() {
        for operator in [0x0502u16, 0x0287, 0x0d0a, 0x0010, 0x0e0d] {
            let source = decode_source(operator).unwrap();
            assert_eq!(encode_source(&source), operator, "operator {:#06x}", operator);
        }
    }

    #[test]
    fn test_ranges_and_class() {
        let mut region = Sf2Region::new(sample());
        region.put_range(GENERATOR_KEY_RANGE, 35, 36);
        region.put_range(GENERATOR_VEL_RANGE, 10, 90);
        region.put(GENERATOR_EXCLUSIVE_CLASS, 2);

        let performer = region.to_performer("kick").unwrap();
        assert_eq!(performer.key_range(), &(35..=36));
        assert_eq!(performer.velocity_range(), &(10..=90));
        assert_eq!(performer.exclusive_class(), 2);
    }

    #[test]
    fn test_generators_become_connections() {
        let mut region = Sf2Region::new(sample());
        region.put(GENERATOR_INITIAL_ATTENUATION, 60);
        region.put(GENERATOR_COARSE_TUNE, -12);
        region.put(GENERATOR_FINE_TUNE, 7);
        region.put(GENERATOR_PAN, -250);
        region.put(GENERATOR_ATTACK_VOL_ENV, -1200);
        region.put(GENERATOR_SUSTAIN_VOL_ENV, 200);
        region.put(GENERATOR_OVERRIDING_ROOT_KEY, 57);
        region.put(GENERATOR_SAMPLE_MODES, 3);

        let performer = region.to_performer("p").unwrap();
        assert_eq!(constant(&performer, Destination::Gain), vec![-60.0]);
        assert_eq!(constant(&performer, Destination::Pitch), vec![-1200.0, 7.0]);
        assert_eq!(constant(&performer, Destination::Pan), vec![-250.0]);
        assert_eq!(constant(&performer, Destination::EnvelopeAttack), vec![-1200.0]);
        assert_eq!(constant(&performer, Destination::EnvelopeRelease), vec![-12000.0]);
        let sustain = constant(&performer, Destination::EnvelopeSustain)[0];
        assert!((sustain - 100.0).abs() < 1e-3);

        let wavetable = &performer.oscillators()[0];
        assert_eq!(wavetable.unity_note(), 57);
        assert_eq!(
            wavetable.sample_loop().map(|l| l.mode),
            Some(LoopMode::UntilRelease)
        );
    }

    #[test]
    fn test_sample_modes_default_to_one_shot() {
        let region = Sf2Region::new(sample());
        let performer = region.to_performer("p").unwrap();
        assert!(performer.oscillators()[0].sample_loop().is_none());
    }

    #[test]
    fn test_modulators() {
        let mut region = Sf2Region::new(sample());
        region.add_modulator(Sf2Modulator {
            // Mod wheel to attenuation.
            source_operator: 0x80 | 1,
            destination_operator: GENERATOR_INITIAL_ATTENUATION,
            amount: 100,
            amount_source_operator: 0,
            transform: 0,
        });
        region.add_modulator(Sf2Modulator {
            source_operator: 2,
            destination_operator: 8, // filter cutoff, not modeled
            amount: 100,
            amount_source_operator: 0,
            transform: 0,
        });

        let performer = region.to_performer("p").unwrap();
        let modulated: Vec<_> = performer
            .connections()
            .iter()
            .filter(|c| c.source.is_some())
            .collect();
        assert_eq!(modulated.len(), 1);
        assert!(modulated[0].reads(SourceKind::Controller(1)));
        assert_eq!(modulated[0].scale, -100.0);
        assert_eq!(modulated[0].destination, Destination::Gain);
    }

    #[test]
    fn test_undecodable_sources_skip_the_modulator() {
        let attenuate = |source_operator, amount_source_operator| Sf2Modulator {
            source_operator,
            destination_operator: GENERATOR_INITIAL_ATTENUATION,
            amount: 960,
            amount_source_operator,
            transform: 0,
        };

        // Source index 5 isn't a defined general controller.
        assert!(attenuate(0x0005, 0).to_connection().is_none());
        // Nor is a curve type above 3.
        assert!(attenuate(0x80 | 1, 4 << 10 | 2).to_connection().is_none());
        // Operator 0 is "no source", which leaves a constant.
        let fixed = attenuate(0, 0).to_connection().unwrap();
        assert!(fixed.source.is_none() && fixed.control.is_none());

        let bare = Sf2Region::new(sample()).to_performer("p").unwrap();
        let mut region = Sf2Region::new(sample());
        region.add_modulator(attenuate(0x0005, 0));
        region.add_modulator(attenuate(0x80 | 1, 99));
        let performer = region.to_performer("p").unwrap();
        assert_eq!(performer.connections(), bare.connections());
    }

    #[test]
    fn test_absolute_transform() {
        let modulator = Sf2Modulator {
            // Bipolar pitch wheel.
            source_operator: 14 | 0x200,
            destination_operator: GENERATOR_FINE_TUNE,
            amount: -50,
            amount_source_operator: 0,
            transform: 2,
        };
        let block = modulator.to_connection().unwrap();
        assert!(block.absolute);
        assert_eq!(block.scale, 50.0);

        let linear = Sf2Modulator {
            transform: 0,
            ..modulator
        }
        .to_connection()
        .unwrap();
        assert!(!linear.absolute);
        assert_eq!(linear.scale, -50.0);

        let unknown = Sf2Modulator {
            transform: 1,
            ..modulator
        };
        assert!(unknown.to_connection().is_none());
    }
}

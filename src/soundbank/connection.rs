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

//! Modulation routings.
//!
//! A [`ConnectionBlock`] reads up to two sources, multiplies their shaped values
//! together with a scale, and adds the result to a destination parameter. Blocks
//! with no sources contribute a constant.

/// What a modulation source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    NoteOnVelocity,
    KeyNumber,
    PitchWheel,
    ChannelPressure,
    PolyPressure,
    Controller(u8),
    /// The channel's pitch bend range in semitones. Not normalized.
    PitchBendRange,
}

/// Which end of the source range maps to the maximum output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    MinMax,
    MaxMin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// 0 to 1.
    #[default]
    Unipolar,
    /// -1 to 1.
    Bipolar,
}

/// Curve applied to a normalized source value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    Linear,
    Concave,
    Convex,
    Switch,
}

impl Transform {
    /// Shapes `x` in 0..=1.
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Transform::Linear => x,
            Transform::Concave => {
                if x >= 1.0 {
                    1.0
                } else {
                    (-(5.0 / 12.0) * (1.0 - x).log10()).clamp(0.0, 1.0)
                }
            }
            Transform::Convex => {
                if x <= 0.0 {
                    0.0
                } else {
                    (1.0 + (5.0 / 12.0) * x.log10()).clamp(0.0, 1.0)
                }
            }
            Transform::Switch => {
                if x > 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// A modulation source with its shaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    pub kind: SourceKind,
    pub direction: Direction,
    pub polarity: Polarity,
    pub transform: Transform,
}

impl Source {
    /// A unipolar, linear, min to max source.
    pub fn new(kind: SourceKind) -> Self {
        Source {
            kind,
            direction: Direction::MinMax,
            polarity: Polarity::Unipolar,
            transform: Transform::Linear,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Shapes a raw value. Normalized sources take 0..=1; [`SourceKind::PitchBendRange`]
    /// passes its value through untouched.
    pub fn shape(&self, value: f32) -> f32 {
        if self.kind == SourceKind::PitchBendRange {
            return value;
        }

        let x = match self.direction {
            Direction::MinMax => value,
            Direction::MaxMin => 1.0 - value,
        };
        match self.polarity {
            Polarity::Unipolar => self.transform.apply(x),
            Polarity::Bipolar => {
                let b = 2.0 * x - 1.0;
                b.signum() * self.transform.apply(b.abs())
            }
        }
    }
}

/// Parameters a connection block can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Centibels, added to the voice gain.
    Gain,
    /// Cents.
    Pitch,
    /// Tenths of a percent, -500 (left) to 500 (right).
    Pan,
    /// Timecents.
    EnvelopeDelay,
    EnvelopeAttack,
    EnvelopeHold,
    EnvelopeDecay,
    /// Tenths of a percent of full level.
    EnvelopeSustain,
    EnvelopeRelease,
}

/// One routing: `shape(source) * shape(control) * scale` into `destination`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionBlock {
    pub source: Option<Source>,
    pub control: Option<Source>,
    pub scale: f32,
    pub destination: Destination,
    /// Takes the magnitude of the shaped source product before scaling.
    pub absolute: bool,
}

impl ConnectionBlock {
    /// A constant contribution to `destination`.
    pub fn constant(destination: Destination, value: f32) -> Self {
        ConnectionBlock {
            source: None,
            control: None,
            scale: value,
            destination,
            absolute: false,
        }
    }

    pub fn new(source: Source, scale: f32, destination: Destination) -> Self {
        ConnectionBlock {
            source: Some(source),
            control: None,
            scale,
            destination,
            absolute: false,
        }
    }

    pub fn with_control(mut self, control: Source) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_absolute(mut self) -> Self {
        self.absolute = true;
        self
    }

    /// Returns true if any source reads `kind`.
    pub fn reads(&self, kind: SourceKind) -> bool {
        self.source.is_some_and(|s| s.kind == kind) || self.control.is_some_and(|s| s.kind == kind)
    }
}

/// The routings every voice gets unless its performer opts out.
pub fn default_connections() -> Vec<ConnectionBlock> {
    let volume = |kind| {
        ConnectionBlock::new(
            Source::new(kind)
                .direction(Direction::MaxMin)
                .transform(Transform::Concave),
            -960.0,
            Destination::Gain,
        )
    };

    vec![
        volume(SourceKind::NoteOnVelocity),
        volume(SourceKind::Controller(7)),
        volume(SourceKind::Controller(11)),
        ConnectionBlock::new(
            Source::new(SourceKind::PitchWheel).polarity(Polarity::Bipolar),
            100.0,
            Destination::Pitch,
        )
        .with_control(Source::new(SourceKind::PitchBendRange)),
        ConnectionBlock::new(
            Source::new(SourceKind::Controller(10)).polarity(Polarity::Bipolar),
            500.0,
            Destination::Pan,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transforms() {
        assert_eq!(Transform::Concave.apply(0.0), 0.0);
        assert_eq!(Transform::Concave.apply(1.0), 1.0);
        assert_eq!(Transform::Convex.apply(0.0), 0.0);
        assert_eq!(Transform::Convex.apply(1.0), 1.0);
        // Concave rises slowly at first, convex quickly.
        assert!(Transform::Concave.apply(0.5) < 0.5);
        assert!(Transform::Convex.apply(0.5) > 0.5);
        assert_eq!(Transform::Switch.apply(0.5), 0.0);
        assert_eq!(Transform::Switch.apply(0.51), 1.0);
    }

    #[test]
    fn test_source_shaping() {
        let source = Source::new(SourceKind::Controller(1)).direction(Direction::MaxMin);
        assert_eq!(source.shape(0.25), 0.75);

        let source = Source::new(SourceKind::PitchWheel).polarity(Polarity::Bipolar);
        assert_eq!(source.shape(0.5), 0.0);
        assert_eq!(source.shape(1.0), 1.0);
        assert_eq!(source.shape(0.0), -1.0);

        let source = Source::new(SourceKind::PitchBendRange);
        assert_eq!(source.shape(12.0), 12.0);
    }

    #[test]
    fn test_default_connections() {
        let defaults = default_connections();
        assert_eq!(defaults.len(), 5);
        assert!(defaults[0].reads(SourceKind::NoteOnVelocity));
        assert_eq!(defaults[0].scale, -960.0);

        let bend = defaults
            .iter()
            .find(|c| c.destination == Destination::Pitch)
            .unwrap();
        assert!(bend.reads(SourceKind::PitchWheel));
        assert!(bend.reads(SourceKind::PitchBendRange));

        let pan = defaults
            .iter()
            .find(|c| c.destination == Destination::Pan)
            .unwrap();
        assert!(pan.reads(SourceKind::Controller(10)));
        assert_eq!(pan.scale, 500.0);
    }
}

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

//! DLS style regions.

use std::sync::Arc;

use super::{
    connection::ConnectionBlock,
    error::SoundbankError,
    performer::{Performer, Wavetable},
    sample::{LoopMode, Sample, SampleLoop},
};

/// Region option flag: a new note on the same key doesn't cut the previous one.
pub const SELF_NON_EXCLUSIVE: u16 = 0x0001;

/// DLS loop types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlsLoopType {
    /// Loops for the life of the note.
    Forward,
    /// Loops until release, then plays the tail.
    Release,
}

impl DlsLoopType {
    /// Maps the numeric loop type; unknown values are treated as forward loops.
    pub fn from_raw(value: u32) -> Self {
        match value {
            1 => DlsLoopType::Release,
            _ => DlsLoopType::Forward,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DlsLoop {
    pub loop_type: DlsLoopType,
    pub start: usize,
    pub length: usize,
}

/// Per-region overrides of a sample's playback metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DlsSampleOptions {
    pub unity_note: u8,
    pub fine_tune: i16,
    pub attenuation: i16,
    pub loops: Vec<DlsLoop>,
}

/// Binds a sample to a key/velocity range with articulation.
#[derive(Debug, Clone)]
pub struct DlsRegion {
    pub key_range: (u8, u8),
    pub velocity_range: (u8, u8),
    /// Exclusive class. 0 means none.
    pub key_group: u16,
    pub options: u16,
    pub phase_group: u16,
    pub sample_options: Option<DlsSampleOptions>,
    pub articulation: Vec<ConnectionBlock>,
    pub sample: Arc<Sample>,
}

impl DlsRegion {
    /// A full range region playing `sample` as is.
    pub fn new(sample: Arc<Sample>) -> Self {
        DlsRegion {
            key_range: (0, 127),
            velocity_range: (0, 127),
            key_group: 0,
            options: 0,
            phase_group: 0,
            sample_options: None,
            articulation: Vec::new(),
            sample,
        }
    }

    pub fn is_self_non_exclusive(&self) -> bool {
        self.options & SELF_NON_EXCLUSIVE != 0
    }

    /// Builds the performer for this region. Instrument level articulation comes
    /// first, then the region's own.
    pub fn to_performer(
        &self,
        name: &str,
        instrument_articulation: &[ConnectionBlock],
    ) -> Result<Performer, SoundbankError> {
        let mut performer = Performer::new(name);
        performer.set_key_range(self.key_range.0, self.key_range.1)?;
        performer.set_velocity_range(self.velocity_range.0, self.velocity_range.1)?;
        performer.set_exclusive_class(self.key_group as u32);
        performer.set_self_non_exclusive(self.is_self_non_exclusive());

        let mut wavetable = Wavetable::new(self.sample.clone());
        if let Some(options) = &self.sample_options {
            wavetable.set_unity_note(options.unity_note);
            wavetable.set_fine_tune(options.fine_tune);
            wavetable.set_attenuation(options.attenuation);
            match options.loops.first() {
                Some(dls_loop) => {
                    let mode = match dls_loop.loop_type {
                        DlsLoopType::Forward => LoopMode::Forward,
                        DlsLoopType::Release => LoopMode::UntilRelease,
                    };
                    wavetable.set_loop(SampleLoop::new(dls_loop.start, dls_loop.length, mode))?;
                }
                // Options without loops mean the region plays one shot.
                None => wavetable.set_loop_mode(LoopMode::NoLoop),
            }
        }
        performer.add_oscillator(wavetable);

        for block in instrument_articulation.iter().chain(self.articulation.iter()) {
            performer.add_connection(*block);
        }
        Ok(performer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soundbank::connection::Destination;

    fn sample() -> Arc<Sample> {
        Arc::new(
            Sample::from_frames("s", &[0.0; 100], 44100)
                .unwrap()
                .with_unity_note(48)
                .with_loop(SampleLoop::new(0, 100, LoopMode::Forward))
                .unwrap(),
        )
    }

    #[test]
    fn test_plain_region() {
        let region = DlsRegion::new(sample());
        let performer = region.to_performer("plain", &[]).unwrap();
        assert_eq!(performer.oscillators().len(), 1);
        assert_eq!(performer.oscillators()[0].unity_note(), 48);
        assert!(performer.oscillators()[0].sample_loop().is_some());
        assert!(!performer.is_self_non_exclusive());
        assert!(performer.connections().is_empty());
    }

    #[test]
    fn test_overrides_and_flags() {
        let mut region = DlsRegion::new(sample());
        region.key_range = (60, 72);
        region.key_group = 3;
        region.options = SELF_NON_EXCLUSIVE;
        region.sample_options = Some(DlsSampleOptions {
            unity_note: 66,
            fine_tune: 5,
            attenuation: 20,
            loops: vec![DlsLoop {
                loop_type: DlsLoopType::from_raw(1),
                start: 10,
                length: 50,
            }],
        });
        region.articulation = vec![ConnectionBlock::constant(Destination::Pan, 250.0)];

        let instrument = [ConnectionBlock::constant(Destination::Gain, -60.0)];
        let performer = region.to_performer("region", &instrument).unwrap();

        assert!(performer.matches(60, 100));
        assert!(!performer.matches(59, 100));
        assert_eq!(performer.exclusive_class(), 3);
        assert!(performer.is_self_non_exclusive());

        let wavetable = &performer.oscillators()[0];
        assert_eq!(wavetable.unity_note(), 66);
        assert_eq!(wavetable.fine_tune(), 5);
        assert_eq!(wavetable.attenuation(), 20);
        assert_eq!(
            wavetable.sample_loop(),
            Some(SampleLoop::new(10, 50, LoopMode::UntilRelease))
        );

        let destinations: Vec<_> = performer
            .connections()
            .iter()
            .map(|c| c.destination)
            .collect();
        assert_eq!(destinations, vec![Destination::Gain, Destination::Pan]);
    }

    #[test]
    fn test_options_without_loops_disable_looping() {
        let mut region = DlsRegion::new(sample());
        region.sample_options = Some(DlsSampleOptions {
            unity_note: 48,
            ..Default::default()
        });
        let performer = region.to_performer("oneshot", &[]).unwrap();
        assert!(performer.oscillators()[0].sample_loop().is_none());
    }

    #[test]
    fn test_bad_range() {
        let mut region = DlsRegion::new(sample());
        region.velocity_range = (100, 10);
        assert!(region.to_performer("bad", &[]).is_err());
    }
}

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

//! Instrument and sample metadata consumed by the synthesizer.
//!
//! Everything here is built once and then shared read-only behind `Arc`s.

use std::{fmt, sync::Arc};

pub mod builtin;
pub mod connection;
pub mod dls;
mod error;
pub mod performer;
pub mod sample;
pub mod sf2;

pub use error::SoundbankError;
pub use performer::{Performer, Wavetable};
pub use sample::{LoopMode, Sample, SampleLoop};

/// Identifies an instrument within a soundbank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Patch {
    pub bank: u16,
    pub program: u8,
    pub percussion: bool,
}

impl Patch {
    pub fn new(bank: u16, program: u8) -> Self {
        Patch {
            bank,
            program,
            percussion: false,
        }
    }

    pub fn percussion(bank: u16, program: u8) -> Self {
        Patch {
            bank,
            program,
            percussion: true,
        }
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}bank {} program {}",
            if self.percussion { "percussion " } else { "" },
            self.bank,
            self.program
        )
    }
}

/// A playable instrument: the performers that may sound for each note.
#[derive(Debug)]
pub struct Instrument {
    name: String,
    patch: Patch,
    performers: Vec<Arc<Performer>>,
}

impl Instrument {
    pub fn new(name: &str, patch: Patch, performers: Vec<Performer>) -> Self {
        Instrument {
            name: name.to_string(),
            patch,
            performers: performers.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn patch(&self) -> Patch {
        self.patch
    }

    pub fn performers(&self) -> &[Arc<Performer>] {
        &self.performers
    }

    /// Performers whose key and velocity ranges contain the note.
    pub fn performers_for(&self, key: u8, velocity: u8) -> impl Iterator<Item = &Arc<Performer>> {
        self.performers
            .iter()
            .filter(move |p| p.matches(key, velocity))
    }
}

/// A named collection of instruments.
#[derive(Debug)]
pub struct Soundbank {
    name: String,
    vendor: String,
    description: String,
    instruments: Vec<Arc<Instrument>>,
}

impl Soundbank {
    pub fn new(name: &str, vendor: &str, description: &str) -> Self {
        Soundbank {
            name: name.to_string(),
            vendor: vendor.to_string(),
            description: description.to_string(),
            instruments: Vec::new(),
        }
    }

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.push(Arc::new(instrument));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn instruments(&self) -> &[Arc<Instrument>] {
        &self.instruments
    }

    /// Finds the instrument for `patch`. Falls back to the same program in bank 0,
    /// then to the first instrument of the same kind (melodic or percussion).
    pub fn instrument(&self, patch: &Patch) -> Option<Arc<Instrument>> {
        let same_kind = |i: &&Arc<Instrument>| i.patch.percussion == patch.percussion;
        self.instruments
            .iter()
            .find(|i| i.patch == *patch)
            .or_else(|| {
                self.instruments
                    .iter()
                    .filter(same_kind)
                    .find(|i| i.patch.bank == 0 && i.patch.program == patch.program)
            })
            .or_else(|| self.instruments.iter().find(same_kind))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> Soundbank {
        let mut bank = Soundbank::new("test", "me", "a test bank");
        bank.add_instrument(Instrument::new("piano", Patch::new(0, 0), vec![]));
        bank.add_instrument(Instrument::new("organ", Patch::new(0, 16), vec![]));
        bank.add_instrument(Instrument::new("alt organ", Patch::new(8, 16), vec![]));
        bank.add_instrument(Instrument::new("drums", Patch::percussion(0, 0), vec![]));
        bank
    }

    #[test]
    fn test_exact_lookup() {
        let bank = bank();
        assert_eq!(bank.instrument(&Patch::new(8, 16)).unwrap().name(), "alt organ");
        assert_eq!(
            bank.instrument(&Patch::percussion(0, 0)).unwrap().name(),
            "drums"
        );
    }

    #[test]
    fn test_fallbacks() {
        let bank = bank();
        // Unknown bank, known program.
        assert_eq!(bank.instrument(&Patch::new(3, 16)).unwrap().name(), "organ");
        // Unknown program.
        assert_eq!(bank.instrument(&Patch::new(0, 99)).unwrap().name(), "piano");
        // Unknown drum kit.
        assert_eq!(
            bank.instrument(&Patch::percussion(0, 25)).unwrap().name(),
            "drums"
        );
        assert!(Soundbank::new("empty", "", "").instrument(&Patch::default()).is_none());
    }

    #[test]
    fn test_patch_display() {
        assert_eq!(Patch::new(1, 2).to_string(), "bank 1 program 2");
        assert_eq!(
            Patch::percussion(0, 0).to_string(),
            "percussion bank 0 program 0"
        );
    }
}

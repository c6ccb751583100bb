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
use std::str::FromStr;

use serde::Deserialize;

use super::error::ConfigError;
use crate::audio::resampler::Interpolation;

const DEFAULT_POLYPHONY: usize = 64;
const DEFAULT_BLOCK_SIZE: usize = 256;
const DEFAULT_GAIN: f32 = 0.5;

/// A YAML representation of the synthesizer configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Synth {
    /// Maximum number of voices sounding at once (default: 64)
    polyphony: Option<usize>,

    /// Resampler: "point", "linear", "linear_fixed" or "cubic" (default: "linear")
    interpolation: Option<String>,

    /// Frames rendered per block (default: 256)
    block_size: Option<usize>,

    /// Master gain applied to the final mix (default: 0.5)
    gain: Option<f32>,
}

impl Synth {
    pub fn polyphony(&self) -> usize {
        self.polyphony.unwrap_or(DEFAULT_POLYPHONY).max(1)
    }

    pub fn interpolation(&self) -> Result<Interpolation, ConfigError> {
        match self.interpolation.as_deref() {
            Some(name) => Interpolation::from_str(name).map_err(|reason| ConfigError::Invalid {
                field: "interpolation",
                reason,
            }),
            None => Ok(Interpolation::default()),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size.unwrap_or(DEFAULT_BLOCK_SIZE).max(1)
    }

    pub fn gain(&self) -> f32 {
        self.gain.unwrap_or(DEFAULT_GAIN).max(0.0)
    }
}

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

use crate::audio::format::FormatError;

/// Errors raised while building soundbank objects.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SoundbankError {
    #[error("Sample {0} has no audio data")]
    EmptySample(String),

    #[error("Invalid sample format: {0}")]
    Format(#[from] FormatError),

    #[error("Loop {start}+{length} lies outside sample of {frames} frames")]
    LoopOutOfRange {
        start: usize,
        length: usize,
        frames: usize,
    },

    #[error("Invalid {what} range {lo}..={hi}")]
    InvalidRange { what: &'static str, lo: u8, hi: u8 },
}

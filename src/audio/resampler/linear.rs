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
use super::{input_bound, ResampleCursor, Resampler};

/// Two point linear interpolation with a floating point read position.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResampler;

impl Resampler for LinearResampler {
    fn padding(&self) -> usize {
        2
    }

    fn interpolate(
        &self,
        input: &[f32],
        cursor: &mut ResampleCursor,
        in_end: f32,
        pitch_step: f32,
        out: &mut [f32],
        out_end: usize,
    ) {
        let ix_end = input_bound(input, in_end, 1);
        let ox_end = out_end.min(out.len());
        let mut ix = cursor.in_offset as f32;
        let mut ox = cursor.out_offset;
        let mut pitch = cursor.pitch;

        if pitch_step == 0.0 {
            while ix < ix_end && ox < ox_end {
                let iix = ix as usize;
                let fix = ix - iix as f32;
                let i = input[iix];
                out[ox] = i + (input[iix + 1] - i) * fix;
                ox += 1;
                ix += pitch;
            }
        } else {
            while ix < ix_end && ox < ox_end {
                let iix = ix as usize;
                let fix = ix - iix as f32;
                let i = input[iix];
                out[ox] = i + (input[iix + 1] - i) * fix;
                ox += 1;
                ix += pitch;
                pitch += pitch_step;
            }
        }

        cursor.in_offset = ix as f64;
        cursor.pitch = pitch;
        cursor.out_offset = ox;
    }
}

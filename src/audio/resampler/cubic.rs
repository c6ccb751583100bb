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

/// Four point cubic interpolation over `input[i-1..=i+2]`.
///
/// The read position must be at least 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct CubicResampler;

#[inline(always)]
fn cubic(input: &[f32], ix: f32) -> f32 {
    let iix = ix as usize;
    let fix = ix - iix as f32;
    let y0 = input[iix - 1];
    let y1 = input[iix];
    let y2 = input[iix + 1];
    let y3 = input[iix + 2];
    let a0 = y3 - y2 + y1 - y0;
    let a1 = y0 - y1 - a0;
    let a2 = y2 - y0;
    let a3 = y1;
    ((a0 * fix + a1) * fix + a2) * fix + a3
}

impl Resampler for CubicResampler {
    fn padding(&self) -> usize {
        3
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
        let ix_end = input_bound(input, in_end, 2);
        let ox_end = out_end.min(out.len());
        let mut ix = cursor.in_offset as f32;
        let mut ox = cursor.out_offset;
        let mut pitch = cursor.pitch;

        if pitch_step == 0.0 {
            while ix < ix_end && ox < ox_end {
                out[ox] = cubic(input, ix);
                ox += 1;
                ix += pitch;
            }
        } else {
            while ix < ix_end && ox < ox_end {
                out[ox] = cubic(input, ix);
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

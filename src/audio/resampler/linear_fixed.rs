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

/// Fractional bits of the fixed-point read position.
const FRAC_BITS: u32 = 15;
const FRAC_MASK: i64 = (1 << FRAC_BITS) - 1;
const ONE: f64 = (1u32 << FRAC_BITS) as f64;
const STEP: f32 = 1.0 / (1u32 << FRAC_BITS) as f32;

/// Linear interpolation that tracks the read position in 17.15 fixed point.
///
/// Pitch and pitch step are quantized to multiples of 2^-15 on entry. Both the
/// integer index and the interpolation fraction come from the fixed-point
/// position, and the cursor is written back from it exactly, so long runs do not
/// drift and a run split across calls rebuilds the same position on re-entry.
/// The cursor reports the quantized pitch.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearFixedResampler;

impl Resampler for LinearFixedResampler {
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
        let mut ox_end = out_end.min(out.len());
        let mut ox = cursor.out_offset;

        if !(cursor.in_offset < ix_end as f64 && ox < ox_end) {
            return;
        }

        let mut p_ix = (cursor.in_offset * ONE) as i64;
        let p_ix_end = (ix_end as f64 * ONE) as i64;
        let mut p_pitch = (cursor.pitch as f64 * ONE) as i64;
        // A position that never advances would never reach the end.
        if p_pitch <= 0 {
            return;
        }

        if pitch_step == 0.0 {
            // Work out how many outputs fit before the input end so the loop only
            // has to test the output bound.
            let mut p_ix_len = (p_ix_end - p_ix).max(0);
            let p_mod = p_ix_len % p_pitch;
            if p_mod != 0 {
                p_ix_len += p_pitch - p_mod;
            }
            let ox_end2 = ox + (p_ix_len / p_pitch) as usize;
            if ox_end2 < ox_end {
                ox_end = ox_end2;
            }

            while ox < ox_end {
                let iix = (p_ix >> FRAC_BITS) as usize;
                let fix = (p_ix & FRAC_MASK) as f32 * STEP;
                let i = input[iix];
                out[ox] = i + (input[iix + 1] - i) * fix;
                ox += 1;
                p_ix += p_pitch;
            }
        } else {
            let p_pitch_step = (pitch_step as f64 * ONE) as i64;

            // A falling ramp stops once the pitch no longer moves forward.
            while p_ix < p_ix_end && ox < ox_end && p_pitch > 0 {
                let iix = (p_ix >> FRAC_BITS) as usize;
                let fix = (p_ix & FRAC_MASK) as f32 * STEP;
                let i = input[iix];
                out[ox] = i + (input[iix + 1] - i) * fix;
                ox += 1;
                p_ix += p_pitch;
                p_pitch += p_pitch_step;
            }
        }

        cursor.in_offset = p_ix as f64 / ONE;
        cursor.pitch = p_pitch as f32 * STEP;
        cursor.out_offset = ox;
    }
}

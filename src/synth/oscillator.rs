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
use std::sync::Arc;

use crate::{
    audio::resampler::{ResampleCursor, Resampler},
    soundbank::{LoopMode, SampleLoop},
};

/// Frames the read window advances by.
const SECTOR: usize = 512;

/// Lowest pitch an oscillator will play at.
const MIN_PITCH: f32 = 1.0e-4;

/// Streams a sample through a resampler.
///
/// The resampler reads from a small window rather than the sample itself:
/// `padding` frames of history, one sector of frames, and `padding` frames of
/// lookahead. When the read position passes the sector the window slides
/// forward, so the fractional position never grows large enough to lose
/// precision. Loops are unrolled into the window as it is filled.
pub struct SampleOscillator {
    frames: Arc<[f32]>,
    sample_loop: Option<SampleLoop>,
    resampler: &'static dyn Resampler,
    padding: usize,
    window: Vec<f32>,
    /// Stream position of `window[padding]`.
    window_start: i64,
    /// Read position within the window.
    position: f64,
    pitch: f32,
    released: bool,
    /// Stream positions past the release point minus this give sample frames.
    release_shift: i64,
    finished: bool,
}

impl SampleOscillator {
    pub fn new(
        frames: Arc<[f32]>,
        sample_loop: Option<SampleLoop>,
        resampler: &'static dyn Resampler,
        pitch: f32,
    ) -> Self {
        let padding = resampler.padding().max(1);
        let mut oscillator = SampleOscillator {
            frames,
            sample_loop: sample_loop.filter(|l| l.mode != LoopMode::NoLoop && l.length > 0),
            resampler,
            padding,
            window: vec![0.0; SECTOR + 2 * padding],
            window_start: 0,
            position: padding as f64,
            pitch: pitch.max(MIN_PITCH),
            released: false,
            release_shift: 0,
            finished: false,
        };
        oscillator.fill(0);
        oscillator
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    fn looping(&self) -> bool {
        match self.sample_loop.map(|l| l.mode) {
            Some(LoopMode::Forward) => true,
            Some(LoopMode::UntilRelease) => !self.released,
            _ => false,
        }
    }

    /// The sample frame at stream position `position`, or silence outside the sample.
    fn fetch(&self, position: i64) -> f32 {
        let frame = match self.sample_loop {
            Some(l) if self.looping() => {
                let (start, end) = (l.start as i64, l.end() as i64);
                if position >= end {
                    start + (position - start) % l.length as i64
                } else {
                    position
                }
            }
            _ => position - self.release_shift,
        };
        if frame < 0 {
            return 0.0;
        }
        self.frames.get(frame as usize).copied().unwrap_or(0.0)
    }

    /// Fills `window[from..]` from the stream.
    fn fill(&mut self, from: usize) {
        let base = self.window_start - self.padding as i64;
        for i in from..self.window.len() {
            let value = self.fetch(base + i as i64);
            self.window[i] = value;
        }
    }

    fn slide(&mut self) {
        let keep = 2 * self.padding;
        self.window.copy_within(SECTOR..SECTOR + keep, 0);
        self.window_start += SECTOR as i64;
        self.position -= SECTOR as f64;
        self.fill(keep);
    }

    fn sector_end(&self) -> f64 {
        (self.padding + SECTOR) as f64
    }

    /// Stream position of the frame under the read position.
    fn stream_position(&self) -> i64 {
        self.window_start - self.padding as i64 + self.position as i64
    }

    /// Window index just past the last sample frame, or `None` while looping.
    fn data_end(&self) -> Option<f64> {
        if self.looping() {
            return None;
        }
        let end = self.frames.len() as i64 + self.release_shift
            - (self.window_start - self.padding as i64);
        Some(end.max(0) as f64)
    }

    /// Leaves a loop that only lasts until release. The frames already in the
    /// window behind the read position stay, so playback continues smoothly into
    /// the tail.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        let was_looping = self.looping();
        self.released = true;
        if !was_looping || self.looping() {
            return;
        }

        let Some(l) = self.sample_loop else {
            return;
        };
        let current = self.stream_position();
        let (start, end) = (l.start as i64, l.end() as i64);
        let frame = if current >= end {
            start + (current - start) % l.length as i64
        } else {
            current
        };
        self.release_shift = current - frame;
        self.fill(self.position as usize + 1);
    }

    /// Renders `out.len()` frames, gliding from the current pitch to `target_pitch`
    /// across the block. Frames after the end of the sample are silent. Returns
    /// the number of frames produced.
    pub fn render(&mut self, out: &mut [f32], target_pitch: f32) -> usize {
        let len = out.len();
        if len == 0 || self.finished {
            out.fill(0.0);
            return 0;
        }

        let target_pitch = target_pitch.max(MIN_PITCH);
        let pitch_step = (target_pitch - self.pitch) / len as f32;
        let mut cursor = ResampleCursor::new(self.position, self.pitch, 0);
        while cursor.out_offset < len {
            if cursor.in_offset >= self.sector_end() {
                self.position = cursor.in_offset;
                self.slide();
                cursor.in_offset = self.position;
                continue;
            }

            let in_end = match self.data_end() {
                Some(end) if cursor.in_offset >= end => {
                    self.finished = true;
                    break;
                }
                Some(end) => end.min(self.sector_end()),
                None => self.sector_end(),
            };

            let before = cursor;
            self.resampler.interpolate(
                &self.window,
                &mut cursor,
                in_end as f32,
                pitch_step,
                out,
                len,
            );
            if cursor == before {
                break;
            }
        }
        if self.data_end().is_some_and(|end| cursor.in_offset >= end) {
            self.finished = true;
        }

        self.position = cursor.in_offset;
        self.pitch = if cursor.out_offset == len {
            target_pitch
        } else {
            cursor.pitch.max(MIN_PITCH)
        };
        out[cursor.out_offset..].fill(0.0);
        cursor.out_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::resampler::Interpolation;

    fn ramp(frames: usize) -> Arc<[f32]> {
        (0..frames).map(|i| i as f32).collect()
    }

    #[test]
    fn test_unity_pitch_reproduces_sample() {
        for interpolation in [
            Interpolation::Point,
            Interpolation::Linear,
            Interpolation::LinearFixed,
            Interpolation::Cubic,
        ] {
            let mut oscillator =
                SampleOscillator::new(ramp(2000), None, interpolation.resampler(), 1.0);
            let mut out = vec![0.0; 1500];
            assert_eq!(oscillator.render(&mut out, 1.0), 1500);
            for (i, s) in out.iter().enumerate() {
                assert!((s - i as f32).abs() < 1e-3, "{} at {}: {}", interpolation, i, s);
            }
        }
    }

    #[test]
    fn test_one_shot_finishes() {
        let mut oscillator =
            SampleOscillator::new(ramp(100), None, Interpolation::Linear.resampler(), 1.0);
        let mut out = vec![1.0; 256];
        let produced = oscillator.render(&mut out, 1.0);
        assert!(oscillator.is_finished());
        assert!((100..=101).contains(&produced), "{}", produced);
        assert!(out[produced..].iter().all(|s| *s == 0.0));

        assert_eq!(oscillator.render(&mut out, 1.0), 0);
    }

    #[test]
    fn test_forward_loop() {
        let sample_loop = SampleLoop::new(10, 20, LoopMode::Forward);
        let mut oscillator = SampleOscillator::new(
            ramp(30),
            Some(sample_loop),
            Interpolation::Point.resampler(),
            1.0,
        );
        let mut out = vec![0.0; 5000];
        assert_eq!(oscillator.render(&mut out, 1.0), 5000);
        assert!(!oscillator.is_finished());
        assert_eq!(out[29], 29.0);
        assert_eq!(out[30], 10.0);
        assert_eq!(out[4999], (10 + (4999 - 10) % 20) as f32);

        oscillator.release();
        assert_eq!(oscillator.render(&mut out, 1.0), 5000);
    }

    #[test]
    fn test_loop_until_release_plays_tail() {
        let sample_loop = SampleLoop::new(10, 20, LoopMode::UntilRelease);
        let mut oscillator = SampleOscillator::new(
            ramp(40),
            Some(sample_loop),
            Interpolation::Point.resampler(),
            1.0,
        );
        let mut out = vec![0.0; 1000];
        oscillator.render(&mut out, 1.0);
        // 1000 frames in: position 10 + (1000 - 10) % 20 = 20.
        oscillator.release();

        let mut tail = vec![-1.0; 100];
        let produced = oscillator.render(&mut tail, 1.0);
        assert_eq!(tail[0], 20.0);
        assert_eq!(tail[9], 29.0);
        // No wrap after release: straight on into the tail.
        assert_eq!(tail[10], 30.0);
        assert_eq!(tail[19], 39.0);
        assert_eq!(produced, 20);
        assert!(oscillator.is_finished());
    }

    #[test]
    fn test_pitch_glides_to_target() {
        let mut oscillator =
            SampleOscillator::new(ramp(10000), None, Interpolation::Linear.resampler(), 1.0);
        let mut out = vec![0.0; 100];
        oscillator.render(&mut out, 2.0);
        assert_eq!(oscillator.pitch(), 2.0);
        // Steps grow across the block.
        assert!(out[1] - out[0] < out[99] - out[98]);
    }

    #[test]
    fn test_long_playback_stays_precise() {
        let frames: Arc<[f32]> = (0..64).map(|i| (i as f32 * 0.3).sin()).collect();
        let sample_loop = SampleLoop::new(0, 64, LoopMode::Forward);
        let mut oscillator = SampleOscillator::new(
            frames.clone(),
            Some(sample_loop),
            Interpolation::Point.resampler(),
            1.0,
        );
        let mut out = vec![0.0; 4096];
        for _ in 0..200 {
            oscillator.render(&mut out, 1.0);
        }
        // Hundreds of thousands of frames in, the read position still lands
        // exactly on whole frames.
        for (i, s) in out.iter().enumerate() {
            assert_eq!(*s, frames[i % 64]);
        }
    }
}

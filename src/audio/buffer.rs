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
use std::mem;

use super::convert::PcmConverter;
use super::format::AudioFormat;

/// One block of float audio for a single output channel.
///
/// The sample array is allocated on first use and reused afterwards; the frame
/// count never changes. Buffers are handed between stages with [`swap`], which
/// exchanges storage without copying sample data.
///
/// [`swap`]: AudioFrameBuffer::swap
pub struct AudioFrameBuffer {
    /// Number of frames in the block.
    size: usize,
    /// Format of the PCM stream this buffer is converted to/from.
    format: AudioFormat,
    /// Float samples, allocated lazily.
    data: Option<Vec<f32>>,
    /// True if nothing has been written since the last clear.
    empty: bool,
    /// Scratch space for multi-channel conversion. Grows, never shrinks.
    converter_buffer: Vec<u8>,
}

impl AudioFrameBuffer {
    /// Creates a silent buffer of `size` frames.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize, format: AudioFormat) -> Self {
        assert!(size > 0, "audio frame buffer size must be non-zero");
        AudioFrameBuffer {
            size,
            format,
            data: None,
            empty: true,
            converter_buffer: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    /// Returns true if the buffer hasn't been written to since the last clear.
    pub fn is_silent(&self) -> bool {
        self.empty
    }

    /// Returns the writable sample array, allocating it as silence on first use.
    /// Callers asking for the array are assumed to write, so the buffer stops being silent.
    pub fn array(&mut self) -> &mut [f32] {
        self.empty = false;
        self.storage()
    }

    /// Returns a read-only view of the samples, or `None` if nothing was ever allocated.
    pub fn samples(&self) -> Option<&[f32]> {
        self.data.as_deref()
    }

    /// Zeroes the samples, skipping the work if the buffer is already silent.
    pub fn clear(&mut self) {
        if !self.empty {
            if let Some(data) = self.data.as_mut() {
                data.fill(0.0);
            }
            self.empty = true;
        }
    }

    /// Exchanges every piece of state with `other`. No sample data is copied or allocated.
    pub fn swap(&mut self, other: &mut AudioFrameBuffer) {
        mem::swap(self, other);
    }

    /// Encodes the samples into `channel`'s slot of every frame in `destination`,
    /// which holds interleaved PCM in this buffer's format.
    ///
    /// Channels outside the format are ignored. `destination` should hold
    /// `size() * format().frame_size()` bytes; only whole frames are written.
    pub fn get(&mut self, destination: &mut [u8], channel: usize) {
        let channels = self.format.channels() as usize;
        if channel >= channels {
            return;
        }

        let converter = PcmConverter::new(&self.format);
        let sample_size = converter.sample_size();
        let frame_size = self.format.frame_size();
        let frames = self.size.min(destination.len() / frame_size);

        if channels == 1 {
            let samples = &self.storage()[..frames];
            converter.encode(samples, &mut destination[..frames * sample_size]);
            return;
        }

        let needed = frames * sample_size;
        if self.converter_buffer.len() < needed {
            self.converter_buffer.resize(needed, 0);
        }

        // Split the borrows so the storage and the scratch can be used together.
        let size = self.size;
        let data = self.data.get_or_insert_with(|| vec![0.0; size]);
        converter.encode(&data[..frames], &mut self.converter_buffer[..needed]);

        let offset = channel * sample_size;
        for (frame, sample) in self.converter_buffer[..needed]
            .chunks_exact(sample_size)
            .enumerate()
        {
            let start = frame * frame_size + offset;
            destination[start..start + sample_size].copy_from_slice(sample);
        }
    }

    /// Decodes `channel`'s slot of every frame in interleaved `source` into this buffer.
    ///
    /// Channels outside the format are ignored. Marks the buffer as written.
    pub fn set(&mut self, source: &[u8], channel: usize) {
        let channels = self.format.channels() as usize;
        if channel >= channels {
            return;
        }

        let converter = PcmConverter::new(&self.format);
        let sample_size = converter.sample_size();
        let frame_size = self.format.frame_size();
        let frames = self.size.min(source.len() / frame_size);

        if channels == 1 {
            let data = self.array();
            converter.decode(&source[..frames * sample_size], &mut data[..frames]);
            return;
        }

        let needed = frames * sample_size;
        if self.converter_buffer.len() < needed {
            self.converter_buffer.resize(needed, 0);
        }

        let offset = channel * sample_size;
        for (frame, sample) in self.converter_buffer[..needed]
            .chunks_exact_mut(sample_size)
            .enumerate()
        {
            let start = frame * frame_size + offset;
            sample.copy_from_slice(&source[start..start + sample_size]);
        }

        self.empty = false;
        let size = self.size;
        let data = self.data.get_or_insert_with(|| vec![0.0; size]);
        converter.decode(&self.converter_buffer[..needed], &mut data[..frames]);
    }

    /// Returns the sample storage, allocating silence if needed, without touching the silent flag.
    fn storage(&mut self) -> &mut [f32] {
        let size = self.size;
        self.data.get_or_insert_with(|| vec![0.0; size])
    }
}

impl std::fmt::Debug for AudioFrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrameBuffer")
            .field("size", &self.size)
            .field("format", &self.format)
            .field("allocated", &self.data.is_some())
            .field("silent", &self.empty)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::SampleEncoding;

    fn mono() -> AudioFormat {
        AudioFormat::pcm16(44100, 1).unwrap()
    }

    #[test]
    fn test_starts_silent() {
        let mut buffer = AudioFrameBuffer::new(128, mono());
        assert!(buffer.is_silent());
        assert!(buffer.samples().is_none());

        buffer.array()[0] = 1.0;
        assert!(!buffer.is_silent());

        buffer.clear();
        assert!(buffer.is_silent());
        assert!(buffer.samples().unwrap().iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_array_is_reused() {
        let mut buffer = AudioFrameBuffer::new(64, mono());
        let first = buffer.array().as_ptr();
        buffer.clear();
        let second = buffer.array().as_ptr();
        assert_eq!(first, second);
        assert_eq!(buffer.array().len(), 64);
    }

    #[test]
    fn test_swap_exchanges_storage() {
        let mut a = AudioFrameBuffer::new(128, mono());
        let mut b = AudioFrameBuffer::new(128, mono());
        a.array().fill(1.0);
        b.clear();

        let a_ptr = a.samples().unwrap().as_ptr();
        a.swap(&mut b);

        assert!(a.is_silent());
        assert!(!b.is_silent());
        assert!(b.samples().unwrap().iter().all(|s| *s == 1.0));
        // Same allocation, just moved.
        assert_eq!(b.samples().unwrap().as_ptr(), a_ptr);
    }

    #[test]
    fn test_get_mono() {
        let mut buffer = AudioFrameBuffer::new(2, mono());
        buffer.array().copy_from_slice(&[1.0, -1.0]);
        let mut out = [0u8; 4];
        buffer.get(&mut out, 0);
        assert_eq!(out, [0xff, 0x7f, 0x01, 0x80]);
    }

    #[test]
    fn test_get_interleaves_channel() {
        let format = AudioFormat::pcm16(44100, 2).unwrap();
        let mut left = AudioFrameBuffer::new(3, format);
        let mut right = AudioFrameBuffer::new(3, format);
        left.array().fill(1.0);

        let mut out = [0xaau8; 12];
        left.get(&mut out, 0);
        right.get(&mut out, 1);

        for frame in out.chunks_exact(4) {
            assert_eq!(i16::from_le_bytes([frame[0], frame[1]]), 32767);
            assert_eq!(i16::from_le_bytes([frame[2], frame[3]]), 0);
        }
        // Reading never marks the buffer as written.
        assert!(right.is_silent());
    }

    #[test]
    fn test_get_ignores_unknown_channel() {
        let format = AudioFormat::pcm16(44100, 2).unwrap();
        let mut buffer = AudioFrameBuffer::new(2, format);
        buffer.array().fill(0.5);
        let mut out = [7u8; 8];
        buffer.get(&mut out, 2);
        assert_eq!(out, [7u8; 8]);
    }

    #[test]
    fn test_set_reads_channel_slot() {
        let format = AudioFormat::new(44100, 2, 8, SampleEncoding::Signed, false).unwrap();
        let mut buffer = AudioFrameBuffer::new(2, format);
        // Frames: (127, 0), (-127, 0)
        buffer.set(&[127, 0, 0x81, 0], 0);
        assert!(!buffer.is_silent());
        assert_eq!(buffer.samples().unwrap(), &[1.0, -1.0]);
    }
}

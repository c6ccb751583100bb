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

//! The synthesis engine.
//!
//! MIDI arrives through a [`Receiver`], is applied to [`Channel`]s at block
//! boundaries, and the channels' [`voice::Voice`]s render soundbank samples
//! through [`oscillator::SampleOscillator`]s into the main mix. Reading from a
//! [`Synthesizer`] (or a shared [`SynthStream`]) yields the mix as PCM bytes.

pub mod channel;
pub mod envelope;
pub mod mixer;
pub mod modulation;
pub mod oscillator;
pub mod receiver;
pub mod synthesizer;
pub mod tone;
pub mod voice;

pub use channel::Channel;
pub use mixer::{ChannelMixer, MidiChannel};
pub use receiver::{Receiver, ReceiverError};
pub use synthesizer::{SynthSettings, SynthStream, Synthesizer};
pub use tone::ToneMixer;

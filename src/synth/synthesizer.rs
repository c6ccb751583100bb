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
use std::{
    fmt,
    io::{self, Read},
    sync::Arc,
};

use crossbeam_channel::{Receiver as EventReceiver, Sender};
use midly::MidiMessage;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, span, Level};

use crate::{
    audio::{buffer::AudioFrameBuffer, format::AudioFormat, resampler::Interpolation},
    config::{self, ConfigError},
    soundbank::Soundbank,
};

use super::{
    channel::Channel,
    mixer::{ChannelMixer, MidiChannel},
    receiver::{MidiEvent, Receiver},
};

/// Number of MIDI channels.
pub const CHANNELS: usize = 16;

/// Rendering parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthSettings {
    /// Output format of the PCM stream.
    pub format: AudioFormat,
    /// Voices allowed to sound at once, across all channels.
    pub polyphony: usize,
    pub interpolation: Interpolation,
    /// Frames rendered per block. MIDI events take effect on block boundaries.
    pub block_size: usize,
    /// Master gain.
    pub gain: f32,
}

impl SynthSettings {
    pub fn new(format: AudioFormat) -> Self {
        let synth = config::Synth::default();
        SynthSettings {
            format,
            polyphony: synth.polyphony(),
            interpolation: Interpolation::default(),
            block_size: synth.block_size(),
            gain: synth.gain(),
        }
    }

    pub fn from_config(
        audio: &config::Audio,
        synth: &config::Synth,
    ) -> Result<SynthSettings, ConfigError> {
        Ok(SynthSettings {
            format: audio.format()?,
            polyphony: synth.polyphony(),
            interpolation: synth.interpolation()?,
            block_size: synth.block_size(),
            gain: synth.gain(),
        })
    }
}

/// Applies a channel message to anything with a MIDI channel surface.
pub fn dispatch<C: MidiChannel + ?Sized>(target: &mut C, message: &MidiMessage) {
    match *message {
        MidiMessage::NoteOff { key, vel } => target.note_off(key.as_int(), vel.as_int()),
        MidiMessage::NoteOn { key, vel } => target.note_on(key.as_int(), vel.as_int()),
        MidiMessage::Aftertouch { key, vel } => target.set_poly_pressure(key.as_int(), vel.as_int()),
        MidiMessage::Controller { controller, value } => {
            target.control_change(controller.as_int(), value.as_int())
        }
        MidiMessage::ProgramChange { program } => target.program_change(program.as_int()),
        MidiMessage::ChannelAftertouch { vel } => target.set_channel_pressure(vel.as_int()),
        MidiMessage::PitchBend { bend } => target.set_pitch_bend(bend.0.as_int()),
    }
}

/// The synthesizer: sixteen MIDI channels playing a soundbank, plus any
/// attached [`ChannelMixer`]s, rendered block by block into a PCM byte stream.
///
/// Reading from the synthesizer renders audio. MIDI events queued through a
/// [`Receiver`] are applied at the start of each block.
pub struct Synthesizer {
    settings: SynthSettings,
    soundbank: Arc<Soundbank>,
    channels: Vec<Channel>,
    mixers: Vec<(u8, Box<dyn ChannelMixer>)>,
    events_tx: Sender<MidiEvent>,
    events_rx: EventReceiver<MidiEvent>,
    /// Buffers being rendered into.
    mix: Vec<AudioFrameBuffer>,
    /// Buffers holding the last finished block.
    out: Vec<AudioFrameBuffer>,
    /// Where muted channels render, so their voices keep time.
    discard: Vec<AudioFrameBuffer>,
    /// Encoded bytes of the last block not yet read.
    pending: Vec<u8>,
    pending_offset: usize,
    closed: bool,
    frames_rendered: u64,
}

impl Synthesizer {
    /// Creates a synthesizer playing `soundbank`.
    ///
    /// # Panics
    ///
    /// Panics if the block size is zero.
    pub fn new(settings: SynthSettings, soundbank: Arc<Soundbank>) -> Self {
        let channel_count = settings.format.channels() as usize;
        let buffers = || -> Vec<AudioFrameBuffer> {
            (0..channel_count)
                .map(|_| AudioFrameBuffer::new(settings.block_size, settings.format))
                .collect()
        };
        let channels = (0..CHANNELS as u8)
            .map(|number| {
                Channel::new(
                    number,
                    soundbank.clone(),
                    settings.polyphony,
                    settings.format.sample_rate(),
                    settings.interpolation,
                )
            })
            .collect();
        let (events_tx, events_rx) = crossbeam_channel::unbounded();

        info!(
            soundbank = soundbank.name(),
            sample_rate = settings.format.sample_rate(),
            channels = channel_count,
            block_size = settings.block_size,
            interpolation = %settings.interpolation,
            "Created synthesizer"
        );

        Synthesizer {
            mix: buffers(),
            out: buffers(),
            discard: buffers(),
            pending: Vec::with_capacity(settings.block_size * settings.format.frame_size()),
            pending_offset: 0,
            settings,
            soundbank,
            channels,
            mixers: Vec::new(),
            events_tx,
            events_rx,
            closed: false,
            frames_rendered: 0,
        }
    }

    pub fn settings(&self) -> &SynthSettings {
        &self.settings
    }

    pub fn format(&self) -> &AudioFormat {
        &self.settings.format
    }

    pub fn soundbank(&self) -> &Arc<Soundbank> {
        &self.soundbank
    }

    /// A handle for queueing MIDI to this synthesizer from any thread.
    pub fn receiver(&self) -> Receiver {
        Receiver::new(self.events_tx.clone())
    }

    /// Direct access to a channel. `None` if `channel` isn't 0 to 15.
    pub fn channel(&mut self, channel: u8) -> Option<&mut Channel> {
        self.channels.get_mut(channel as usize)
    }

    /// Attaches a mixer to `channel`. It receives that channel's MIDI messages and
    /// renders into the main mix until it stops.
    pub fn add_mixer(&mut self, channel: u8, mixer: Box<dyn ChannelMixer>) {
        debug!(channel, "Adding channel mixer");
        self.mixers.push((channel & 0x0f, mixer));
    }

    pub fn mixer_count(&self) -> usize {
        self.mixers.len()
    }

    /// Voices sounding across every channel.
    pub fn active_voices(&self) -> usize {
        self.channels.iter().map(|c| c.voices().len()).sum()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Applies a channel message right away.
    pub fn send(&mut self, channel: u8, message: &MidiMessage) {
        let channel = channel & 0x0f;
        if let Some(target) = self.channels.get_mut(channel as usize) {
            dispatch(target, message);
        }
        for (_, mixer) in self.mixers.iter_mut().filter(|(c, _)| *c == channel) {
            dispatch(mixer.as_mut(), message);
        }
    }

    /// Ends the stream. Audio already rendered can still be read; after that reads
    /// return end of stream.
    pub fn close(&mut self) {
        if !self.closed {
            info!(frames = self.frames_rendered, "Closing synthesizer");
        }
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn drain_events(&mut self) {
        while let Ok((channel, message)) = self.events_rx.try_recv() {
            self.send(channel, &message);
        }
    }

    fn enforce_polyphony(&mut self) {
        while self.active_voices() > self.settings.polyphony {
            let oldest = self
                .channels
                .iter_mut()
                .filter_map(|c| c.voices().oldest().map(|id| (id, c)))
                .min_by_key(|(id, _)| *id);
            match oldest {
                Some((_, channel)) => {
                    channel.voices_mut().steal_oldest();
                }
                None => break,
            }
        }
    }

    /// Renders one block and encodes it into the pending bytes.
    pub fn render_block(&mut self) {
        self.drain_events();
        self.enforce_polyphony();

        let len = self.settings.block_size;
        for buffer in self.mix.iter_mut().chain(self.discard.iter_mut()) {
            buffer.clear();
        }

        let any_solo = self.channels.iter().any(|c| c.solo());
        let mut channel_audible = [false; CHANNELS];
        for (channel, audible) in self.channels.iter_mut().zip(channel_audible.iter_mut()) {
            *audible = !channel.mute() && (!any_solo || channel.solo());
            let target = if *audible {
                &mut self.mix
            } else {
                &mut self.discard
            };
            channel.render(target, 0, len);
        }

        let (mix, discard) = (&mut self.mix, &mut self.discard);
        self.mixers.retain_mut(|(channel, mixer)| {
            let target = if channel_audible[*channel as usize] {
                &mut *mix
            } else {
                &mut *discard
            };
            let active = mixer.process(target, 0, len);
            if !active {
                debug!(channel = *channel, "Dropping stopped channel mixer");
            }
            active
        });

        let gain = self.settings.gain;
        for buffer in self.mix.iter_mut().filter(|b| !b.is_silent()) {
            buffer.array().iter_mut().for_each(|s| *s *= gain);
        }

        for (mix, out) in self.mix.iter_mut().zip(self.out.iter_mut()) {
            mix.swap(out);
        }

        let frame_size = self.settings.format.frame_size();
        self.pending.resize(len * frame_size, 0);
        for (channel, buffer) in self.out.iter_mut().enumerate() {
            buffer.get(&mut self.pending, channel);
        }
        self.pending_offset = 0;
        self.frames_rendered += len as u64;
    }

    /// The last rendered block, one buffer per output channel.
    pub fn output(&self) -> &[AudioFrameBuffer] {
        &self.out
    }
}

impl Read for Synthesizer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending_offset >= self.pending.len() {
            if self.closed {
                return Ok(0);
            }
            self.render_block();
        }

        let available = &self.pending[self.pending_offset..];
        let count = available.len().min(buf.len());
        buf[..count].copy_from_slice(&available[..count]);
        self.pending_offset += count;
        Ok(count)
    }
}

impl fmt::Display for Synthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Synthesizer ({} Hz, {} channels, {})",
            self.settings.format.sample_rate(),
            self.settings.format.channels(),
            self.soundbank.name()
        )
    }
}

/// A cloneable, thread safe handle to a synthesizer that reads its PCM stream.
///
/// One clone is typically handed to an audio pusher while others queue MIDI,
/// attach mixers or close the stream.
#[derive(Clone)]
pub struct SynthStream {
    synth: Arc<Mutex<Synthesizer>>,
}

impl SynthStream {
    pub fn new(synth: Synthesizer) -> Self {
        SynthStream {
            synth: Arc::new(Mutex::new(synth)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Synthesizer> {
        self.synth.lock()
    }

    pub fn receiver(&self) -> Receiver {
        self.synth.lock().receiver()
    }

    pub fn close(&self) {
        self.synth.lock().close();
    }
}

impl Read for SynthStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let span = span!(Level::TRACE, "synth read");
        let _enter = span.enter();
        self.synth.lock().read(buf)
    }
}

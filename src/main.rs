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
    error::Error,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use clap::{crate_version, Parser, Subcommand};
use hound::{SampleFormat, WavSpec, WavWriter};
use midly::{num::u7, MidiMessage};
use tracing::info;
use tracing_subscriber::EnvFilter;

use softsynth::{
    audio::{cpal::CpalLine, mock::MockLine, AudioPusher},
    config::{self, Softsynth},
    midi,
    soundbank::builtin::builtin,
    synth::{channel::PERCUSSION_CHANNEL, SynthSettings, SynthStream, Synthesizer, ToneMixer},
};

/// Velocity used for rendered notes.
const RENDER_VELOCITY: u8 = 100;

/// Upper bound on the release tail written after the last note.
const MAX_TAIL_SECONDS: f64 = 5.0;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A software wavetable synthesizer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Plays MIDI input through the audio interface.
    Play {
        /// The path to the YAML configuration.
        config_path: Option<PathBuf>,
        /// The program to select on every melodic channel.
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..128))]
        program: Option<u8>,
        /// Stop after this many seconds. Plays until killed if unset.
        #[arg(short, long)]
        seconds: Option<f64>,
        /// Also play a sine tone on the first channel.
        #[arg(short, long)]
        tone: bool,
    },
    /// Renders a sequence of notes to a WAV file.
    Render {
        /// The WAV file to write.
        output: PathBuf,
        /// The path to the YAML configuration. Only the audio and synth sections are used.
        #[arg(short, long)]
        config_path: Option<PathBuf>,
        /// The program to play the notes with.
        #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..128))]
        program: u8,
        /// The keys to play, one after another. Should be in the form <KEY>,<KEY>,...
        /// For example, 60,64,67,72.
        #[arg(short, long, default_value = "60,64,67,72")]
        notes: String,
        /// How long each note is held, in seconds.
        #[arg(short = 'l', long, default_value_t = 0.5)]
        note_length: f64,
        /// Play a kick drum on every note.
        #[arg(short, long)]
        drums: bool,
        /// Also play a sine tone on the first channel.
        #[arg(short, long)]
        tone: bool,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = softsynth::audio::cpal::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            config_path,
            program,
            seconds,
            tone,
        } => {
            let config = load_config(config_path.as_deref())?;
            let synth = build_synth(&config, program, tone)?;
            let stream = SynthStream::new(synth);

            // Keep the connection open for as long as we play.
            let _midi = match config.midi() {
                Some(midi) => Some(midi::connect(midi, stream.receiver())?),
                None => {
                    info!("No MIDI input configured.");
                    None
                }
            };

            let audio = config.audio();
            let work_buffer_size = audio.work_buffer_frames() * audio.format()?.frame_size();
            let limit = seconds.map(Duration::from_secs_f64);
            if audio.is_mock() {
                let line = MockLine::get(audio.device()).paced(audio.format()?);
                pump(stream, line, work_buffer_size, limit)?;
            } else {
                let line = CpalLine::open(&audio)?;
                pump(stream, line, work_buffer_size, limit)?;
            }
        }
        Commands::Render {
            output,
            config_path,
            program,
            notes,
            note_length,
            drums,
            tone,
        } => {
            let config = load_config(config_path.as_deref())?;
            let keys = parse_notes(&notes)?;
            let synth = build_synth(&config, Some(program), tone)?;
            render(synth, &keys, note_length, drums, &output)?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Softsynth, Box<dyn Error>> {
    Ok(match path {
        Some(path) => config::load(path)?,
        None => Softsynth::default(),
    })
}

/// Builds a synthesizer playing the built-in bank.
fn build_synth(
    config: &Softsynth,
    program: Option<u8>,
    tone: bool,
) -> Result<Synthesizer, Box<dyn Error>> {
    let settings = SynthSettings::from_config(&config.audio(), &config.synth())?;
    let mut synth = Synthesizer::new(settings, Arc::new(builtin()?));
    if let Some(program) = program {
        for channel in (0..16).filter(|c| *c != PERCUSSION_CHANNEL) {
            synth.send(
                channel,
                &MidiMessage::ProgramChange {
                    program: u7::new(program),
                },
            );
        }
    }
    if tone {
        synth.add_mixer(0, Box::new(ToneMixer::new(settings.format.sample_rate(), 0.05)));
    }
    info!(synth = %synth, "Synthesizer ready.");
    Ok(synth)
}

/// Pushes the stream into the sink until the pusher stops or the limit passes.
fn pump<W>(
    stream: SynthStream,
    sink: W,
    work_buffer_size: usize,
    limit: Option<Duration>,
) -> Result<(), Box<dyn Error>>
where
    W: Write + Send + 'static,
{
    let mut pusher = AudioPusher::new(stream.clone(), sink, work_buffer_size);
    pusher.start()?;

    let start = Instant::now();
    while pusher.is_active() {
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    stream.close();
    pusher.stop();
    info!(
        frames = stream.lock().frames_rendered(),
        "Playback finished."
    );
    Ok(())
}

fn parse_notes(notes: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    notes
        .split(',')
        .map(|note| -> Result<u8, Box<dyn Error>> {
            let key = note.trim().parse::<u8>()?;
            if key > 127 {
                return Err(format!("note {} is out of range", key).into());
            }
            Ok(key)
        })
        .collect()
}

/// A message due at a frame.
struct ScoreEvent {
    frame: u64,
    channel: u8,
    message: MidiMessage,
}

fn note(frame: u64, channel: u8, key: u8, vel: u8) -> ScoreEvent {
    ScoreEvent {
        frame,
        channel,
        message: MidiMessage::NoteOn {
            key: u7::new(key),
            vel: u7::new(vel),
        },
    }
}

/// Plays the keys one after another and writes the result, with its release
/// tail, to a 16-bit WAV file.
fn render(
    mut synth: Synthesizer,
    keys: &[u8],
    note_length: f64,
    drums: bool,
    output: &Path,
) -> Result<(), Box<dyn Error>> {
    let format = *synth.format();
    let step = (note_length * format.sample_rate() as f64).max(1.0) as u64;

    let mut score = Vec::new();
    for (index, key) in keys.iter().enumerate() {
        let frame = index as u64 * step;
        score.push(note(frame, 0, *key, RENDER_VELOCITY));
        score.push(note(frame + step, 0, *key, 0));
        if drums {
            score.push(note(frame, PERCUSSION_CHANNEL, 36, RENDER_VELOCITY));
            score.push(note(frame + step / 2, PERCUSSION_CHANNEL, 36, 0));
        }
    }
    score.sort_by_key(|event| event.frame);
    let end = keys.len() as u64 * step;
    let tail = (MAX_TAIL_SECONDS * format.sample_rate() as f64) as u64;

    let spec = WavSpec {
        channels: format.channels(),
        sample_rate: format.sample_rate(),
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(output, spec)?;

    let receiver = synth.receiver();
    let mut next = 0;
    loop {
        let frame = synth.frames_rendered();
        while next < score.len() && score[next].frame <= frame {
            receiver.send_message(score[next].channel, score[next].message)?;
            next += 1;
        }
        if next == score.len() && frame >= end && (synth.active_voices() == 0 || frame >= end + tail)
        {
            break;
        }

        synth.render_block();
        let blocks = synth.output();
        for index in 0..synth.settings().block_size {
            for buffer in blocks {
                let sample = buffer.samples().map_or(0.0, |samples| samples[index]);
                writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
        }
    }
    writer.finalize()?;

    synth.close();
    info!(
        path = %output.display(),
        frames = synth.frames_rendered(),
        "Rendered."
    );
    Ok(())
}

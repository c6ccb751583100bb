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

//! A small procedurally generated soundbank, so the synthesizer makes sound
//! without any bank files.
//!
//! Melodic tones are built from single waveform cycles repeated so the loop is
//! seamless; drums are generated noise and sweeps. Everything is deterministic.

use std::{f32::consts::PI, sync::Arc};

use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

use super::{
    connection::{ConnectionBlock, Destination},
    dls::{DlsLoop, DlsLoopType, DlsRegion, DlsSampleOptions},
    sf2::{
        Sf2Region, GENERATOR_ATTACK_VOL_ENV, GENERATOR_DECAY_VOL_ENV, GENERATOR_EXCLUSIVE_CLASS,
        GENERATOR_INITIAL_ATTENUATION, GENERATOR_KEY_RANGE, GENERATOR_OVERRIDING_ROOT_KEY,
        GENERATOR_PAN, GENERATOR_RELEASE_VOL_ENV, GENERATOR_SAMPLE_MODES,
        GENERATOR_SUSTAIN_VOL_ENV,
    },
    performer::Performer,
    Instrument, LoopMode, Patch, Sample, SampleLoop, SoundbankError, Soundbank,
};

const SAMPLE_RATE: u32 = 44100;
const PEAK: f32 = 0.8;

/// Representative programs of the three melodic voicings.
pub const PIANO: u8 = 0;
pub const ORGAN: u8 = 16;
pub const BASS: u8 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Voicing {
    Piano,
    Organ,
    Bass,
}

/// The General MIDI program families, eight programs each, and the voicing
/// standing in for each.
const FAMILIES: [(&str, Voicing); 16] = [
    ("Piano", Voicing::Piano),
    ("Chromatic Percussion", Voicing::Piano),
    ("Organ", Voicing::Organ),
    ("Guitar", Voicing::Piano),
    ("Bass", Voicing::Bass),
    ("Strings", Voicing::Organ),
    ("Ensemble", Voicing::Organ),
    ("Brass", Voicing::Organ),
    ("Reed", Voicing::Organ),
    ("Pipe", Voicing::Organ),
    ("Synth Lead", Voicing::Organ),
    ("Synth Pad", Voicing::Organ),
    ("Synth Effects", Voicing::Organ),
    ("Ethnic", Voicing::Piano),
    ("Percussive", Voicing::Piano),
    ("Sound Effects", Voicing::Piano),
];

/// Builds the built-in soundbank: every General MIDI program on bank 0, voiced
/// by family, plus a standard drum kit.
pub fn builtin() -> Result<Soundbank, SoundbankError> {
    let mut bank = Soundbank::new(
        "Built-in",
        "softsynth",
        "Procedurally generated fallback instruments",
    );

    let (piano, organ, bass) = (piano()?, organ()?, bass()?);
    for (family, (name, voicing)) in FAMILIES.iter().enumerate() {
        let performer = match voicing {
            Voicing::Piano => &piano,
            Voicing::Organ => &organ,
            Voicing::Bass => &bass,
        };
        for offset in 0..8 {
            let program = (family * 8 + offset) as u8;
            bank.add_instrument(Instrument::new(
                name,
                Patch::new(0, program),
                vec![performer.clone()],
            ));
        }
    }
    bank.add_instrument(drum_kit()?);
    info!(
        instruments = bank.instruments().len(),
        "Built the built-in soundbank"
    );
    Ok(bank)
}

/// Returns the MIDI note and cents correction for `frequency`.
fn tuning(frequency: f32) -> (u8, i16) {
    let note = 69.0 + 12.0 * (frequency / 440.0).log2();
    let unity = note.round().clamp(0.0, 127.0);
    (unity as u8, ((unity - note) * 100.0).round() as i16)
}

/// Repeats one cycle of summed harmonics `cycles` times.
fn harmonic_wave(period: usize, cycles: usize, harmonics: &[(usize, f32)]) -> Vec<f32> {
    let mut cycle: Vec<f32> = (0..period)
        .map(|i| {
            let phase = 2.0 * PI * i as f32 / period as f32;
            harmonics
                .iter()
                .map(|(n, amp)| amp * (phase * *n as f32).sin())
                .sum()
        })
        .collect();
    normalize(&mut cycle, PEAK);
    cycle.repeat(cycles)
}

fn normalize(data: &mut [f32], target: f32) {
    let peak = data.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        data.iter_mut().for_each(|s| *s *= target / peak);
    }
}

fn fade_in(data: &mut [f32], samples: usize) {
    let samples = samples.min(data.len());
    for (i, s) in data[..samples].iter_mut().enumerate() {
        *s *= i as f32 / samples as f32;
    }
}

/// A looped tone sample built from `period` sample cycles.
fn looped_tone(
    name: &str,
    period: usize,
    harmonics: &[(usize, f32)],
) -> Result<Arc<Sample>, SoundbankError> {
    let cycles = 16;
    let frames = harmonic_wave(period, cycles, harmonics);
    let (unity, fine) = tuning(SAMPLE_RATE as f32 / period as f32);
    let sample = Sample::from_frames(name, &frames, SAMPLE_RATE)?
        .with_unity_note(unity)
        .with_fine_tune(fine)
        .with_loop(SampleLoop::new(period, period * (cycles - 1), LoopMode::Forward))?;
    Ok(Arc::new(sample))
}

fn piano() -> Result<Performer, SoundbankError> {
    let harmonics: Vec<(usize, f32)> = (1..=12)
        .map(|n| (n, 1.0 / (n as f32).powf(1.5)))
        .collect();
    let sample = looped_tone("Piano", 256, &harmonics)?;

    let mut region = Sf2Region::new(sample);
    region.put(GENERATOR_SAMPLE_MODES, 1);
    region.put(GENERATOR_DECAY_VOL_ENV, 2400);
    region.put(GENERATOR_SUSTAIN_VOL_ENV, 1000);
    region.put(GENERATOR_RELEASE_VOL_ENV, -1800);
    region.to_performer("Piano")
}

fn organ() -> Result<Performer, SoundbankError> {
    let sample = looped_tone(
        "Organ",
        256,
        &[(1, 1.0), (2, 0.7), (3, 0.5), (4, 0.35), (6, 0.25), (8, 0.2)],
    )?;
    let sample_loop = sample.sample_loop();

    let mut region = DlsRegion::new(sample.clone());
    region.sample_options = Some(DlsSampleOptions {
        unity_note: sample.unity_note(),
        fine_tune: sample.fine_tune(),
        attenuation: 0,
        loops: sample_loop
            .map(|l| DlsLoop {
                loop_type: DlsLoopType::Forward,
                start: l.start,
                length: l.length,
            })
            .into_iter()
            .collect(),
    });
    let articulation = [
        ConnectionBlock::constant(Destination::EnvelopeAttack, -6000.0),
        ConnectionBlock::constant(Destination::EnvelopeSustain, 1000.0),
        ConnectionBlock::constant(Destination::EnvelopeRelease, -2400.0),
        ConnectionBlock::constant(Destination::Gain, -30.0),
    ];
    region.to_performer("Organ", &articulation)
}

fn bass() -> Result<Performer, SoundbankError> {
    let harmonics: Vec<(usize, f32)> = (1..=8).map(|n| (n, 1.0 / n as f32)).collect();
    let sample = looped_tone("Bass", 512, &harmonics)?;

    let mut region = Sf2Region::new(sample);
    region.put(GENERATOR_SAMPLE_MODES, 1);
    region.put(GENERATOR_ATTACK_VOL_ENV, -7000);
    region.put(GENERATOR_DECAY_VOL_ENV, 1800);
    region.put(GENERATOR_SUSTAIN_VOL_ENV, 1440);
    region.put(GENERATOR_RELEASE_VOL_ENV, -3000);
    region.to_performer("Bass")
}

/// Generates `seconds` of audio with `f(t, noise)`.
fn render(seconds: f32, rng: &mut StdRng, f: impl Fn(f32, f32) -> f32) -> Vec<f32> {
    let frames = (seconds * SAMPLE_RATE as f32) as usize;
    let mut data: Vec<f32> = (0..frames)
        .map(|i| f(i as f32 / SAMPLE_RATE as f32, rng.gen_range(-1.0..1.0)))
        .collect();
    normalize(&mut data, PEAK);
    fade_in(&mut data, 5);
    data
}

/// Differentiated noise: white noise tilted towards the top end.
fn bright_noise(seconds: f32, rng: &mut StdRng, decay: f32) -> Vec<f32> {
    let mut previous = 0.0f32;
    let raw = render(seconds, rng, |_, noise| noise);
    let mut data: Vec<f32> = raw
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let out = (s - previous) * (-t * decay).exp();
            previous = *s;
            out
        })
        .collect();
    normalize(&mut data, PEAK);
    data
}

fn kick(rng: &mut StdRng) -> Vec<f32> {
    let mut phase = 0.0f32;
    let mut data: Vec<f32> = (0..(0.35 * SAMPLE_RATE as f32) as usize)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let freq = 50.0 + 100.0 * (-t * 30.0).exp();
            phase += 2.0 * PI * freq / SAMPLE_RATE as f32;
            let click = if t < 0.005 {
                rng.gen_range(-0.3f32..0.3)
            } else {
                0.0
            };
            (phase.sin() + click) * (-t * 8.0).exp()
        })
        .collect();
    normalize(&mut data, PEAK);
    fade_in(&mut data, 5);
    data
}

fn snare(rng: &mut StdRng) -> Vec<f32> {
    render(0.25, rng, |t, noise| {
        noise * 0.7 * (-t * 18.0).exp() + (2.0 * PI * 180.0 * t).sin() * 0.5 * (-t * 25.0).exp()
    })
}

struct Drum {
    name: &'static str,
    keys: &'static [u8],
    exclusive_class: i16,
    pan: i16,
}

fn drum_kit() -> Result<Instrument, SoundbankError> {
    let mut rng = StdRng::seed_from_u64(0x5eed_d2);

    let drums: Vec<(Drum, Vec<f32>)> = vec![
        (
            Drum {
                name: "Bass Drum",
                keys: &[35, 36],
                exclusive_class: 0,
                pan: 0,
            },
            kick(&mut rng),
        ),
        (
            Drum {
                name: "Snare Drum",
                keys: &[38, 40],
                exclusive_class: 0,
                pan: 0,
            },
            snare(&mut rng),
        ),
        (
            Drum {
                name: "Closed Hi-Hat",
                keys: &[42, 44],
                exclusive_class: 1,
                pan: 200,
            },
            bright_noise(0.08, &mut rng, 60.0),
        ),
        (
            Drum {
                name: "Open Hi-Hat",
                keys: &[46],
                exclusive_class: 1,
                pan: 200,
            },
            bright_noise(0.6, &mut rng, 6.0),
        ),
        (
            Drum {
                name: "Crash Cymbal",
                keys: &[49, 57],
                exclusive_class: 0,
                pan: -200,
            },
            bright_noise(1.5, &mut rng, 2.5),
        ),
    ];

    let mut performers = Vec::new();
    for (drum, frames) in drums {
        let sample = Arc::new(Sample::from_frames(drum.name, &frames, SAMPLE_RATE)?);
        for &key in drum.keys {
            let mut region = Sf2Region::new(sample.clone());
            region.put_range(GENERATOR_KEY_RANGE, key, key);
            region.put(GENERATOR_OVERRIDING_ROOT_KEY, key as i16);
            region.put(GENERATOR_RELEASE_VOL_ENV, 1200);
            region.put(GENERATOR_INITIAL_ATTENUATION, 20);
            region.put(GENERATOR_PAN, drum.pan);
            if drum.exclusive_class != 0 {
                region.put(GENERATOR_EXCLUSIVE_CLASS, drum.exclusive_class);
            }
            performers.push(region.to_performer(drum.name)?);
        }
    }

    Ok(Instrument::new(
        "Standard Kit",
        Patch::percussion(0, 0),
        performers,
    ))
}

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

//! Volume envelope.

/// Level below which a releasing voice is considered silent (-100 dB).
const SILENCE: f32 = 1.0e-5;

/// Shortest release, so note offs never click.
const MIN_RELEASE_SECONDS: f32 = 0.001;

/// Timecents at or below this are instantaneous.
const INSTANT_TIMECENTS: f32 = -12000.0;

/// Converts timecents to seconds.
pub fn timecents_to_seconds(timecents: f32) -> f32 {
    if timecents <= INSTANT_TIMECENTS {
        0.0
    } else {
        2f32.powf(timecents / 1200.0)
    }
}

/// Envelope times in seconds and the sustain level as a fraction of full scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    pub delay: f32,
    pub attack: f32,
    pub hold: f32,
    /// Time to fall 100 dB.
    pub decay: f32,
    pub sustain: f32,
    /// Time to fall 100 dB.
    pub release: f32,
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        EnvelopeParams {
            delay: 0.0,
            attack: 0.0,
            hold: 0.0,
            decay: 0.0,
            sustain: 1.0,
            release: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Finished,
}

/// Delay, linear attack, hold, exponential decay to sustain, exponential release.
#[derive(Debug, Clone)]
pub struct Envelope {
    params: EnvelopeParams,
    sample_rate: f32,
    stage: Stage,
    level: f32,
    /// Samples spent in the current stage.
    elapsed: usize,
    decay_factor: f32,
    release_factor: f32,
}

/// Per sample multiplier that falls 100 dB over `seconds`.
fn fall_factor(seconds: f32, sample_rate: f32) -> f32 {
    let samples = seconds * sample_rate;
    if samples < 1.0 {
        0.0
    } else {
        SILENCE.powf(1.0 / samples)
    }
}

impl Envelope {
    pub fn new(params: EnvelopeParams, sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let mut envelope = Envelope {
            params,
            sample_rate,
            stage: Stage::Delay,
            level: 0.0,
            elapsed: 0,
            decay_factor: fall_factor(params.decay, sample_rate),
            release_factor: fall_factor(params.release.max(MIN_RELEASE_SECONDS), sample_rate),
        };
        envelope.params.sustain = params.sustain.clamp(0.0, 1.0);
        envelope
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }

    /// Starts the release stage from the current level.
    pub fn release(&mut self) {
        if self.stage != Stage::Finished {
            self.enter(Stage::Release);
        }
    }

    /// Releases over the minimum release time, for voices that are being cut.
    pub fn choke(&mut self) {
        self.release_factor = fall_factor(MIN_RELEASE_SECONDS, self.sample_rate);
        self.release();
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.elapsed = 0;
    }

    fn samples(&self, seconds: f32) -> usize {
        (seconds * self.sample_rate) as usize
    }

    /// Advances one sample and returns the level.
    pub fn next_level(&mut self) -> f32 {
        loop {
            match self.stage {
                Stage::Delay => {
                    if self.elapsed < self.samples(self.params.delay) {
                        break;
                    }
                    self.enter(Stage::Attack);
                }
                Stage::Attack => {
                    let attack = self.samples(self.params.attack);
                    if self.elapsed < attack {
                        self.level = self.elapsed as f32 / attack as f32;
                        break;
                    }
                    self.level = 1.0;
                    self.enter(Stage::Hold);
                }
                Stage::Hold => {
                    if self.elapsed < self.samples(self.params.hold) {
                        break;
                    }
                    self.enter(Stage::Decay);
                }
                Stage::Decay => {
                    let next = self.level * self.decay_factor;
                    if next > self.params.sustain && next >= SILENCE {
                        self.level = next;
                        break;
                    }
                    self.level = self.params.sustain;
                    self.enter(Stage::Sustain);
                }
                Stage::Sustain => {
                    // A silent sustain has nothing left to play.
                    if self.level < SILENCE {
                        self.level = 0.0;
                        self.enter(Stage::Finished);
                    }
                    break;
                }
                Stage::Release => {
                    self.level *= self.release_factor;
                    if self.level < SILENCE {
                        self.level = 0.0;
                        self.enter(Stage::Finished);
                    }
                    break;
                }
                Stage::Finished => break,
            }
        }
        self.elapsed += 1;
        self.level
    }

    /// Multiplies `samples` by successive envelope levels.
    pub fn apply(&mut self, samples: &mut [f32]) {
        for sample in samples {
            *sample *= self.next_level();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 1000;

    fn run(envelope: &mut Envelope, samples: usize) -> Vec<f32> {
        (0..samples).map(|_| envelope.next_level()).collect()
    }

    #[test]
    fn test_timecents() {
        assert_eq!(timecents_to_seconds(0.0), 1.0);
        assert_eq!(timecents_to_seconds(1200.0), 2.0);
        assert_eq!(timecents_to_seconds(-12000.0), 0.0);
        assert!((timecents_to_seconds(-1200.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_instant_envelope_holds_full_level() {
        let mut envelope = Envelope::new(EnvelopeParams::default(), RATE);
        assert!(run(&mut envelope, 100).iter().all(|l| *l == 1.0));
        assert_eq!(envelope.stage(), Stage::Sustain);
    }

    #[test]
    fn test_delay_and_linear_attack() {
        let params = EnvelopeParams {
            delay: 0.01,
            attack: 0.01,
            ..Default::default()
        };
        let mut envelope = Envelope::new(params, RATE);
        let levels = run(&mut envelope, 30);
        assert!(levels[..10].iter().all(|l| *l == 0.0));
        assert_eq!(levels[10], 0.0);
        assert!((levels[15] - 0.5).abs() < 1e-6);
        assert_eq!(levels[20], 1.0);
    }

    #[test]
    fn test_decay_to_sustain() {
        let params = EnvelopeParams {
            decay: 1.0,
            sustain: 0.5,
            ..Default::default()
        };
        let mut envelope = Envelope::new(params, RATE);
        let levels = run(&mut envelope, 1000);
        // Exponential: strictly falling until sustain is reached.
        assert!(levels[1] < levels[0]);
        assert!(levels[50] > 0.5);
        assert_eq!(*levels.last().unwrap(), 0.5);
        assert_eq!(envelope.stage(), Stage::Sustain);
    }

    #[test]
    fn test_release_finishes_below_threshold() {
        let params = EnvelopeParams {
            release: 0.1,
            ..Default::default()
        };
        let mut envelope = Envelope::new(params, RATE);
        run(&mut envelope, 10);
        envelope.release();
        let levels = run(&mut envelope, 200);
        assert!(levels[0] < 1.0);
        assert!(envelope.is_finished());
        // 100 dB over 0.1s means done after about 100 samples.
        let done = levels.iter().position(|l| *l == 0.0).unwrap();
        assert!((95..=105).contains(&done), "finished after {}", done);
    }

    #[test]
    fn test_silent_sustain_finishes() {
        let params = EnvelopeParams {
            decay: 0.05,
            sustain: 0.0,
            ..Default::default()
        };
        let mut envelope = Envelope::new(params, RATE);
        run(&mut envelope, 100);
        assert!(envelope.is_finished());
    }

    #[test]
    fn test_choke_is_fast() {
        let params = EnvelopeParams {
            release: 5.0,
            ..Default::default()
        };
        let mut envelope = Envelope::new(params, 44100);
        envelope.next_level();
        envelope.choke();
        run(&mut envelope, 100);
        assert!(envelope.is_finished());
    }
}

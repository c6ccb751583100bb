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
use std::{ops::RangeInclusive, sync::Arc};

use super::{
    connection::ConnectionBlock,
    error::SoundbankError,
    sample::{LoopMode, Sample, SampleLoop},
};

/// A sample oscillator: a shared sample plus per-use overrides.
#[derive(Debug, Clone)]
pub struct Wavetable {
    sample: Arc<Sample>,
    unity_note: Option<u8>,
    fine_tune: Option<i16>,
    attenuation: Option<i16>,
    sample_loop: Option<SampleLoop>,
    loop_mode: Option<LoopMode>,
}

impl Wavetable {
    pub fn new(sample: Arc<Sample>) -> Self {
        Wavetable {
            sample,
            unity_note: None,
            fine_tune: None,
            attenuation: None,
            sample_loop: None,
            loop_mode: None,
        }
    }

    pub fn sample(&self) -> &Arc<Sample> {
        &self.sample
    }

    pub fn set_unity_note(&mut self, note: u8) {
        self.unity_note = Some(note.min(127));
    }

    pub fn set_fine_tune(&mut self, cents: i16) {
        self.fine_tune = Some(cents);
    }

    pub fn set_attenuation(&mut self, centibels: i16) {
        self.attenuation = Some(centibels);
    }

    /// Replaces the sample's loop points.
    pub fn set_loop(&mut self, sample_loop: SampleLoop) -> Result<(), SoundbankError> {
        sample_loop.validate(self.sample.len())?;
        self.sample_loop = Some(sample_loop);
        Ok(())
    }

    /// Keeps the loop points but changes how they are used.
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = Some(mode);
    }

    pub fn unity_note(&self) -> u8 {
        self.unity_note.unwrap_or(self.sample.unity_note())
    }

    pub fn fine_tune(&self) -> i16 {
        self.fine_tune.unwrap_or(self.sample.fine_tune())
    }

    pub fn attenuation(&self) -> i16 {
        self.attenuation.unwrap_or(self.sample.attenuation())
    }

    /// The loop this oscillator plays, if any. A mode override without loop points
    /// to apply it to means no loop.
    pub fn sample_loop(&self) -> Option<SampleLoop> {
        let mut sample_loop = self.sample_loop.or(self.sample.sample_loop())?;
        if let Some(mode) = self.loop_mode {
            sample_loop.mode = mode;
        }
        (sample_loop.mode != LoopMode::NoLoop && sample_loop.length > 0).then_some(sample_loop)
    }
}

/// A synthesis recipe: oscillators, modulation routings, and when to play them.
///
/// Built through setters, then shared read-only behind an `Arc` by every voice that plays it.
#[derive(Debug, Clone)]
pub struct Performer {
    name: String,
    oscillators: Vec<Wavetable>,
    connections: Vec<ConnectionBlock>,
    key_range: RangeInclusive<u8>,
    velocity_range: RangeInclusive<u8>,
    exclusive_class: u32,
    release_triggered: bool,
    self_non_exclusive: bool,
    default_connections: bool,
}

impl Performer {
    pub fn new(name: &str) -> Self {
        Performer {
            name: name.to_string(),
            oscillators: Vec::new(),
            connections: Vec::new(),
            key_range: 0..=127,
            velocity_range: 0..=127,
            exclusive_class: 0,
            release_triggered: false,
            self_non_exclusive: false,
            default_connections: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_oscillator(&mut self, wavetable: Wavetable) {
        self.oscillators.push(wavetable);
    }

    pub fn add_connection(&mut self, block: ConnectionBlock) {
        self.connections.push(block);
    }

    pub fn set_key_range(&mut self, lo: u8, hi: u8) -> Result<(), SoundbankError> {
        self.key_range = checked_range("key", lo, hi)?;
        Ok(())
    }

    pub fn set_velocity_range(&mut self, lo: u8, hi: u8) -> Result<(), SoundbankError> {
        self.velocity_range = checked_range("velocity", lo, hi)?;
        Ok(())
    }

    pub fn set_exclusive_class(&mut self, class: u32) {
        self.exclusive_class = class;
    }

    pub fn set_release_triggered(&mut self, value: bool) {
        self.release_triggered = value;
    }

    pub fn set_self_non_exclusive(&mut self, value: bool) {
        self.self_non_exclusive = value;
    }

    pub fn set_default_connections(&mut self, value: bool) {
        self.default_connections = value;
    }

    pub fn oscillators(&self) -> &[Wavetable] {
        &self.oscillators
    }

    pub fn connections(&self) -> &[ConnectionBlock] {
        &self.connections
    }

    pub fn key_range(&self) -> &RangeInclusive<u8> {
        &self.key_range
    }

    pub fn velocity_range(&self) -> &RangeInclusive<u8> {
        &self.velocity_range
    }

    /// Choke group. 0 means none.
    pub fn exclusive_class(&self) -> u32 {
        self.exclusive_class
    }

    pub fn is_release_triggered(&self) -> bool {
        self.release_triggered
    }

    pub fn is_self_non_exclusive(&self) -> bool {
        self.self_non_exclusive
    }

    pub fn uses_default_connections(&self) -> bool {
        self.default_connections
    }

    /// Returns true if this performer responds to `key` at `velocity`.
    pub fn matches(&self, key: u8, velocity: u8) -> bool {
        self.key_range.contains(&key) && self.velocity_range.contains(&velocity)
    }
}

fn checked_range(what: &'static str, lo: u8, hi: u8) -> Result<RangeInclusive<u8>, SoundbankError> {
    if lo > hi || hi > 127 {
        return Err(SoundbankError::InvalidRange { what, lo, hi });
    }
    Ok(lo..=hi)
}

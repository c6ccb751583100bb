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
use std::path::Path;

use config::{Config, File};
use serde::Deserialize;
use tracing::info;

mod audio;
mod error;
mod midi;
mod synth;

pub use audio::Audio;
pub use error::ConfigError;
pub use midi::Midi;
pub use synth::Synth;

/// The top level YAML configuration. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Softsynth {
    audio: Option<Audio>,
    synth: Option<Synth>,
    midi: Option<Midi>,
}

impl Softsynth {
    pub fn new(audio: Audio, synth: Synth, midi: Option<Midi>) -> Softsynth {
        Softsynth {
            audio: Some(audio),
            synth: Some(synth),
            midi,
        }
    }

    /// Returns the audio section, or the defaults.
    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    /// Returns the synth section, or the defaults.
    pub fn synth(&self) -> Synth {
        self.synth.clone().unwrap_or_default()
    }

    /// Returns the MIDI input section, if any.
    pub fn midi(&self) -> Option<&Midi> {
        self.midi.as_ref()
    }
}

/// Loads the configuration from a YAML file.
pub fn load(path: &Path) -> Result<Softsynth, ConfigError> {
    info!(path = %path.display(), "Loading configuration");
    Ok(Config::builder()
        .add_source(File::from(path))
        .build()?
        .try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            r#"
audio:
  device: mock-line
  sample_rate: 22050
synth:
  interpolation: linear_fixed
midi:
  device: Launchkey
"#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.audio().device(), "mock-line");
        assert_eq!(config.audio().sample_rate(), 22050);
        assert_eq!(
            config.synth().interpolation().unwrap(),
            crate::audio::resampler::Interpolation::LinearFixed
        );
        assert_eq!(config.midi().map(|m| m.device()), Some("Launchkey"));
    }

    #[test]
    fn test_empty_sections_default() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(file, "synth:\n  polyphony: 4\n").unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.audio().device(), "default");
        assert_eq!(config.synth().polyphony(), 4);
        assert!(config.midi().is_none());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(&dir.path().join("nope.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}

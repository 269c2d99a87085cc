//! TOML configuration for the sampler and the CLI.
//!
//! ```toml
//! preload = 2
//! volume = 0.8
//!
//! [output]
//! lead_blocks = 4
//! device = "pulse"
//!
//! [[sounds]]
//! title = "Kick"
//! url = "https://example.com/kick.wav"
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::context::DEFAULT_LEAD_BLOCKS;
use crate::error::{Error, Result};

/// One entry of the sound bank.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Sound {
    pub title: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Blocks rendered ahead of the wall clock.
    pub lead_blocks: u64,
    /// Output device name; the system default when unset.
    pub device: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            lead_blocks: DEFAULT_LEAD_BLOCKS,
            device: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sounds: Vec<Sound>,
    /// How many sounds from the top of the bank to load at startup. All of
    /// them when unset.
    pub preload: Option<usize>,
    /// Initial shared gain.
    pub volume: Option<f32>,
    pub output: OutputConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("could not read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(volume) = self.volume {
            if !(0.0..=1.0).contains(&volume) {
                return Err(Error::Config(format!("volume {volume} is outside 0..=1")));
            }
        }
        if let Some(sound) = self.sounds.iter().find(|s| s.url.trim().is_empty()) {
            return Err(Error::Config(format!("sound {:?} has an empty url", sound.title)));
        }
        Ok(())
    }

    /// The sounds to load at startup.
    pub fn preloaded(&self) -> &[Sound] {
        let n = self.preload.unwrap_or(self.sounds.len()).min(self.sounds.len());
        &self.sounds[..n]
    }

    /// Find a sound by title (case-insensitive) or by url.
    pub fn find(&self, key: &str) -> Option<&Sound> {
        self.sounds
            .iter()
            .find(|s| s.url == key || s.title.eq_ignore_ascii_case(key))
    }
}

// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::sampler::sound::{DEFAULT_MAX_SAMPLE_LENGTH_SECS, MAX_CHANNELS};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_VOICES: usize = 16;
const DEFAULT_BLOCK_SIZE: usize = 512;
const DEFAULT_OUTPUT_CHANNELS: u16 = 2;

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Engine {
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,

    /// Size of the voice pool.
    #[serde(default = "default_voices")]
    voices: usize,

    /// Frames rendered per block when rendering offline.
    #[serde(default = "default_block_size")]
    block_size: usize,

    #[serde(default = "default_output_channels")]
    output_channels: u16,

    /// How much of each sample file is loaded.
    #[serde(default = "default_max_sample_length_secs")]
    max_sample_length_secs: f64,
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_voices() -> usize {
    DEFAULT_VOICES
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_output_channels() -> u16 {
    DEFAULT_OUTPUT_CHANNELS
}

fn default_max_sample_length_secs() -> f64 {
    DEFAULT_MAX_SAMPLE_LENGTH_SECS
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            voices: DEFAULT_VOICES,
            block_size: DEFAULT_BLOCK_SIZE,
            output_channels: DEFAULT_OUTPUT_CHANNELS,
            max_sample_length_secs: DEFAULT_MAX_SAMPLE_LENGTH_SECS,
        }
    }
}

impl Engine {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn voices(&self) -> usize {
        self.voices
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    pub fn max_sample_length_secs(&self) -> f64 {
        self.max_sample_length_secs
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample_rate must be positive".into()));
        }
        if self.voices == 0 {
            return Err(ConfigError::Invalid("voices must be at least 1".into()));
        }
        if self.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be at least 1".into()));
        }
        if self.output_channels == 0 || self.output_channels as usize > MAX_CHANNELS {
            return Err(ConfigError::Invalid(format!(
                "output_channels must be between 1 and {}, got {}",
                MAX_CHANNELS, self.output_channels
            )));
        }
        if !(self.max_sample_length_secs.is_finite() && self.max_sample_length_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "max_sample_length_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

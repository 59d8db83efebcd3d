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
use std::path::PathBuf;

use crate::sampler::{InvalidAudioError, LoadError, SoundId};

/// Typed error for config load/parse failures so callers can tell a missing
/// file from a bad value without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Unable to load pad {id} from {}: {source}", .path.display())]
    Pad {
        id: SoundId,
        path: PathBuf,
        #[source]
        source: InvalidAudioError,
    },

    #[error("Unable to install pad: {0}")]
    Install(#[from] LoadError),

    #[error("Unable to serialize config: {0}")]
    Serialize(#[from] serde_yml::Error),
}

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
use crate::audio::DecodeError;

use super::SoundId;

/// Raised when audio cannot be turned into a playable sound. A sound that
/// fails with this error is never installed.
#[derive(Debug, thiserror::Error)]
pub enum InvalidAudioError {
    #[error("Audio contains no frames")]
    Empty,

    #[error("Invalid sample rate: {0}Hz")]
    SampleRate(u32),

    #[error("Audio has no channels")]
    NoChannels,

    #[error("Unable to decode audio: {0}")]
    Decode(#[from] DecodeError),
}

/// Raised when a sound cannot be queued for installation.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    InvalidAudio(#[from] InvalidAudioError),

    #[error("Sound {id} not loaded, the sampler already holds {limit} sounds")]
    SoundLimit { id: SoundId, limit: usize },
}

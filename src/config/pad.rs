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
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use crate::audio::SymphoniaReader;
use crate::sampler::{AdsrParameters, InvalidAudioError, NoteRange, SampleBuffer, Sound, SoundId};

const DEFAULT_ROOT_NOTE: u8 = 60;

/// One pad: a sample file and how it is played.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Pad {
    id: SoundId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,

    /// Resolved against the config file's directory when relative.
    file: PathBuf,

    #[serde(default = "default_root_note")]
    root_note: u8,

    /// Notes the pad responds to. Defaults to the root note alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<Vec<u8>>,

    #[serde(default)]
    envelope: AdsrParameters,

    #[serde(default)]
    pitch_shift: i32,
}

fn default_root_note() -> u8 {
    DEFAULT_ROOT_NOTE
}

impl Pad {
    pub fn new(id: SoundId, file: &Path, root_note: u8) -> Self {
        Self {
            id,
            name: None,
            file: file.to_path_buf(),
            root_note,
            notes: None,
            envelope: AdsrParameters::default(),
            pitch_shift: 0,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_notes(mut self, notes: &[u8]) -> Self {
        self.notes = Some(notes.to_vec());
        self
    }

    pub fn with_envelope(mut self, envelope: AdsrParameters) -> Self {
        self.envelope = envelope;
        self
    }

    pub fn with_pitch_shift(mut self, semitones: i32) -> Self {
        self.pitch_shift = semitones;
        self
    }

    pub fn id(&self) -> SoundId {
        self.id
    }

    /// The configured name, or `Sample<n>` numbered from 1.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("Sample{}", u64::from(self.id) + 1),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn root_note(&self) -> u8 {
        self.root_note
    }

    pub fn note_range(&self) -> NoteRange {
        match &self.notes {
            Some(notes) => notes.iter().copied().collect(),
            None => NoteRange::single(self.root_note),
        }
    }

    pub fn envelope(&self) -> AdsrParameters {
        self.envelope
    }

    pub fn pitch_shift(&self) -> i32 {
        self.pitch_shift
    }

    /// Decodes the pad's file and builds its sound with the configured
    /// envelope and pitch shift.
    pub fn build_sound(
        &self,
        base_dir: &Path,
        max_length_secs: f64,
    ) -> Result<Sound, ConfigError> {
        let path = base_dir.join(&self.file);
        let load = || -> Result<Sound, InvalidAudioError> {
            let mut reader = SymphoniaReader::from_file(&path)?;
            let data = SampleBuffer::from_reader(&mut reader, max_length_secs)?;
            let mut sound = Sound::from_buffer(
                self.id,
                &self.name(),
                data,
                self.note_range(),
                self.root_note,
            );
            sound.set_envelope_parameters(self.envelope);
            sound.set_pitch_shift(self.pitch_shift);
            Ok(sound)
        };

        load().map_err(|source| ConfigError::Pad {
            id: self.id,
            path: path.clone(),
            source,
        })
    }

    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |message: String| ConfigError::Invalid(format!("pad {}: {}", self.id, message));

        if self.root_note > 127 {
            return Err(invalid(format!("root note {} is out of range", self.root_note)));
        }
        if let Some(note) = self.notes.iter().flatten().find(|note| **note > 127) {
            return Err(invalid(format!("note {} is out of range", note)));
        }

        let AdsrParameters {
            attack,
            decay,
            sustain,
            release,
        } = self.envelope;
        for (name, seconds) in [("attack", attack), ("decay", decay), ("release", release)] {
            if !(seconds.is_finite() && seconds >= 0.0) {
                return Err(invalid(format!("{} must be a non-negative time", name)));
            }
        }
        if !(0.0..=1.0).contains(&sustain) {
            return Err(invalid(format!("sustain {} is not between 0 and 1", sustain)));
        }

        Ok(())
    }
}

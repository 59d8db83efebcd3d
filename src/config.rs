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
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::processor::SamplerHandle;
use crate::sampler::MAX_SOUNDS;

mod engine;
mod error;
mod pad;

pub use engine::Engine;
pub use error::ConfigError;
pub use pad::Pad;

/// The sampler configuration: engine settings and the pads to load.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sampler {
    #[serde(default)]
    engine: Engine,

    #[serde(default)]
    pads: Vec<Pad>,

    /// Directory relative pad files are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Sampler {
    pub fn new(engine: Engine, pads: Vec<Pad>, base_dir: &Path) -> Sampler {
        Sampler {
            engine,
            pads,
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Parses and validates a sampler config from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Sampler, ConfigError> {
        let mut sampler = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Sampler>()?;
        sampler.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        sampler.validate()?;
        Ok(sampler)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;

        if self.pads.len() > MAX_SOUNDS {
            return Err(ConfigError::Invalid(format!(
                "{} pads configured, at most {} are supported",
                self.pads.len(),
                MAX_SOUNDS
            )));
        }

        let mut ids = HashSet::new();
        for pad in self.pads.iter() {
            if !ids.insert(pad.id()) {
                return Err(ConfigError::Invalid(format!("duplicate pad id {}", pad.id())));
            }
            pad.validate()?;
        }
        Ok(())
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Decodes every pad and queues it on the handle.
    pub fn load_pads(&self, handle: &mut SamplerHandle) -> Result<(), ConfigError> {
        for pad in self.pads.iter() {
            let sound = pad.build_sound(&self.base_dir, self.engine.max_sample_length_secs())?;
            handle.install_sound(sound)?;
        }
        info!(pads = self.pads.len(), "Pads loaded.");
        Ok(())
    }

    /// The config as YAML, with defaults filled in.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }
}

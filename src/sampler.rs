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

//! The polyphonic sample playback engine.

pub mod command;
pub mod envelope;
pub mod error;
pub mod event;
pub mod sound;
pub mod synth;
pub mod voice;

pub use command::{Command, CommandQueue};
pub use envelope::{Adsr, AdsrParameters, EnvelopeStage};
pub use error::{InvalidAudioError, LoadError};
pub use event::{NoteEvent, NoteEventKind};
pub use sound::{NoteRange, SampleBuffer, Sound, SoundId};
pub use synth::{Synthesiser, MAX_SOUNDS};
pub use voice::Voice;

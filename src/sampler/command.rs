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

//! Deferred mutations of the synthesiser, applied from the render path.

use std::collections::VecDeque;
use std::fmt;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::envelope::AdsrParameters;
use super::sound::{Sound, SoundId};
use super::synth::Synthesiser;

/// A unit of work queued by the control path.
pub enum Command {
    /// Installs a sound, replacing any sound with the same id.
    LoadSound(Sound),
    RemoveSound(SoundId),
    SetEnvelope(SoundId, AdsrParameters),
    SetPitchShift(SoundId, i32),
    AllNotesOff { allow_tail_off: bool },
}

impl Command {
    /// Whether applying this command can hand a sound back for disposal.
    fn displaces_sound(&self) -> bool {
        matches!(self, Command::LoadSound(_) | Command::RemoveSound(_))
    }

    /// Applies the command. Displaced sounds go to `retired`.
    fn apply(self, synth: &mut Synthesiser, retired: &Sender<Sound>) {
        let displaced = match self {
            Command::LoadSound(sound) => synth.add_sound(sound),
            Command::RemoveSound(id) => synth.remove_sound(id),
            Command::SetEnvelope(id, parameters) => {
                if let Some(sound) = synth.sound_mut(id) {
                    sound.set_envelope_parameters(parameters);
                }
                None
            }
            Command::SetPitchShift(id, semitones) => {
                if let Some(sound) = synth.sound_mut(id) {
                    sound.set_pitch_shift(semitones);
                }
                None
            }
            Command::AllNotesOff { allow_tail_off } => {
                synth.all_notes_off(allow_tail_off);
                None
            }
        };

        if let Some(sound) = displaced {
            // Only reachable if the receiver is gone, in which case dropping
            // here is all that is left.
            let _ = retired.try_send(sound);
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::LoadSound(sound) => f
                .debug_tuple("LoadSound")
                .field(&sound.id())
                .field(&sound.name())
                .finish(),
            Command::RemoveSound(id) => f.debug_tuple("RemoveSound").field(id).finish(),
            Command::SetEnvelope(id, parameters) => f
                .debug_tuple("SetEnvelope")
                .field(id)
                .field(parameters)
                .finish(),
            Command::SetPitchShift(id, semitones) => f
                .debug_tuple("SetPitchShift")
                .field(id)
                .field(semitones)
                .finish(),
            Command::AllNotesOff { allow_tail_off } => f
                .debug_struct("AllNotesOff")
                .field("allow_tail_off", allow_tail_off)
                .finish(),
        }
    }
}

/// A FIFO of commands shared between the control path and the render path.
///
/// Producers lock and may block. The render path only ever tries the lock.
pub struct CommandQueue {
    commands: Mutex<VecDeque<Command>>,
}

impl CommandQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, command: Command) {
        self.commands.lock().push_back(command);
    }

    pub fn len(&self) -> usize {
        self.commands.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Holds the queue lock. While the guard lives the render path skips
    /// command processing.
    #[cfg(test)]
    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, VecDeque<Command>> {
        self.commands.lock()
    }

    /// Applies pending commands in order without blocking.
    ///
    /// Returns `None` if the lock was held elsewhere, otherwise the number of
    /// commands applied. Draining stops early, leaving the rest queued, when a
    /// command would displace a sound and `retired` has no room for it.
    pub fn drain_and_apply(
        &self,
        synth: &mut Synthesiser,
        retired: &Sender<Sound>,
    ) -> Option<usize> {
        let mut commands = self.commands.try_lock()?;

        let mut applied = 0;
        while let Some(command) = commands.front() {
            if command.displaces_sound() && retired.is_full() {
                break;
            }
            let Some(command) = commands.pop_front() else {
                break;
            };
            command.apply(synth, retired);
            applied += 1;
        }

        Some(applied)
    }
}

impl fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.commands.try_lock() {
            Some(commands) => f
                .debug_struct("CommandQueue")
                .field("pending", &commands.len())
                .finish(),
            None => f
                .debug_struct("CommandQueue")
                .field("pending", &"<locked>")
                .finish(),
        }
    }
}

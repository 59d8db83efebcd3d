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

/// A note event positioned within a render block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// Frame offset from the start of the rendered range.
    pub offset: usize,
    pub kind: NoteEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEventKind {
    /// Velocity is normalised to 0.0..=1.0.
    NoteOn { note: u8, velocity: f32 },
    NoteOff { note: u8, allow_tail_off: bool },
}

impl NoteEvent {
    pub fn note_on(offset: usize, note: u8, velocity: f32) -> Self {
        Self {
            offset,
            kind: NoteEventKind::NoteOn { note, velocity },
        }
    }

    /// A note off that lets the envelope release.
    pub fn note_off(offset: usize, note: u8) -> Self {
        Self {
            offset,
            kind: NoteEventKind::NoteOff {
                note,
                allow_tail_off: true,
            },
        }
    }

    pub fn note(&self) -> u8 {
        match self.kind {
            NoteEventKind::NoteOn { note, .. } | NoteEventKind::NoteOff { note, .. } => note,
        }
    }
}

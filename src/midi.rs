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

//! Conversion of MIDI input into sampler note events.

use std::{fs, path::Path};

use midly::{live::LiveEvent, Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use tracing::debug;

use crate::sampler::NoteEventKind;

pub mod midir;

/// Tempo assumed until a file sets one, in microseconds per quarter note.
const DEFAULT_TEMPO: u32 = 500_000;

#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("Unable to read MIDI file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("Invalid timing in MIDI file")]
    Timing,
}

/// Converts a note message into a note event kind. A note on with velocity
/// zero is a note off.
pub fn note_event_kind(message: &MidiMessage) -> Option<NoteEventKind> {
    match message {
        MidiMessage::NoteOn { key, vel } if u8::from(*vel) > 0 => Some(NoteEventKind::NoteOn {
            note: u8::from(*key),
            velocity: u8::from(*vel) as f32 / 127.0,
        }),
        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
            Some(NoteEventKind::NoteOff {
                note: u8::from(*key),
                allow_tail_off: true,
            })
        }
        _ => None,
    }
}

/// Parses raw bytes from a live MIDI input. Anything that isn't a note
/// message yields `None`.
pub fn parse_live_event(raw_event: &[u8]) -> Option<NoteEventKind> {
    match LiveEvent::parse(raw_event) {
        Ok(LiveEvent::Midi { message, .. }) => note_event_kind(&message),
        Ok(_) => None,
        Err(e) => {
            debug!(error = ?e, "Failed to parse MIDI event");
            None
        }
    }
}

/// A note event at an absolute frame position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedNoteEvent {
    pub frame: u64,
    pub kind: NoteEventKind,
}

/// Reads a standard MIDI file into note events timed at `sample_rate`.
pub fn read_file<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
) -> Result<Vec<TimedNoteEvent>, MidiError> {
    let buf = fs::read(path)?;
    parse_file(&buf, sample_rate)
}

/// Parses a standard MIDI file into note events sorted by frame.
pub fn parse_file(buf: &[u8], sample_rate: u32) -> Result<Vec<TimedNoteEvent>, MidiError> {
    let smf = Smf::parse(buf)?;

    enum Entry {
        Tempo(u32),
        Note(NoteEventKind),
    }

    // Sequential files play each track after the one before.
    let mut entries: Vec<(u64, Entry)> = Vec::new();
    let mut track_start = 0u64;
    for track in smf.tracks.iter() {
        let mut tick = match smf.header.format {
            Format::Sequential => track_start,
            Format::SingleTrack | Format::Parallel => 0,
        };
        for event in track.iter() {
            tick += u64::from(event.delta.as_int());
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                    entries.push((tick, Entry::Tempo(tempo.as_int())))
                }
                TrackEventKind::Midi { message, .. } => {
                    if let Some(kind) = note_event_kind(&message) {
                        entries.push((tick, Entry::Note(kind)));
                    }
                }
                _ => {}
            }
        }
        track_start = tick;
    }

    // Stable, so events on the same tick keep file order.
    entries.sort_by_key(|(tick, _)| *tick);

    let seconds_per_tick = |tempo: u32| -> Result<f64, MidiError> {
        match smf.header.timing {
            Timing::Metrical(ticks_per_beat) => {
                let ticks_per_beat = ticks_per_beat.as_int();
                if ticks_per_beat == 0 {
                    return Err(MidiError::Timing);
                }
                Ok(tempo as f64 / 1_000_000.0 / ticks_per_beat as f64)
            }
            Timing::Timecode(fps, subframes) => {
                let ticks_per_second = fps.as_f32() as f64 * subframes as f64;
                if ticks_per_second <= 0.0 {
                    return Err(MidiError::Timing);
                }
                Ok(1.0 / ticks_per_second)
            }
        }
    };

    let mut tick_length = seconds_per_tick(DEFAULT_TEMPO)?;
    let mut last_tick = 0u64;
    let mut seconds = 0.0f64;
    let mut events = Vec::new();
    for (tick, entry) in entries {
        seconds += (tick - last_tick) as f64 * tick_length;
        last_tick = tick;
        match entry {
            Entry::Tempo(tempo) => tick_length = seconds_per_tick(tempo)?,
            Entry::Note(kind) => events.push(TimedNoteEvent {
                frame: (seconds * sample_rate as f64).round() as u64,
                kind,
            }),
        }
    }

    Ok(events)
}

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

//! Sounds: decoded sample data plus the playback parameters of one pad.

use std::fmt;
use std::sync::Arc;

use super::envelope::{AdsrParameters, DEFAULT_DECAY_SECS, DEFAULT_SUSTAIN_LEVEL};
use super::error::InvalidAudioError;
use crate::audio::AudioReader;

/// Identifies a sound within the active sound set.
pub type SoundId = u32;

/// Extra frames stored past the playable length so interpolation can always
/// read `position + 1` without a bounds check.
pub const GUARD_FRAMES: usize = 4;

/// At most this many source channels are kept.
pub const MAX_CHANNELS: usize = 2;

/// Pitch shift limits in semitones.
pub const MIN_PITCH_SHIFT: i32 = -12;
pub const MAX_PITCH_SHIFT: i32 = 12;

/// Default cap on how much of a file is loaded.
pub const DEFAULT_MAX_SAMPLE_LENGTH_SECS: f64 = 10.0;

const READ_CHUNK_FRAMES: usize = 4096;

/// Immutable decoded audio. Channels are stored planar.
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    length: usize,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Reads up to `max_length_secs` of audio from the reader.
    ///
    /// Guard frames are taken from the source when it is longer than the
    /// clamped length and are zero otherwise.
    pub fn from_reader(
        reader: &mut dyn AudioReader,
        max_length_secs: f64,
    ) -> Result<Self, InvalidAudioError> {
        let sample_rate = reader.sample_rate();
        if sample_rate == 0 {
            return Err(InvalidAudioError::SampleRate(sample_rate));
        }

        let source_channels = reader.channel_count() as usize;
        if source_channels == 0 {
            return Err(InvalidAudioError::NoChannels);
        }

        // Infinity keeps everything, a negative or NaN cap keeps nothing.
        let max_frames = if max_length_secs.is_nan() || max_length_secs <= 0.0 {
            0
        } else if max_length_secs.is_finite() {
            (max_length_secs * sample_rate as f64) as usize
        } else {
            usize::MAX
        };
        let wanted = max_frames.saturating_add(GUARD_FRAMES);

        let reserve = reader
            .frame_count()
            .map(|frames| (frames as usize).min(wanted))
            .unwrap_or(0);
        let kept_channels = source_channels.min(MAX_CHANNELS);
        let mut channels = vec![Vec::with_capacity(reserve + GUARD_FRAMES); kept_channels];
        let mut scratch = vec![Vec::new(); source_channels];

        let mut total = 0;
        while total < wanted {
            let frames = reader.read_frames(&mut scratch, READ_CHUNK_FRAMES.min(wanted - total))?;
            if frames == 0 {
                break;
            }
            for (channel, chunk) in channels.iter_mut().zip(scratch.iter()) {
                channel.extend_from_slice(&chunk[..frames]);
            }
            total += frames;
        }

        let length = total.min(max_frames);
        if length == 0 {
            return Err(InvalidAudioError::Empty);
        }

        for channel in channels.iter_mut() {
            channel.resize(length + GUARD_FRAMES, 0.0);
        }

        Ok(Self {
            channels,
            length,
            sample_rate,
        })
    }

    /// Builds a buffer from one Vec per channel.
    pub fn from_planes(planes: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, InvalidAudioError> {
        let mut reader = crate::audio::MemoryReader::from_planes(planes, sample_rate);
        Self::from_reader(&mut reader, f64::INFINITY)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Playable frames, excluding guard frames.
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel data including guard frames.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    pub fn duration_secs(&self) -> f64 {
        self.length as f64 / self.sample_rate as f64
    }

    pub fn memory_size(&self) -> usize {
        self.channels.iter().map(|c| c.len()).sum::<usize>() * std::mem::size_of::<f32>()
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.channels.len())
            .field("length", &self.length)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// The set of MIDI notes a sound responds to.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NoteRange(u128);

impl NoteRange {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn single(note: u8) -> Self {
        let mut range = Self::empty();
        range.insert(note);
        range
    }

    /// All notes from `low` to `high`, inclusive.
    pub fn span(low: u8, high: u8) -> Self {
        (low..=high).collect()
    }

    /// Notes above 127 are ignored.
    pub fn insert(&mut self, note: u8) {
        if note < 128 {
            self.0 |= 1u128 << note;
        }
    }

    pub fn contains(&self, note: u8) -> bool {
        note < 128 && self.0 & (1u128 << note) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..128u8).filter(|note| self.contains(*note))
    }
}

impl FromIterator<u8> for NoteRange {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut range = Self::empty();
        for note in iter {
            range.insert(note);
        }
        range
    }
}

impl fmt::Debug for NoteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// One playable sound: sample data, key mapping and playback parameters.
///
/// The sample data is shared with any voice currently playing it, so a sound
/// can be replaced while its last note is still ringing out.
pub struct Sound {
    id: SoundId,
    name: String,
    notes: NoteRange,
    root_note: u8,
    envelope: AdsrParameters,
    pitch_shift: i32,
    data: Arc<SampleBuffer>,
}

impl Sound {
    /// Decodes a sound from a reader.
    ///
    /// The envelope starts with the given attack and release, the default
    /// decay and full sustain.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SoundId,
        name: &str,
        reader: &mut dyn AudioReader,
        notes: NoteRange,
        root_note: u8,
        attack: f32,
        release: f32,
        max_length_secs: f64,
    ) -> Result<Self, InvalidAudioError> {
        let data = SampleBuffer::from_reader(reader, max_length_secs)?;
        let mut sound = Self::from_buffer(id, name, data, notes, root_note);
        sound.envelope = AdsrParameters::new(
            attack,
            DEFAULT_DECAY_SECS,
            DEFAULT_SUSTAIN_LEVEL,
            release,
        );
        Ok(sound)
    }

    /// Wraps an already decoded buffer with the default envelope.
    pub fn from_buffer(
        id: SoundId,
        name: &str,
        data: SampleBuffer,
        notes: NoteRange,
        root_note: u8,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            notes,
            root_note: root_note.min(127),
            envelope: AdsrParameters::default(),
            pitch_shift: 0,
            data: Arc::new(data),
        }
    }

    pub fn id(&self) -> SoundId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notes(&self) -> NoteRange {
        self.notes
    }

    pub fn root_note(&self) -> u8 {
        self.root_note
    }

    pub fn applies_to_note(&self, note: u8) -> bool {
        self.notes.contains(note)
    }

    pub fn envelope_parameters(&self) -> AdsrParameters {
        self.envelope
    }

    /// Only notes triggered after this call pick up the new shape.
    pub fn set_envelope_parameters(&mut self, parameters: AdsrParameters) {
        self.envelope = parameters;
    }

    pub fn pitch_shift(&self) -> i32 {
        self.pitch_shift
    }

    /// Clamped to [`MIN_PITCH_SHIFT`, `MAX_PITCH_SHIFT`].
    pub fn set_pitch_shift(&mut self, semitones: i32) {
        self.pitch_shift = semitones.clamp(MIN_PITCH_SHIFT, MAX_PITCH_SHIFT);
    }

    pub fn data(&self) -> &Arc<SampleBuffer> {
        &self.data
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.data.sample_rate()
    }

    pub fn length(&self) -> usize {
        self.data.length()
    }
}

impl fmt::Debug for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sound")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("notes", &self.notes)
            .field("root_note", &self.root_note)
            .field("envelope", &self.envelope)
            .field("pitch_shift", &self.pitch_shift)
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MemoryReader;

    fn ramp(frames: usize) -> Vec<f32> {
        (0..frames).map(|i| i as f32).collect()
    }

    #[test]
    fn test_buffer_clamps_length_and_reads_guard_frames() {
        // 100 frames at 10Hz, clamp to 5 seconds = 50 frames.
        let mut reader = MemoryReader::from_planes(vec![ramp(100)], 10);
        let buffer = SampleBuffer::from_reader(&mut reader, 5.0).unwrap();

        assert_eq!(buffer.length(), 50);
        assert_eq!(buffer.channel(0).len(), 50 + GUARD_FRAMES);
        // Guard frames come from the source past the clamp.
        assert_eq!(buffer.channel(0)[50], 50.0);
        assert_eq!(buffer.channel(0)[53], 53.0);
    }

    #[test]
    fn test_buffer_zero_pads_short_sources() {
        let buffer = SampleBuffer::from_planes(vec![ramp(3)], 44100).unwrap();
        assert_eq!(buffer.length(), 3);
        assert_eq!(&buffer.channel(0)[..], &[0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_buffer_keeps_two_channels() {
        let planes = vec![vec![1.0; 8], vec![2.0; 8], vec![3.0; 8]];
        let buffer = SampleBuffer::from_planes(planes, 48000).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.channel(1)[0], 2.0);
    }

    #[test]
    fn test_invalid_audio() {
        let empty = SampleBuffer::from_planes(vec![Vec::new()], 44100);
        assert!(matches!(empty, Err(InvalidAudioError::Empty)));

        let no_rate = SampleBuffer::from_planes(vec![vec![0.0; 4]], 0);
        assert!(matches!(no_rate, Err(InvalidAudioError::SampleRate(0))));

        let no_channels = SampleBuffer::from_planes(Vec::new(), 44100);
        assert!(matches!(no_channels, Err(InvalidAudioError::NoChannels)));

        // A zero-second cap leaves nothing to play.
        let mut reader = MemoryReader::from_planes(vec![ramp(10)], 44100);
        let zero = SampleBuffer::from_reader(&mut reader, 0.0);
        assert!(matches!(zero, Err(InvalidAudioError::Empty)));

        // So does a negative or NaN cap.
        for cap in [-1.0, f64::NAN, f64::NEG_INFINITY] {
            let mut reader = MemoryReader::from_planes(vec![ramp(10)], 44100);
            let capped = SampleBuffer::from_reader(&mut reader, cap);
            assert!(
                matches!(capped, Err(InvalidAudioError::Empty)),
                "cap {}",
                cap
            );
        }

        let mut reader = MemoryReader::from_planes(vec![ramp(10)], 44100);
        let unlimited = SampleBuffer::from_reader(&mut reader, f64::INFINITY).unwrap();
        assert_eq!(unlimited.length(), 10);
    }

    #[test]
    fn test_note_range() {
        let single = NoteRange::single(60);
        assert!(single.contains(60));
        assert!(!single.contains(61));

        let span = NoteRange::span(36, 39);
        assert_eq!(span.iter().collect::<Vec<u8>>(), vec![36, 37, 38, 39]);

        let mut range = NoteRange::empty();
        assert!(range.is_empty());
        range.insert(200);
        assert!(range.is_empty());
        range.insert(127);
        assert!(range.contains(127));
        assert!(!range.contains(255));
    }

    #[test]
    fn test_sound_parameters() {
        let mut reader = MemoryReader::from_planes(vec![ramp(441)], 44100);
        let mut sound = Sound::new(
            3,
            "Snare",
            &mut reader,
            NoteRange::single(38),
            38,
            0.2,
            0.3,
            10.0,
        )
        .unwrap();

        assert_eq!(sound.id(), 3);
        assert_eq!(sound.name(), "Snare");
        assert!(sound.applies_to_note(38));
        assert!(!sound.applies_to_note(60));
        assert_eq!(
            sound.envelope_parameters(),
            AdsrParameters::new(0.2, 0.1, 1.0, 0.3)
        );

        sound.set_pitch_shift(7);
        assert_eq!(sound.pitch_shift(), 7);
        sound.set_pitch_shift(30);
        assert_eq!(sound.pitch_shift(), MAX_PITCH_SHIFT);
        sound.set_pitch_shift(-30);
        assert_eq!(sound.pitch_shift(), MIN_PITCH_SHIFT);

        let flat = AdsrParameters::flat();
        sound.set_envelope_parameters(flat);
        assert_eq!(sound.envelope_parameters(), flat);
    }
}

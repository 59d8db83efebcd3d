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

//! Glue between the control path and the render path.
//!
//! [`SamplerProcessor`] lives on the audio thread. It owns the synthesiser,
//! applies queued commands at the top of each block and publishes telemetry.
//! [`SamplerHandle`] lives anywhere else. It builds sounds, queues commands and
//! disposes of sounds the processor no longer needs.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{
    atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::audio::{AudioBuffer, AudioReader, SymphoniaReader};
use crate::sampler::envelope::{DEFAULT_ATTACK_SECS, DEFAULT_RELEASE_SECS};
use crate::sampler::sound::DEFAULT_MAX_SAMPLE_LENGTH_SECS;
use crate::sampler::{
    AdsrParameters, Command, CommandQueue, InvalidAudioError, LoadError, NoteEvent, NoteRange,
    Sound, SoundId, Synthesiser, MAX_SOUNDS,
};

/// Commands the queue holds before it has to grow.
const QUEUE_CAPACITY: usize = 256;

/// Displaced sounds that can wait for disposal at once.
const RETIRED_CAPACITY: usize = 64;

/// Values the render path publishes for the control path.
#[derive(Debug)]
struct Telemetry {
    /// f32 bits of the playback position in seconds. NaN when idle.
    position: AtomicU32,
    active_voices: AtomicUsize,
    blocks: AtomicU64,
    contended_blocks: AtomicU64,
}

impl Telemetry {
    fn new() -> Self {
        Self {
            position: AtomicU32::new(f32::NAN.to_bits()),
            active_voices: AtomicUsize::new(0),
            blocks: AtomicU64::new(0),
            contended_blocks: AtomicU64::new(0),
        }
    }

    fn publish(&self, synth: &Synthesiser, contended: bool) {
        let position = synth
            .most_recent_voice()
            .and_then(|voice| voice.position_seconds())
            .map(|seconds| seconds as f32)
            .unwrap_or(f32::NAN);
        self.position.store(position.to_bits(), Ordering::Relaxed);
        self.active_voices
            .store(synth.active_voice_count(), Ordering::Relaxed);
        self.blocks.fetch_add(1, Ordering::Relaxed);
        if contended {
            self.contended_blocks.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The render-path half of the sampler.
#[derive(Debug)]
pub struct SamplerProcessor {
    synth: Synthesiser,
    queue: Arc<CommandQueue>,
    retired: Sender<Sound>,
    telemetry: Arc<Telemetry>,
}

impl SamplerProcessor {
    /// Creates a processor with `voices` voices and its control handle.
    pub fn new(voices: usize, sample_rate: f64) -> (SamplerProcessor, SamplerHandle) {
        let queue = Arc::new(CommandQueue::with_capacity(QUEUE_CAPACITY));
        let telemetry = Arc::new(Telemetry::new());
        let (retired_tx, retired_rx) = crossbeam_channel::bounded(RETIRED_CAPACITY);

        let processor = SamplerProcessor {
            synth: Synthesiser::new(voices, sample_rate),
            queue: Arc::clone(&queue),
            retired: retired_tx,
            telemetry: Arc::clone(&telemetry),
        };
        let handle = SamplerHandle {
            queue,
            retired: retired_rx,
            pending: Vec::new(),
            installed: HashSet::with_capacity(MAX_SOUNDS),
            telemetry,
            max_sample_length_secs: DEFAULT_MAX_SAMPLE_LENGTH_SECS,
        };
        (processor, handle)
    }

    /// Must be called from the render path before the first block at a new
    /// sample rate.
    pub fn prepare(&mut self, sample_rate: f64) {
        self.synth.set_sample_rate(sample_rate);
    }

    pub fn sample_rate(&self) -> f64 {
        self.synth.sample_rate()
    }

    /// Renders one block, adding into `output`.
    ///
    /// Queued commands are applied first if the queue lock is free. Events are
    /// applied at their offsets into the block.
    pub fn process(&mut self, output: &mut AudioBuffer, events: &[NoteEvent]) {
        let contended = self
            .queue
            .drain_and_apply(&mut self.synth, &self.retired)
            .is_none();
        let frames = output.frames();
        self.synth.render_block(output, events, 0, frames);
        self.telemetry.publish(&self.synth, contended);
    }

    pub fn synth(&self) -> &Synthesiser {
        &self.synth
    }
}

/// The control-path half of the sampler.
#[derive(Debug)]
pub struct SamplerHandle {
    queue: Arc<CommandQueue>,
    retired: Receiver<Sound>,
    // Retired sounds whose sample data a voice may still be reading.
    pending: Vec<Sound>,
    // Ids queued for installation and not removed since.
    installed: HashSet<SoundId>,
    telemetry: Arc<Telemetry>,
    max_sample_length_secs: f64,
}

impl SamplerHandle {
    /// Caps how much of each loaded file is kept. A negative or NaN cap
    /// keeps nothing, so every later load fails as empty.
    pub fn set_max_sample_length(&mut self, seconds: f64) {
        self.max_sample_length_secs = if seconds.is_nan() {
            0.0
        } else {
            seconds.max(0.0)
        };
    }

    pub fn max_sample_length(&self) -> f64 {
        self.max_sample_length_secs
    }

    /// Decodes a sound from `reader` and queues it for installation. The
    /// sound gets the default envelope and no pitch shift.
    pub fn load_sound(
        &mut self,
        id: SoundId,
        name: &str,
        reader: &mut dyn AudioReader,
        notes: NoteRange,
        root_note: u8,
    ) -> Result<(), LoadError> {
        let sound = Sound::new(
            id,
            name,
            reader,
            notes,
            root_note,
            DEFAULT_ATTACK_SECS,
            DEFAULT_RELEASE_SECS,
            self.max_sample_length_secs,
        )?;
        self.install_sound(sound)
    }

    /// Decodes an audio file and queues it. The sound is named after the
    /// file.
    pub fn load_sound_from_file<P: AsRef<Path>>(
        &mut self,
        id: SoundId,
        path: P,
        notes: NoteRange,
        root_note: u8,
    ) -> Result<(), LoadError> {
        let path = path.as_ref();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("Sample{}", u64::from(id) + 1));
        let mut reader = SymphoniaReader::from_file(path).map_err(InvalidAudioError::from)?;
        self.load_sound(id, &name, &mut reader, notes, root_note)
    }

    /// Decodes in-memory audio (e.g. a dropped file) and queues it.
    pub fn load_sound_from_bytes(
        &mut self,
        id: SoundId,
        name: &str,
        bytes: Vec<u8>,
        extension: Option<&str>,
        notes: NoteRange,
        root_note: u8,
    ) -> Result<(), LoadError> {
        let mut reader =
            SymphoniaReader::from_bytes(bytes, extension).map_err(InvalidAudioError::from)?;
        self.load_sound(id, name, &mut reader, notes, root_note)
    }

    /// Queues an already built sound, replacing any sound with its id.
    ///
    /// A new id is refused once `MAX_SOUNDS` sounds are installed.
    pub fn install_sound(&mut self, sound: Sound) -> Result<(), LoadError> {
        self.collect_garbage();
        if !self.installed.contains(&sound.id()) && self.installed.len() >= MAX_SOUNDS {
            warn!(
                pad = sound.id(),
                name = sound.name(),
                limit = MAX_SOUNDS,
                "Sound limit reached, not loading sound."
            );
            return Err(LoadError::SoundLimit {
                id: sound.id(),
                limit: MAX_SOUNDS,
            });
        }
        self.installed.insert(sound.id());
        info!(
            pad = sound.id(),
            name = sound.name(),
            frames = sound.length(),
            sample_rate = sound.source_sample_rate(),
            "Sound loaded."
        );
        self.queue.push(Command::LoadSound(sound));
        Ok(())
    }

    pub fn remove_sound(&mut self, id: SoundId) {
        self.collect_garbage();
        debug!(pad = id, "Removing sound.");
        self.installed.remove(&id);
        self.queue.push(Command::RemoveSound(id));
    }

    pub fn set_envelope(&self, id: SoundId, parameters: AdsrParameters) {
        debug!(pad = id, envelope = ?parameters, "Setting envelope.");
        self.queue.push(Command::SetEnvelope(id, parameters));
    }

    pub fn set_pitch_shift(&self, id: SoundId, semitones: i32) {
        debug!(pad = id, semitones, "Setting pitch shift.");
        self.queue.push(Command::SetPitchShift(id, semitones));
    }

    pub fn all_notes_off(&self, allow_tail_off: bool) {
        self.queue.push(Command::AllNotesOff { allow_tail_off });
    }

    /// Commands not yet picked up by the render path.
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// The playback position of the most recently started voice, in seconds
    /// of source audio.
    pub fn playback_position(&self) -> Option<f32> {
        let position = f32::from_bits(self.telemetry.position.load(Ordering::Relaxed));
        (!position.is_nan()).then_some(position)
    }

    pub fn active_voices(&self) -> usize {
        self.telemetry.active_voices.load(Ordering::Relaxed)
    }

    pub fn blocks_processed(&self) -> u64 {
        self.telemetry.blocks.load(Ordering::Relaxed)
    }

    /// Blocks in which queued commands were skipped because the queue was
    /// locked.
    pub fn contended_blocks(&self) -> u64 {
        self.telemetry.contended_blocks.load(Ordering::Relaxed)
    }

    /// Frees retired sounds that no voice is still playing. Returns how many
    /// were freed.
    pub fn collect_garbage(&mut self) -> usize {
        self.pending.extend(self.retired.try_iter());

        let before = self.pending.len();
        self.pending
            .retain(|sound| Arc::strong_count(sound.data()) > 1);
        let freed = before - self.pending.len();
        if freed > 0 {
            debug!(freed, waiting = self.pending.len(), "Freed retired sounds.");
        }
        freed
    }

    /// Retired sounds still waiting for their last voice to finish.
    pub fn retired_sounds(&self) -> usize {
        self.pending.len() + self.retired.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::MemoryReader;

    fn loaded() -> (SamplerProcessor, SamplerHandle) {
        let (processor, mut handle) = SamplerProcessor::new(4, 1000.0);
        let mut reader = MemoryReader::from_planes(vec![vec![1.0; 1000]], 1000);
        handle
            .load_sound(0, "ones", &mut reader, NoteRange::single(60), 60)
            .unwrap();
        (processor, handle)
    }

    #[test]
    fn locked_queue_defers_commands() {
        let (mut processor, handle) = loaded();
        let mut output = AudioBuffer::new(1, 8);

        {
            let _guard = handle.queue.lock();
            processor.process(&mut output, &[NoteEvent::note_on(0, 60, 1.0)]);
        }
        // The note had nothing to play and the load is still queued.
        assert_eq!(handle.pending_commands(), 1);
        assert_eq!(handle.contended_blocks(), 1);
        assert_eq!(handle.active_voices(), 0);
        assert!(processor.synth().sound(0).is_none());

        processor.process(&mut output, &[NoteEvent::note_on(0, 60, 1.0)]);
        assert_eq!(handle.pending_commands(), 0);
        assert_eq!(handle.contended_blocks(), 1);
        assert_eq!(handle.blocks_processed(), 2);
        assert_eq!(handle.active_voices(), 1);
    }

    #[test]
    fn prepare_changes_engine_rate() {
        let (mut processor, handle) = loaded();
        let mut output = AudioBuffer::new(1, 8);
        processor.process(&mut output, &[NoteEvent::note_on(0, 60, 1.0)]);
        assert_eq!(handle.active_voices(), 1);

        processor.prepare(2000.0);
        assert_eq!(processor.sample_rate(), 2000.0);
        processor.process(&mut output, &[NoteEvent::note_on(0, 60, 1.0)]);
        assert_eq!(
            processor.synth().most_recent_voice().unwrap().pitch_ratio(),
            0.5
        );
    }

    #[test]
    fn max_sample_length_defaults_to_ten_seconds() {
        let (_processor, mut handle) = SamplerProcessor::new(1, 1000.0);
        assert_eq!(handle.max_sample_length(), DEFAULT_MAX_SAMPLE_LENGTH_SECS);
        handle.set_max_sample_length(2.5);
        assert_eq!(handle.max_sample_length(), 2.5);
    }

    #[test]
    fn invalid_max_sample_length_keeps_nothing() {
        for cap in [-3.0, f64::NAN] {
            let (_processor, mut handle) = SamplerProcessor::new(1, 1000.0);
            handle.set_max_sample_length(cap);
            assert_eq!(handle.max_sample_length(), 0.0);

            let mut reader = MemoryReader::from_planes(vec![vec![1.0; 100]], 1000);
            let result = handle.load_sound(0, "ones", &mut reader, NoteRange::single(60), 60);
            assert!(matches!(
                result,
                Err(LoadError::InvalidAudio(InvalidAudioError::Empty))
            ));
            assert_eq!(handle.pending_commands(), 0);
        }
    }

    #[test]
    fn sound_limit_is_reported() {
        let (mut processor, mut handle) = SamplerProcessor::new(1, 1000.0);
        for id in 0..MAX_SOUNDS as SoundId {
            let mut reader = MemoryReader::from_planes(vec![vec![1.0; 4]], 1000);
            handle
                .load_sound(id, "pad", &mut reader, NoteRange::single(60), 60)
                .unwrap();
        }

        let mut reader = MemoryReader::from_planes(vec![vec![1.0; 4]], 1000);
        let result = handle.load_sound(500, "extra", &mut reader, NoteRange::single(60), 60);
        assert!(matches!(
            result,
            Err(LoadError::SoundLimit {
                id: 500,
                limit: MAX_SOUNDS
            })
        ));

        // Replacing an installed id is still allowed.
        let mut reader = MemoryReader::from_planes(vec![vec![0.5; 4]], 1000);
        handle
            .load_sound(3, "replaced", &mut reader, NoteRange::single(60), 60)
            .unwrap();

        let mut output = AudioBuffer::new(1, 1);
        processor.process(&mut output, &[]);
        assert_eq!(processor.synth().sounds().len(), MAX_SOUNDS);
        assert!(processor.synth().sound(500).is_none());
        assert_eq!(processor.synth().sound(3).unwrap().name(), "replaced");

        // Removing one frees a slot.
        handle.remove_sound(0);
        let mut reader = MemoryReader::from_planes(vec![vec![1.0; 4]], 1000);
        handle
            .load_sound(500, "extra", &mut reader, NoteRange::single(60), 60)
            .unwrap();
        processor.process(&mut output, &[]);
        assert!(processor.synth().sound(0).is_none());
        assert_eq!(processor.synth().sound(500).unwrap().name(), "extra");
    }
}

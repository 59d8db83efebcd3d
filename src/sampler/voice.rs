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
use std::fmt;
use std::sync::Arc;

use super::envelope::Adsr;
use super::sound::{SampleBuffer, Sound, SoundId};
use crate::audio::AudioBuffer;

/// A reusable rendering slot that plays one note of one sound at a time.
///
/// While playing, the voice shares the sound's sample data, so replacing or
/// removing the sound does not cut the note short.
pub struct Voice {
    sound: Option<SoundId>,
    data: Option<Arc<SampleBuffer>>,
    note: u8,
    key_down: bool,
    pitch_ratio: f64,
    source_position: f64,
    left_gain: f32,
    right_gain: f32,
    envelope: Adsr,
    started_at: u64,
}

impl Voice {
    pub fn new() -> Self {
        Self {
            sound: None,
            data: None,
            note: 0,
            key_down: false,
            pitch_ratio: 1.0,
            source_position: 0.0,
            left_gain: 0.0,
            right_gain: 0.0,
            envelope: Adsr::new(),
            started_at: 0,
        }
    }

    /// Every sound in this engine is a sample sound.
    pub fn can_play(&self, _sound: &Sound) -> bool {
        true
    }

    /// Binds the voice to a sound and starts the note.
    ///
    /// Does nothing if the engine sample rate is not positive.
    pub fn start(
        &mut self,
        note: u8,
        velocity: f32,
        sound: &Sound,
        engine_sample_rate: f64,
        started_at: u64,
    ) {
        if engine_sample_rate.is_nan() || engine_sample_rate <= 0.0 || !self.can_play(sound) {
            return;
        }

        let source_rate = sound.source_sample_rate() as f64;
        let semitones = note as i32 + sound.pitch_shift() - sound.root_note() as i32;
        self.pitch_ratio = 2f64.powf(semitones as f64 / 12.0) * source_rate / engine_sample_rate;
        self.source_position = 0.0;

        let velocity = velocity.clamp(0.0, 1.0);
        self.left_gain = velocity;
        self.right_gain = velocity;

        self.envelope.set_sample_rate(source_rate);
        self.envelope.set_parameters(sound.envelope_parameters());
        self.envelope.note_on();

        self.sound = Some(sound.id());
        self.data = Some(Arc::clone(sound.data()));
        self.note = note;
        self.key_down = true;
        self.started_at = started_at;
    }

    /// Stops the note. With tail-off the envelope releases and the voice keeps
    /// rendering until it goes idle; without, the voice is silenced at once.
    pub fn stop(&mut self, _velocity: f32, allow_tail_off: bool) {
        self.key_down = false;
        if allow_tail_off {
            self.envelope.note_off();
            if !self.envelope.is_active() {
                self.clear_note();
            }
        } else {
            self.clear_note();
        }
    }

    /// Frees the voice.
    pub fn clear_note(&mut self) {
        self.envelope.reset();
        self.source_position = 0.0;
        self.key_down = false;
        self.sound = None;
        self.data = None;
    }

    /// Adds `num_samples` frames of this voice into `output` starting at
    /// `start_sample`.
    pub fn render(&mut self, output: &mut AudioBuffer, start_sample: usize, num_samples: usize) {
        let Some(data) = self.data.as_ref() else {
            return;
        };

        let left_in = data.channel(0);
        let right_in = if data.channel_count() > 1 {
            Some(data.channel(1))
        } else {
            None
        };
        let length = data.length() as f64;
        let end = start_sample
            .saturating_add(num_samples)
            .min(output.frames());

        let mut finished = false;
        for frame in start_sample..end {
            let pos = self.source_position as usize;
            let alpha = (self.source_position - pos as f64) as f32;
            let inv_alpha = 1.0 - alpha;

            let mut l = left_in[pos] * inv_alpha + left_in[pos + 1] * alpha;
            let mut r = match right_in {
                Some(right_in) => right_in[pos] * inv_alpha + right_in[pos + 1] * alpha,
                None => l,
            };

            let envelope = self.envelope.next_sample();
            l *= self.left_gain * envelope;
            r *= self.right_gain * envelope;

            match output.channels_mut() {
                [] => {}
                [mono] => mono[frame] += (l + r) * 0.5,
                [out_l, out_r, ..] => {
                    out_l[frame] += l;
                    out_r[frame] += r;
                }
            }

            self.source_position += self.pitch_ratio;
            if self.source_position > length || !self.envelope.is_active() {
                finished = true;
                break;
            }
        }

        if finished {
            self.clear_note();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.data.is_some()
    }

    pub fn is_playing_note(&self, note: u8) -> bool {
        self.is_playing() && self.note == note
    }

    /// True if the voice is sounding `note` of `sound` and has not been
    /// released yet.
    pub fn is_key_down_for(&self, sound: SoundId, note: u8) -> bool {
        self.key_down && self.sound == Some(sound) && self.is_playing_note(note)
    }

    pub fn is_key_down(&self) -> bool {
        self.key_down
    }

    pub fn sound_id(&self) -> Option<SoundId> {
        self.sound
    }

    pub fn note(&self) -> Option<u8> {
        self.is_playing().then_some(self.note)
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    pub fn started_at(&self) -> u64 {
        self.started_at
    }

    /// Playback position in the source, in seconds.
    pub fn position_seconds(&self) -> Option<f64> {
        self.data
            .as_ref()
            .map(|data| self.source_position / data.sample_rate() as f64)
    }
}

impl Default for Voice {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("sound", &self.sound)
            .field("note", &self.note())
            .field("key_down", &self.key_down)
            .field("pitch_ratio", &self.pitch_ratio)
            .field("source_position", &self.source_position)
            .field("envelope", &self.envelope.stage())
            .finish()
    }
}

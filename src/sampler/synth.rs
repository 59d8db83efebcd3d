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
use super::event::{NoteEvent, NoteEventKind};
use super::sound::{Sound, SoundId};
use super::voice::Voice;
use crate::audio::AudioBuffer;

/// Sound slots reserved up front so installing never allocates.
pub const MAX_SOUNDS: usize = 128;

/// Owns the voice pool and the sound set, and mixes the voices into blocks.
#[derive(Debug)]
pub struct Synthesiser {
    voices: Vec<Voice>,
    sounds: Vec<Sound>,
    sample_rate: f64,
    started: u64,
}

impl Synthesiser {
    pub fn new(voice_count: usize, sample_rate: f64) -> Self {
        Self {
            voices: (0..voice_count).map(|_| Voice::new()).collect(),
            sounds: Vec::with_capacity(MAX_SOUNDS),
            sample_rate,
            started: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Changes the engine sample rate. Playing voices are cut because their
    /// pitch ratios no longer apply.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate > 0.0 && sample_rate != self.sample_rate {
            self.all_notes_off(false);
            self.sample_rate = sample_rate;
        }
    }

    /// Installs a sound, returning the sound it replaced if one had the same
    /// id. Voices playing the replaced sound keep playing it.
    ///
    /// With `MAX_SOUNDS` already installed a new id is refused and the sound
    /// itself is returned.
    pub fn add_sound(&mut self, sound: Sound) -> Option<Sound> {
        let full = self.sounds.len() >= MAX_SOUNDS;
        match self.sounds.iter_mut().find(|s| s.id() == sound.id()) {
            Some(existing) => Some(std::mem::replace(existing, sound)),
            None if full => Some(sound),
            None => {
                self.sounds.push(sound);
                None
            }
        }
    }

    pub fn remove_sound(&mut self, id: SoundId) -> Option<Sound> {
        let index = self.sounds.iter().position(|s| s.id() == id)?;
        Some(self.sounds.remove(index))
    }

    pub fn sound(&self, id: SoundId) -> Option<&Sound> {
        self.sounds.iter().find(|s| s.id() == id)
    }

    pub fn sound_mut(&mut self, id: SoundId) -> Option<&mut Sound> {
        self.sounds.iter_mut().find(|s| s.id() == id)
    }

    pub fn sounds(&self) -> &[Sound] {
        &self.sounds
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Starts `note` on every sound that maps it.
    ///
    /// A voice already holding the same note of the same sound is released
    /// first. With no free voice the note is dropped.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        let Self {
            voices,
            sounds,
            sample_rate,
            started,
        } = self;

        for sound in sounds.iter().filter(|s| s.applies_to_note(note)) {
            for voice in voices.iter_mut() {
                if voice.is_key_down_for(sound.id(), note) {
                    voice.stop(1.0, true);
                }
            }

            if let Some(voice) = voices
                .iter_mut()
                .find(|v| !v.is_playing() && v.can_play(sound))
            {
                *started += 1;
                voice.start(note, velocity, sound, *sample_rate, *started);
            }
        }
    }

    /// Stops every held voice playing `note`.
    pub fn note_off(&mut self, note: u8, allow_tail_off: bool) {
        for voice in self.voices.iter_mut() {
            if voice.is_key_down() && voice.is_playing_note(note) {
                voice.stop(0.0, allow_tail_off);
            }
        }
    }

    pub fn all_notes_off(&mut self, allow_tail_off: bool) {
        for voice in self.voices.iter_mut().filter(|v| v.is_playing()) {
            voice.stop(0.0, allow_tail_off);
        }
    }

    /// Renders `num_samples` frames into `output` from `start_sample`,
    /// applying each event at its offset. Events must be sorted by offset;
    /// an event earlier than one already handled applies immediately.
    pub fn render_block(
        &mut self,
        output: &mut AudioBuffer,
        events: &[NoteEvent],
        start_sample: usize,
        num_samples: usize,
    ) {
        let end = start_sample
            .saturating_add(num_samples)
            .min(output.frames());
        let mut position = start_sample.min(end);

        for event in events {
            let at = start_sample
                .saturating_add(event.offset)
                .clamp(position, end);
            if at > position {
                self.render_voices(output, position, at - position);
                position = at;
            }
            self.handle_event(event.kind);
        }

        if position < end {
            self.render_voices(output, position, end - position);
        }
    }

    fn handle_event(&mut self, kind: NoteEventKind) {
        match kind {
            NoteEventKind::NoteOn { note, velocity } if velocity > 0.0 => {
                self.note_on(note, velocity)
            }
            NoteEventKind::NoteOn { note, .. } => self.note_off(note, true),
            NoteEventKind::NoteOff {
                note,
                allow_tail_off,
            } => self.note_off(note, allow_tail_off),
        }
    }

    fn render_voices(&mut self, output: &mut AudioBuffer, start_sample: usize, num_samples: usize) {
        for voice in self.voices.iter_mut() {
            voice.render(output, start_sample, num_samples);
        }
    }

    /// The most recently started voice that is still playing.
    pub fn most_recent_voice(&self) -> Option<&Voice> {
        self.voices
            .iter()
            .filter(|v| v.is_playing())
            .max_by_key(|v| v.started_at())
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_playing()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::envelope::AdsrParameters;
    use crate::sampler::sound::{NoteRange, SampleBuffer};
    use crate::testutil;

    fn flat_sound(id: SoundId, notes: NoteRange, root: u8, plane: Vec<f32>, rate: u32) -> Sound {
        let data = SampleBuffer::from_planes(vec![plane], rate).unwrap();
        let mut sound = Sound::from_buffer(id, "test", data, notes, root);
        sound.set_envelope_parameters(AdsrParameters::flat());
        sound
    }

    #[test]
    fn test_note_on_binds_one_voice() {
        let mut synth = Synthesiser::new(4, 44100.0);
        synth.add_sound(flat_sound(0, NoteRange::single(60), 60, vec![1.0; 64], 44100));

        synth.note_on(61, 1.0);
        assert_eq!(synth.active_voice_count(), 0);

        synth.note_on(60, 1.0);
        assert_eq!(synth.active_voice_count(), 1);
        let voice = synth.most_recent_voice().unwrap();
        assert_eq!(voice.sound_id(), Some(0));
        assert_eq!(voice.note(), Some(60));
    }

    #[test]
    fn test_sine_scaled_by_attack() {
        let sine = testutil::sine(440.0, 44100, 44100);
        let mut synth = Synthesiser::new(8, 44100.0);
        let mut sound = flat_sound(0, NoteRange::single(60), 60, sine.clone(), 44100);
        sound.set_envelope_parameters(AdsrParameters::new(0.1, 0.1, 1.0, 0.1));
        synth.add_sound(sound);

        let mut output = AudioBuffer::new(1, 44100);
        synth.render_block(&mut output, &[NoteEvent::note_on(0, 60, 1.0)], 0, 44100);

        let attack_frames = 4410;
        for (i, (rendered, original)) in output.channel(0).iter().zip(sine.iter()).enumerate() {
            let gain = ((i + 1) as f32 / attack_frames as f32).min(1.0);
            assert!(
                (rendered - original * gain).abs() < 1e-3,
                "frame {}: {} vs {}",
                i,
                rendered,
                original * gain
            );
        }
    }

    #[test]
    fn test_pitch_shift_octave() {
        let mut synth = Synthesiser::new(1, 44100.0);
        synth.add_sound(flat_sound(0, NoteRange::single(60), 60, vec![0.0; 64], 44100));
        synth.sound_mut(0).unwrap().set_pitch_shift(12);

        synth.note_on(60, 1.0);
        assert_eq!(synth.most_recent_voice().unwrap().pitch_ratio(), 2.0);
    }

    #[test]
    fn test_overlapping_voices_sum() {
        let a: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin() * 0.5).collect();
        let b: Vec<f32> = (0..256).map(|i| (i as f32 * 0.37).cos() * 0.25).collect();

        let render = |sounds: Vec<Sound>, notes: &[u8]| {
            let mut synth = Synthesiser::new(4, 44100.0);
            for sound in sounds {
                synth.add_sound(sound);
            }
            let events: Vec<NoteEvent> = notes
                .iter()
                .map(|n| NoteEvent::note_on(0, *n, 0.8))
                .collect();
            let mut output = AudioBuffer::new(2, 200);
            synth.render_block(&mut output, &events, 0, 200);
            output
        };

        let sound_a = || flat_sound(0, NoteRange::single(60), 60, a.clone(), 44100);
        let sound_b = || flat_sound(1, NoteRange::single(64), 64, b.clone(), 44100);

        let alone_a = render(vec![sound_a()], &[60]);
        let alone_b = render(vec![sound_b()], &[64]);
        let together = render(vec![sound_a(), sound_b()], &[60, 64]);

        for ch in 0..2 {
            for i in 0..200 {
                let sum = alone_a.channel(ch)[i] + alone_b.channel(ch)[i];
                assert!((together.channel(ch)[i] - sum).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_no_free_voice_drops_note() {
        let mut synth = Synthesiser::new(1, 44100.0);
        synth.add_sound(flat_sound(0, NoteRange::span(60, 61), 60, vec![1.0; 64], 44100));

        synth.note_on(60, 1.0);
        synth.note_on(61, 1.0);
        assert_eq!(synth.active_voice_count(), 1);
        assert_eq!(synth.most_recent_voice().unwrap().note(), Some(60));
    }

    #[test]
    fn test_retrigger_releases_previous_voice() {
        let mut synth = Synthesiser::new(2, 44100.0);
        let mut sound = flat_sound(0, NoteRange::single(60), 60, vec![1.0; 44100], 44100);
        sound.set_envelope_parameters(AdsrParameters::new(0.0, 0.0, 1.0, 0.5));
        synth.add_sound(sound);

        synth.note_on(60, 1.0);
        synth.note_on(60, 1.0);
        assert_eq!(synth.active_voice_count(), 2);
        let held: Vec<bool> = synth.voices().iter().map(|v| v.is_key_down()).collect();
        assert_eq!(held, vec![false, true]);

        // Only the held voice receives the note off; both are now releasing.
        synth.note_off(60, true);
        assert!(synth.voices().iter().all(|v| !v.is_key_down()));
        assert_eq!(synth.active_voice_count(), 2);

        synth.all_notes_off(false);
        assert_eq!(synth.active_voice_count(), 0);
    }

    #[test]
    fn test_events_apply_at_offsets() {
        let mut synth = Synthesiser::new(2, 44100.0);
        synth.add_sound(flat_sound(0, NoteRange::single(60), 60, vec![1.0; 64], 44100));

        let mut output = AudioBuffer::new(1, 16);
        let events = [NoteEvent::note_on(4, 60, 1.0), NoteEvent {
            offset: 8,
            kind: NoteEventKind::NoteOff {
                note: 60,
                allow_tail_off: false,
            },
        }];
        synth.render_block(&mut output, &events, 0, 16);

        let rendered = output.channel(0);
        assert!(rendered[..4].iter().all(|s| *s == 0.0));
        assert!(rendered[4..8].iter().all(|s| *s == 1.0));
        assert!(rendered[8..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_replacing_sound_keeps_playing_voice() {
        let mut synth = Synthesiser::new(2, 44100.0);
        synth.add_sound(flat_sound(0, NoteRange::single(60), 60, vec![1.0; 64], 44100));
        synth.note_on(60, 1.0);

        let quieter = flat_sound(0, NoteRange::single(60), 60, vec![0.5; 64], 44100);
        let replaced = synth.add_sound(quieter);
        assert!(replaced.is_some());
        assert_eq!(synth.sounds().len(), 1);

        let mut output = AudioBuffer::new(1, 4);
        synth.render_block(&mut output, &[], 0, 4);
        assert_eq!(output.channel(0), &[1.0; 4]);

        assert!(synth.remove_sound(0).is_some());
        assert!(synth.remove_sound(0).is_none());
        assert!(synth.sound(0).is_none());
    }

    #[test]
    fn test_sound_limit() {
        let mut synth = Synthesiser::new(1, 44100.0);
        for id in 0..MAX_SOUNDS as SoundId {
            assert!(synth
                .add_sound(flat_sound(id, NoteRange::single(60), 60, vec![1.0; 4], 44100))
                .is_none());
        }

        let extra = flat_sound(1000, NoteRange::single(60), 60, vec![1.0; 4], 44100);
        let refused = synth.add_sound(extra);
        assert_eq!(refused.map(|s| s.id()), Some(1000));
        assert_eq!(synth.sounds().len(), MAX_SOUNDS);

        // Replacing an existing id still works at the limit.
        let moved = flat_sound(5, NoteRange::single(61), 61, vec![1.0; 4], 44100);
        let replaced = synth.add_sound(moved);
        assert_eq!(replaced.map(|s| s.id()), Some(5));
        assert!(synth.sound(5).unwrap().applies_to_note(61));
    }

    #[test]
    fn test_finished_chord_can_be_restarted() {
        let mut synth = Synthesiser::new(4, 44100.0);
        synth.add_sound(flat_sound(0, NoteRange::span(60, 63), 60, vec![1.0; 16], 44100));
        let chord: Vec<NoteEvent> = (60..64)
            .map(|note| NoteEvent::note_on(0, note, 1.0))
            .collect();

        let mut output = AudioBuffer::new(1, 8);
        synth.render_block(&mut output, &chord, 0, 8);
        assert_eq!(synth.active_voice_count(), 4);

        // Every voice runs off the end of the sample without a note off.
        for _ in 0..4 {
            output.clear();
            synth.render_block(&mut output, &[], 0, 8);
        }
        assert_eq!(synth.active_voice_count(), 0);
        assert!(output.channel(0).iter().all(|s| *s == 0.0));

        synth.all_notes_off(false);
        output.clear();
        synth.render_block(&mut output, &chord, 0, 8);
        assert_eq!(synth.active_voice_count(), 4);
        assert!(output.channel(0)[0] > 0.0);
    }

    #[test]
    fn test_sample_rate_change_stops_voices() {
        let mut synth = Synthesiser::new(2, 44100.0);
        synth.add_sound(flat_sound(0, NoteRange::single(60), 60, vec![1.0; 64], 44100));
        synth.note_on(60, 1.0);

        synth.set_sample_rate(44100.0);
        assert_eq!(synth.active_voice_count(), 1);

        synth.set_sample_rate(48000.0);
        assert_eq!(synth.active_voice_count(), 0);
        assert_eq!(synth.sample_rate(), 48000.0);
    }
}

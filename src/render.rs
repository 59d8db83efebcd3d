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

//! Offline rendering of a note sequence.

use std::error::Error;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, span, Level};

use crate::audio::AudioBuffer;
use crate::config;
use crate::midi::{self, TimedNoteEvent};
use crate::processor::SamplerProcessor;
use crate::sampler::NoteEvent;

/// Renders `events` block by block, handing each finished block to `sink`.
///
/// Rendering runs until `tail_frames` after the last event. Returns the
/// number of frames rendered.
pub fn render_sequence<E, F>(
    processor: &mut SamplerProcessor,
    events: &[TimedNoteEvent],
    channels: usize,
    block_size: usize,
    tail_frames: u64,
    mut sink: F,
) -> Result<u64, E>
where
    F: FnMut(&AudioBuffer) -> Result<(), E>,
{
    let block_size = block_size.max(1);
    let total = events
        .last()
        .map(|event| event.frame + 1)
        .unwrap_or(0)
        + tail_frames;

    let mut buffer = AudioBuffer::new(channels, block_size);
    let mut block_events = Vec::with_capacity(64);
    let mut remaining = events.iter().peekable();
    let mut block_start = 0u64;

    while block_start < total {
        let frames = (total - block_start).min(block_size as u64) as usize;
        let block_end = block_start + frames as u64;

        block_events.clear();
        while let Some(event) = remaining.next_if(|event| event.frame < block_end) {
            block_events.push(NoteEvent {
                offset: event.frame.saturating_sub(block_start) as usize,
                kind: event.kind,
            });
        }

        buffer.set_frames(frames);
        buffer.clear();
        processor.process(&mut buffer, &block_events);
        sink(&buffer)?;

        block_start = block_end;
    }

    Ok(total)
}

/// Renders a MIDI file through the pads of a config into a 32-bit float WAV.
pub fn render_to_wav(
    config: &config::Sampler,
    midi_path: &Path,
    output_path: &Path,
    tail_secs: f64,
) -> Result<u64, Box<dyn Error>> {
    let span = span!(Level::INFO, "render");
    let _enter = span.enter();

    let engine = config.engine();
    let (mut processor, mut handle) =
        SamplerProcessor::new(engine.voices(), engine.sample_rate() as f64);
    handle.set_max_sample_length(engine.max_sample_length_secs());
    config.load_pads(&mut handle)?;

    let events = midi::read_file(midi_path, engine.sample_rate())?;
    info!(
        midi = ?midi_path,
        events = events.len(),
        "Parsed MIDI file."
    );

    let mut writer = WavWriter::create(
        output_path,
        WavSpec {
            channels: engine.output_channels(),
            sample_rate: engine.sample_rate(),
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        },
    )?;

    let tail_frames = (tail_secs.max(0.0) * engine.sample_rate() as f64) as u64;
    let mut interleaved = vec![0.0f32; engine.block_size() * engine.output_channels() as usize];
    let frames = render_sequence(
        &mut processor,
        &events,
        engine.output_channels() as usize,
        engine.block_size(),
        tail_frames,
        |block| -> Result<(), hound::Error> {
            let written = block.write_interleaved(&mut interleaved);
            for sample in &interleaved[..written * block.channel_count()] {
                writer.write_sample(*sample)?;
            }
            Ok(())
        },
    )?;
    writer.finalize()?;

    handle.collect_garbage();
    info!(
        output = ?output_path,
        frames,
        seconds = frames as f64 / engine.sample_rate() as f64,
        "Render finished."
    );
    Ok(frames)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sampler::{AdsrParameters, NoteEventKind, NoteRange, SampleBuffer, Sound};

    #[test]
    fn renders_until_tail() {
        let (mut processor, mut handle) = SamplerProcessor::new(4, 1000.0);
        let data = SampleBuffer::from_planes(vec![vec![1.0; 100]], 1000).unwrap();
        let mut sound = Sound::from_buffer(0, "ones", data, NoteRange::single(60), 60);
        sound.set_envelope_parameters(AdsrParameters::flat());
        handle.install_sound(sound).unwrap();

        let events = [
            TimedNoteEvent {
                frame: 10,
                kind: NoteEventKind::NoteOn {
                    note: 60,
                    velocity: 1.0,
                },
            },
            TimedNoteEvent {
                frame: 30,
                kind: NoteEventKind::NoteOff {
                    note: 60,
                    allow_tail_off: true,
                },
            },
        ];

        let mut rendered = Vec::new();
        let frames = render_sequence(&mut processor, &events, 1, 16, 9, |block| {
            rendered.extend_from_slice(block.channel(0));
            Ok::<(), ()>(())
        })
        .unwrap();

        assert_eq!(frames, 40);
        assert_eq!(rendered.len(), 40);
        assert!(rendered[..10].iter().all(|s| *s == 0.0));
        assert!(rendered[10..30].iter().all(|s| *s == 1.0));
        // Zero release cuts the note at the note off.
        assert!(rendered[30..].iter().all(|s| *s == 0.0));
    }
}

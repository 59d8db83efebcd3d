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
pub mod cpal;
pub mod decode;
pub mod error;

pub use decode::{AudioReader, MemoryReader, SymphoniaReader};
pub use error::DecodeError;

/// A planar multi-channel block of f32 samples.
///
/// The sampler only ever adds into an `AudioBuffer`; clearing it between
/// blocks is the owner's job.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    /// Creates a silent buffer.
    pub fn new(channel_count: usize, frames: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frames]; channel_count],
            frames,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.channels[channel]
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    /// Zeroes every channel.
    pub fn clear(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.fill(0.0);
        }
    }

    /// Shrinks or grows the usable frame count. Growing past the original
    /// allocation allocates, so the render path only ever shrinks.
    pub fn set_frames(&mut self, frames: usize) {
        for channel in self.channels.iter_mut() {
            channel.resize(frames, 0.0);
        }
        self.frames = frames;
    }

    /// Writes the first `frames` frames into `output` as interleaved samples.
    /// Returns the number of frames written.
    pub fn write_interleaved(&self, output: &mut [f32]) -> usize {
        let channel_count = self.channels.len();
        if channel_count == 0 {
            return 0;
        }

        let frames = (output.len() / channel_count).min(self.frames);
        for (frame, out) in output
            .chunks_exact_mut(channel_count)
            .take(frames)
            .enumerate()
        {
            for (ch, sample) in out.iter_mut().enumerate() {
                *sample = self.channels[ch][frame];
            }
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleave() {
        let mut buffer = AudioBuffer::new(2, 3);
        buffer.channel_mut(0).copy_from_slice(&[1.0, 2.0, 3.0]);
        buffer.channel_mut(1).copy_from_slice(&[-1.0, -2.0, -3.0]);

        let mut out = vec![0.0; 6];
        assert_eq!(buffer.write_interleaved(&mut out), 3);
        assert_eq!(out, vec![1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);

        // Short output only takes whole frames.
        let mut short = vec![0.0; 3];
        assert_eq!(buffer.write_interleaved(&mut short), 1);
        assert_eq!(short, vec![1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_clear_and_resize() {
        let mut buffer = AudioBuffer::new(1, 4);
        buffer.channel_mut(0).fill(0.5);
        buffer.clear();
        assert!(buffer.channel(0).iter().all(|s| *s == 0.0));

        buffer.set_frames(2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0).len(), 2);
    }
}

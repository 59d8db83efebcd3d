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
use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, warn};

use super::error::DecodeError;

/// A readable source of decoded audio frames in planar format.
///
/// Readers are only used while building sounds on the control path, never
/// while rendering.
pub trait AudioReader: Send {
    /// Get the number of channels in this reader
    fn channel_count(&self) -> u16;

    /// Get the sample rate of this reader
    fn sample_rate(&self) -> u32;

    /// Total number of frames, if the container reports it.
    fn frame_count(&self) -> Option<u64>;

    /// Reads up to `max_frames` frames. Each channel in `output` is cleared and
    /// then filled with the same number of samples. Returns the number of frames
    /// read (0 = end of stream).
    ///
    /// `output` must have exactly `channel_count()` elements.
    fn read_frames(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, DecodeError>;
}

/// Audio held in memory. Useful for tests and for audio synthesised in-process.
pub struct MemoryReader {
    planes: Vec<Vec<f32>>,
    position: usize,
    sample_rate: u32,
}

impl MemoryReader {
    /// Creates a reader from interleaved samples.
    pub fn new(interleaved: Vec<f32>, channel_count: u16, sample_rate: u32) -> Self {
        let channels = channel_count as usize;
        let frames = if channels > 0 {
            interleaved.len() / channels
        } else {
            0
        };

        let mut planes = vec![Vec::with_capacity(frames); channels];
        for frame in interleaved.chunks_exact(channels.max(1)).take(frames) {
            for (ch, sample) in frame.iter().enumerate() {
                planes[ch].push(*sample);
            }
        }

        Self::from_planes(planes, sample_rate)
    }

    /// Creates a reader from one Vec per channel.
    pub fn from_planes(planes: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            planes,
            position: 0,
            sample_rate,
        }
    }

    fn total_frames(&self) -> usize {
        self.planes.iter().map(|p| p.len()).min().unwrap_or(0)
    }
}

impl AudioReader for MemoryReader {
    fn channel_count(&self) -> u16 {
        self.planes.len() as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.total_frames() as u64)
    }

    fn read_frames(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, DecodeError> {
        if output.len() != self.planes.len() {
            return Err(DecodeError::ChannelMismatch {
                expected: self.planes.len(),
                actual: output.len(),
            });
        }

        let available = self.total_frames().saturating_sub(self.position);
        let to_copy = available.min(max_frames);
        for (plane, out) in self.planes.iter().zip(output.iter_mut()) {
            out.clear();
            out.extend_from_slice(&plane[self.position..self.position + to_copy]);
        }
        self.position += to_copy;

        Ok(to_copy)
    }
}

/// Decodes audio files or in-memory encoded bytes (WAV, FLAC, MP3, Ogg, ...)
/// with symphonia.
pub struct SymphoniaReader {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    frame_count: Option<u64>,
    // Frames decoded from the last packet(s) that have not been handed out yet.
    pending: Vec<Vec<f32>>,
    finished: bool,
}

impl SymphoniaReader {
    /// Opens an audio file, using its extension as a format hint.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            DecodeError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        Self::from_source(Box::new(file), hint, &path.display().to_string())
    }

    /// Decodes encoded audio that is already in memory, such as a file
    /// embedded in the binary or received over the wire.
    pub fn from_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self, DecodeError> {
        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        Self::from_source(Box::new(Cursor::new(bytes)), hint, "<memory>")
    }

    fn from_source(
        source: Box<dyn MediaSource>,
        hint: Hint,
        description: &str,
    ) -> Result<Self, DecodeError> {
        let mss = MediaSourceStream::new(source, Default::default());

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let detected = get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| DecodeError::Unsupported(format!("'{}': {}", description, e)))?;

        let mut format_reader = detected.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| DecodeError::Unsupported("Sample rate not specified".to_string()))?;
        let frame_count = params.n_frames;

        let decoder_opts: DecoderOptions = Default::default();
        let mut decoder = get_codecs()
            .make(&params, &decoder_opts)
            .map_err(|e| DecodeError::Unsupported(format!("'{}': {}", description, e)))?;

        // Prefer container metadata for the channel count. When it is missing,
        // decode the first packet and take the count from the decoded buffer.
        let mut pending = Vec::new();
        let channels = match params.channels.map(|c| c.count()) {
            Some(count) if count > 0 => {
                pending.resize_with(count, Vec::new);
                count as u16
            }
            _ => {
                if !decode_next_packet(
                    format_reader.as_mut(),
                    decoder.as_mut(),
                    track_id,
                    &mut pending,
                )? {
                    return Err(DecodeError::Unsupported(
                        "Channels not specified".to_string(),
                    ));
                }
                pending.len() as u16
            }
        };

        debug!(
            source = description,
            channels,
            sample_rate,
            frames = ?frame_count,
            "Opened audio for decoding"
        );

        Ok(Self {
            format_reader,
            decoder,
            track_id,
            channels,
            sample_rate,
            frame_count,
            pending,
            finished: false,
        })
    }

    fn pending_frames(&self) -> usize {
        self.pending.first().map(|p| p.len()).unwrap_or(0)
    }
}

impl AudioReader for SymphoniaReader {
    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    fn read_frames(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, DecodeError> {
        if output.len() != self.channels as usize {
            return Err(DecodeError::ChannelMismatch {
                expected: self.channels as usize,
                actual: output.len(),
            });
        }

        while !self.finished && self.pending_frames() < max_frames {
            if !decode_next_packet(
                self.format_reader.as_mut(),
                self.decoder.as_mut(),
                self.track_id,
                &mut self.pending,
            )? {
                self.finished = true;
            }
        }

        let frames = self.pending_frames().min(max_frames);
        for (plane, out) in self.pending.iter_mut().zip(output.iter_mut()) {
            out.clear();
            out.extend(plane.drain(..frames));
        }

        Ok(frames)
    }
}

/// Reads packets until one for `track_id` decodes to at least one frame, and
/// appends that frame data to `pending`. Returns false at end of stream.
fn decode_next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
    pending: &mut Vec<Vec<f32>>,
) -> Result<bool, DecodeError> {
    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(false);
            }
            // Some demuxers report a decode error at the end of the stream.
            Err(SymphoniaError::DecodeError(_)) => return Ok(false),
            Err(e) => return Err(DecodeError::AudioError(e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = e, "Skipping undecodable packet");
                continue;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(DecodeError::AudioError(e)),
        };

        if append_planar(decoded, pending) > 0 {
            return Ok(true);
        }
    }
}

/// Converts a decoded buffer to f32 and appends it channel by channel.
fn append_planar(decoded: AudioBufferRef, pending: &mut Vec<Vec<f32>>) -> usize {
    match decoded {
        AudioBufferRef::F32(buf) => extend_planes(&buf, pending, |sample| sample),
        AudioBufferRef::F64(buf) => extend_planes(&buf, pending, |sample| sample as f32),
        AudioBufferRef::S8(buf) => extend_planes(&buf, pending, scale_s8),
        AudioBufferRef::S16(buf) => extend_planes(&buf, pending, scale_s16),
        AudioBufferRef::S24(buf) => extend_planes(&buf, pending, |sample| {
            scale_s24(sample.inner())
        }),
        AudioBufferRef::S32(buf) => extend_planes(&buf, pending, scale_s32),
        AudioBufferRef::U8(buf) => extend_planes(&buf, pending, scale_u8),
        AudioBufferRef::U16(buf) => extend_planes(&buf, pending, scale_u16),
        AudioBufferRef::U24(buf) => extend_planes(&buf, pending, |sample| {
            scale_u24(sample.inner())
        }),
        AudioBufferRef::U32(buf) => extend_planes(&buf, pending, scale_u32),
    }
}

fn extend_planes<T, F>(buf: &AudioBuffer<T>, pending: &mut Vec<Vec<f32>>, convert: F) -> usize
where
    T: symphonia::core::sample::Sample,
    F: Fn(T) -> f32,
{
    let frames = buf.frames();
    if pending.is_empty() {
        pending.resize_with(buf.spec().channels.count(), Vec::new);
    }

    let planes = buf.planes();
    let decoded = planes.planes();
    for (ch, out) in pending.iter_mut().enumerate() {
        match decoded.get(ch) {
            Some(plane) => out.extend(plane.iter().take(frames).map(|s| convert(*s))),
            // Keep the planes aligned if a packet carries fewer channels.
            None => out.resize(out.len() + frames, 0.0),
        }
    }

    frames
}

#[inline]
fn scale_s8(sample: i8) -> f32 {
    sample as f32 / (1i64 << 7) as f32
}

#[inline]
fn scale_s16(sample: i16) -> f32 {
    sample as f32 / (1i64 << 15) as f32
}

#[inline]
fn scale_s24(sample: i32) -> f32 {
    sample as f32 / (1i64 << 23) as f32
}

#[inline]
fn scale_s32(sample: i32) -> f32 {
    sample as f32 / (1i64 << 31) as f32
}

#[inline]
fn scale_u8(sample: u8) -> f32 {
    (sample as f32 / u8::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u16(sample: u16) -> f32 {
    (sample as f32 / u16::MAX as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u24(sample: u32) -> f32 {
    let max = (1u32 << 24) - 1;
    (sample as f32 / max as f32) * 2.0 - 1.0
}

#[inline]
fn scale_u32(sample: u32) -> f32 {
    (sample as f32 / u32::MAX as f32) * 2.0 - 1.0
}

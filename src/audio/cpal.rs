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
use std::{error::Error, fmt};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Receiver;
use tracing::{error, info, span, Level};

use super::AudioBuffer;
use crate::processor::SamplerProcessor;
use crate::sampler::{NoteEvent, NoteEventKind};

/// Live note events taken per callback. Any excess waits for the next one.
const MAX_EVENTS_PER_CALLBACK: usize = 256;

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The maximum number of channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

/// Runs the sampler inside an output callback.
///
/// Callback buffers are split into blocks no longer than the block size.
/// Live notes are applied at the start of the first block of a callback.
struct StreamRenderer {
    processor: SamplerProcessor,
    notes: Receiver<NoteEventKind>,
    buffer: AudioBuffer,
    block_size: usize,
    events: Vec<NoteEvent>,
    scratch: Vec<f32>,
}

impl StreamRenderer {
    fn new(
        processor: SamplerProcessor,
        notes: Receiver<NoteEventKind>,
        channels: u16,
        block_size: usize,
    ) -> Self {
        let block_size = block_size.max(1);
        Self {
            processor,
            notes,
            buffer: AudioBuffer::new(channels as usize, block_size),
            block_size,
            events: Vec::with_capacity(MAX_EVENTS_PER_CALLBACK),
            scratch: vec![0.0; block_size * channels as usize],
        }
    }

    /// Fills interleaved `data` with the next frames.
    fn render(&mut self, data: &mut [f32]) {
        let channels = self.buffer.channel_count();
        if channels == 0 {
            data.fill(0.0);
            return;
        }

        self.events.clear();
        while self.events.len() < MAX_EVENTS_PER_CALLBACK {
            match self.notes.try_recv() {
                Ok(kind) => self.events.push(NoteEvent { offset: 0, kind }),
                Err(_) => break,
            }
        }

        let mut first = true;
        for chunk in data.chunks_mut(self.block_size * channels) {
            let frames = chunk.len() / channels;
            self.buffer.set_frames(frames);
            self.buffer.clear();

            let events: &[NoteEvent] = if first { &self.events } else { &[] };
            self.processor.process(&mut self.buffer, events);
            first = false;

            let written = self.buffer.write_interleaved(chunk);
            chunk[written * channels..].fill(0.0);
        }
    }

    /// Renders into an integer output buffer one block at a time through the
    /// f32 scratch buffer, which holds exactly one block.
    fn render_converted<T>(&mut self, data: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        if self.scratch.is_empty() {
            data.fill(T::EQUILIBRIUM);
            return;
        }

        let mut scratch = std::mem::take(&mut self.scratch);
        for chunk in data.chunks_mut(scratch.len()) {
            let rendered = &mut scratch[..chunk.len()];
            self.render(rendered);
            for (dst, &src) in chunk.iter_mut().zip(rendered.iter()) {
                *dst = T::from_sample(src);
            }
        }
        self.scratch = scratch;
    }
}

impl Device {
    /// Lists cpal devices.
    pub fn list() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let output_configs = match device.supported_output_configs() {
                    Ok(output_configs) => output_configs,
                    Err(_) => continue,
                };

                let max_channels = output_configs
                    .map(|output_config| output_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    devices.push(Device {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                    })
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    /// Gets the given cpal device.
    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        match Device::list()?
            .into_iter()
            .find(|device| device.name.trim() == name)
        {
            Some(device) => Ok(device),
            None => Err(format!("no device found with name {}", name).into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_channels(&self) -> u16 {
        self.max_channels
    }

    /// Starts an output stream driven by `processor`. Playback continues for
    /// as long as the returned stream is alive.
    pub fn start(
        &self,
        processor: SamplerProcessor,
        notes: Receiver<NoteEventKind>,
        channels: u16,
        sample_rate: u32,
        block_size: usize,
    ) -> Result<cpal::Stream, Box<dyn Error>> {
        let span = span!(Level::INFO, "start stream (cpal)");
        let _enter = span.enter();

        if channels > self.max_channels {
            return Err(format!(
                "device {} supports {} channels, {} requested",
                self.name, self.max_channels, channels
            )
            .into());
        }

        let config = cpal::StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let mut renderer = StreamRenderer::new(processor, notes, channels, block_size);
        let sample_format = self.device.default_output_config()?.sample_format();
        let stream = match sample_format {
            cpal::SampleFormat::F32 => self.device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
                |err| error!("CPAL output stream error: {}", err),
                None,
            )?,
            cpal::SampleFormat::I16 => self.device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    renderer.render_converted(data)
                },
                |err| error!("CPAL output stream error: {}", err),
                None,
            )?,
            cpal::SampleFormat::I32 => self.device.build_output_stream(
                &config,
                move |data: &mut [i32], _: &cpal::OutputCallbackInfo| {
                    renderer.render_converted(data)
                },
                |err| error!("CPAL output stream error: {}", err),
                None,
            )?,
            other => return Err(format!("unsupported sample format {}", other).into()),
        };

        stream.play()?;
        info!(
            device = self.name,
            channels,
            sample_rate,
            format = ?sample_format,
            "CPAL output stream started."
        );
        Ok(stream)
    }
}

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
use std::error::Error;
use std::path::Path;
use std::thread;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use padsampler::{audio, config, midi, render, SamplerProcessor};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Live notes that can wait between audio callbacks.
const NOTE_QUEUE_SIZE: usize = 1024;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A polyphonic pad sampler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Verifies a sampler config and decodes every pad.
    Verify {
        /// The path to the sampler config.
        config_path: String,
    },
    /// Renders a MIDI file through the configured pads into a WAV file.
    Render {
        /// The path to the sampler config.
        config_path: String,
        /// The MIDI file to render.
        midi_path: String,
        /// The WAV file to write.
        output_path: String,
        /// Seconds rendered after the last MIDI event.
        #[arg(short, long, default_value_t = 2.0)]
        tail: f64,
    },
    /// Plays the configured pads live from a MIDI input.
    Play {
        /// The path to the sampler config.
        config_path: String,
        /// The audio device name to play through.
        device_name: String,
        /// The MIDI device name to listen to.
        midi_device_name: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::cpal::Device::list()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::midir::list()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Verify { config_path } => {
            let config = config::Sampler::deserialize(Path::new(&config_path))?;
            let max_length = config.engine().max_sample_length_secs();

            println!("Pads (count: {}):", config.pads().len());
            for pad in config.pads() {
                let sound = pad.build_sound(config.base_dir(), max_length)?;
                println!(
                    "- {} (id={}, root={}, {:.2}s, {} channel(s) at {}Hz)",
                    sound.name(),
                    sound.id(),
                    sound.root_note(),
                    sound.data().duration_secs(),
                    sound.data().channel_count(),
                    sound.source_sample_rate(),
                );
            }

            println!("\n{}", config.to_yaml()?);
        }
        Commands::Render {
            config_path,
            midi_path,
            output_path,
            tail,
        } => {
            let config = config::Sampler::deserialize(Path::new(&config_path))?;
            let frames = render::render_to_wav(
                &config,
                Path::new(&midi_path),
                Path::new(&output_path),
                tail,
            )?;
            println!(
                "Rendered {:.2}s to {}.",
                frames as f64 / config.engine().sample_rate() as f64,
                output_path
            );
        }
        Commands::Play {
            config_path,
            device_name,
            midi_device_name,
        } => {
            let config = config::Sampler::deserialize(Path::new(&config_path))?;
            let engine = config.engine();

            let (processor, mut handle) =
                SamplerProcessor::new(engine.voices(), engine.sample_rate() as f64);
            handle.set_max_sample_length(engine.max_sample_length_secs());
            config.load_pads(&mut handle)?;

            let device = audio::cpal::Device::get(&device_name)?;
            let midi_device = midi::midir::get(&midi_device_name)?;

            let (note_tx, note_rx) = crossbeam_channel::bounded(NOTE_QUEUE_SIZE);
            let _connection = midi_device.watch_events(note_tx)?;
            let _stream = device.start(
                processor,
                note_rx,
                engine.output_channels(),
                engine.sample_rate(),
                engine.block_size(),
            )?;

            loop {
                thread::sleep(Duration::from_millis(250));
                handle.collect_garbage();
                debug!(
                    position = ?handle.playback_position(),
                    voices = handle.active_voices(),
                    contended_blocks = handle.contended_blocks(),
                    "Playback status."
                );
            }
        }
    }

    Ok(())
}

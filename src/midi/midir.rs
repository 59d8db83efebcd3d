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

use crossbeam_channel::{Sender, TrySendError};
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use tracing::{debug, info, span, warn, Level};

use crate::sampler::NoteEventKind;

/// A MIDI input device known to midir.
pub struct Device {
    name: String,
    input_port: MidiInputPort,
}

impl Device {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Watches the device for note events and forwards them to `sender`.
    /// Events stop when the returned connection is dropped.
    pub fn watch_events(
        &self,
        sender: Sender<NoteEventKind>,
    ) -> Result<MidiInputConnection<()>, Box<dyn Error>> {
        let span = span!(Level::INFO, "watch events (midir)");
        let _enter = span.enter();

        info!(device = self.name, "Watching MIDI events.");

        let input = MidiInput::new("padsampler input")?;
        Ok(input.connect(
            &self.input_port,
            "padsampler input watcher",
            move |_, raw_event, _| {
                let Some(kind) = super::parse_live_event(raw_event) else {
                    return;
                };
                debug!(event = ?kind, "Received MIDI note.");
                match sender.try_send(kind) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("MIDI event queue full, dropping note.")
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            },
            (),
        )?)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Input)", self.name)
    }
}

/// Lists midir input devices, sorted by name.
pub fn list() -> Result<Vec<Device>, Box<dyn Error>> {
    let input = MidiInput::new("padsampler input listing")?;

    let mut devices = Vec::new();
    for port in input.ports() {
        let name = input.port_name(&port)?;
        if devices.iter().any(|device: &Device| device.name == name) {
            continue;
        }
        devices.push(Device {
            name,
            input_port: port,
        });
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Gets the one input device whose name contains `name`.
pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
    let mut matches = list()?
        .into_iter()
        .filter(|device| device.name.contains(name))
        .collect::<Vec<Device>>();

    if matches.is_empty() {
        return Err(format!("no device found with name {}", name).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many devices that match ({}), use a less ambiguous device name",
            matches
                .iter()
                .map(|device| device.name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        )
        .into());
    }

    Ok(matches.swap_remove(0))
}

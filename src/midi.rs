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
//! MIDI input through midir. Incoming messages are forwarded, optionally
//! filtered by channel, to a synthesizer's [`Receiver`].

use std::{error::Error, fmt};

use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use tracing::{debug, info, span, warn, Level};

use crate::{
    config,
    synth::{Receiver, ReceiverError},
};

/// A MIDI input port.
pub struct InputDevice {
    name: String,
    port: MidiInputPort,
}

impl InputDevice {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for InputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Input)", self.name)
    }
}

/// An open input. Dropping it closes the port.
pub struct Connection {
    name: String,
    _connection: MidiInputConnection<()>,
}

impl Connection {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MIDI input ({})", self.name)
    }
}

/// Lists the MIDI input ports known to midir.
pub fn list_devices() -> Result<Vec<InputDevice>, Box<dyn Error>> {
    let input = MidiInput::new("softsynth input listing")?;
    let mut devices = Vec::new();
    for port in input.ports() {
        devices.push(InputDevice {
            name: input.port_name(&port)?,
            port,
        });
    }
    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Finds the one input port whose name starts with the given prefix.
fn find_device(prefix: &str) -> Result<InputDevice, Box<dyn Error>> {
    let mut matches = list_devices()?
        .into_iter()
        .filter(|device| device.name.starts_with(prefix))
        .collect::<Vec<InputDevice>>();

    if matches.is_empty() {
        return Err(format!("no MIDI input found with name {}", prefix).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many MIDI inputs that match ({}), use a less ambiguous device name",
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

/// Returns true if a raw message should reach the synthesizer. Channel
/// messages for other channels are dropped when a filter is set.
fn accepts(raw: &[u8], channel: Option<u8>) -> bool {
    match (raw.first(), channel) {
        (Some(status), Some(channel)) if (0x80..0xF0).contains(status) => {
            status & 0x0f == channel
        }
        (Some(_), _) => true,
        (None, _) => false,
    }
}

/// Filters and forwards one raw message.
fn forward(raw: &[u8], channel: Option<u8>, receiver: &Receiver) -> Result<(), ReceiverError> {
    if !accepts(raw, channel) {
        return Ok(());
    }
    receiver.send(raw)
}

/// Connects the configured input port to the receiver.
pub fn connect(config: &config::Midi, receiver: Receiver) -> Result<Connection, Box<dyn Error>> {
    let span = span!(Level::INFO, "connect midi input");
    let _enter = span.enter();

    let device = find_device(config.device())?;
    let channel = config.channel();
    info!(
        device = device.name,
        channel = channel.map(|c| c + 1),
        "Listening for MIDI."
    );

    let input = MidiInput::new("softsynth input")?;
    let connection = input
        .connect(
            &device.port,
            "softsynth receiver",
            move |_, raw, _| match forward(raw, channel, &receiver) {
                Ok(()) => {}
                Err(ReceiverError::Disconnected) => {
                    debug!("Synthesizer closed, dropping MIDI input.")
                }
                Err(e) => warn!(err = %e, "Unable to forward MIDI message."),
            },
            (),
        )
        .map_err(|e| format!("unable to connect to {}: {}", device.name, e))?;

    Ok(Connection {
        name: device.name,
        _connection: connection,
    })
}

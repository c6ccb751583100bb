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
use crossbeam_channel::Sender;
use midly::{live::LiveEvent, MidiMessage};
use tracing::{trace, warn};

/// A channel message addressed to a zero based MIDI channel.
pub type MidiEvent = (u8, MidiMessage);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReceiverError {
    #[error("unable to parse MIDI message: {0}")]
    Parse(String),

    #[error("synthesizer is gone")]
    Disconnected,
}

/// Queues MIDI for a synthesizer. Clones share the same queue, and any thread
/// may send.
#[derive(Clone, Debug)]
pub struct Receiver {
    events: Sender<MidiEvent>,
}

impl Receiver {
    pub(crate) fn new(events: Sender<MidiEvent>) -> Self {
        Receiver { events }
    }

    /// Parses one raw MIDI message and queues it. System messages are ignored.
    pub fn send(&self, raw: &[u8]) -> Result<(), ReceiverError> {
        let event = LiveEvent::parse(raw).map_err(|e| {
            warn!(err = %e, bytes = ?raw, "Dropping unparseable MIDI message");
            ReceiverError::Parse(e.to_string())
        })?;
        match event {
            LiveEvent::Midi { channel, message } => self.send_message(channel.as_int(), message),
            _ => {
                trace!(bytes = ?raw, "Ignoring system MIDI message");
                Ok(())
            }
        }
    }

    /// Queues an already parsed channel message.
    pub fn send_message(&self, channel: u8, message: MidiMessage) -> Result<(), ReceiverError> {
        self.events
            .send((channel & 0x0f, message))
            .map_err(|_| ReceiverError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use midly::num::u7;

    use super::*;

    #[test]
    fn test_parse_and_queue() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let receiver = Receiver::new(tx);

        receiver.send(&[0x93, 60, 100]).unwrap();
        receiver.send(&[0xB0, 7, 90]).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            (
                3,
                MidiMessage::NoteOn {
                    key: u7::new(60),
                    vel: u7::new(100)
                }
            )
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            (
                0,
                MidiMessage::Controller {
                    controller: u7::new(7),
                    value: u7::new(90)
                }
            )
        );
    }

    #[test]
    fn test_bad_and_system_messages() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let receiver = Receiver::new(tx);

        assert!(matches!(receiver.send(&[]), Err(ReceiverError::Parse(_))));
        // A data byte with no status byte.
        assert!(matches!(receiver.send(&[0x3C, 0]), Err(ReceiverError::Parse(_))));
        // Timing clock.
        receiver.send(&[0xF8]).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disconnected() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let receiver = Receiver::new(tx);
        drop(rx);
        assert_eq!(
            receiver.send(&[0x80, 60, 0]),
            Err(ReceiverError::Disconnected)
        );
    }
}

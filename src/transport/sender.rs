//! Note and CC senders
//!
//! Sibling capability of the clock decoder: writes channel messages to every
//! known output. Not used by the decoder itself.

use tracing::{debug, warn};

use super::{EndpointId, MidiTransport};
use crate::midi::{note_number, MidiMessage, CHANNEL_COUNT};

/// Which channel(s) a message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelTarget {
    /// A single channel, 0-15
    Channel(u8),
    /// The same message on all 16 channels
    All,
}

impl ChannelTarget {
    /// Resolve an optional explicit channel against an optional default.
    /// `None` when the channel is outside 0-15.
    pub fn resolve(channel: Option<u8>, default: Option<u8>) -> Option<Self> {
        match channel.or(default) {
            Some(ch) if ch < CHANNEL_COUNT => Some(ChannelTarget::Channel(ch)),
            Some(_) => None,
            None => Some(ChannelTarget::All),
        }
    }

    fn channels(self) -> std::ops::Range<u8> {
        match self {
            ChannelTarget::Channel(ch) => ch..ch + 1,
            ChannelTarget::All => 0..CHANNEL_COUNT,
        }
    }
}

/// Broadcasts channel messages to a set of outputs
pub struct MidiSender<'a> {
    transport: &'a mut dyn MidiTransport,
    outputs: Vec<EndpointId>,
    default_channel: Option<u8>,
}

impl<'a> MidiSender<'a> {
    pub fn new(
        transport: &'a mut dyn MidiTransport,
        outputs: Vec<EndpointId>,
        default_channel: Option<u8>,
    ) -> Self {
        Self {
            transport,
            outputs,
            default_channel,
        }
    }

    /// Send a control change. Returns the number of messages delivered.
    pub fn cc(&mut self, code: u8, value: Option<u8>, channel: Option<u8>) -> usize {
        let value = value.unwrap_or(127);
        let Some(target) = self.target(channel) else {
            return 0;
        };
        self.broadcast(target, |channel| MidiMessage::ControlChange {
            channel,
            cc: code,
            value,
        })
    }

    /// Send a note on. `volume` is 0.0-1.0 and maps to velocity floor(volume * 127).
    pub fn note_on(
        &mut self,
        note: &str,
        octave: Option<i8>,
        volume: Option<f32>,
        channel: Option<u8>,
    ) -> usize {
        let Some(number) = note_number(note, octave.unwrap_or(4)) else {
            warn!("Unknown note '{}' in octave {:?}", note, octave);
            return 0;
        };
        let velocity = (volume.unwrap_or(1.0).clamp(0.0, 1.0) * 127.0).floor() as u8;
        let Some(target) = self.target(channel) else {
            return 0;
        };
        self.broadcast(target, |channel| MidiMessage::NoteOn {
            channel,
            note: number,
            velocity,
        })
    }

    /// Send a note off
    pub fn note_off(&mut self, note: &str, octave: Option<i8>, channel: Option<u8>) -> usize {
        let Some(number) = note_number(note, octave.unwrap_or(4)) else {
            warn!("Unknown note '{}' in octave {:?}", note, octave);
            return 0;
        };
        let Some(target) = self.target(channel) else {
            return 0;
        };
        self.broadcast(target, |channel| MidiMessage::NoteOff {
            channel,
            note: number,
            velocity: 0,
        })
    }

    fn target(&self, channel: Option<u8>) -> Option<ChannelTarget> {
        let target = ChannelTarget::resolve(channel, self.default_channel);
        if target.is_none() {
            warn!("Invalid MIDI channel {:?}, nothing sent", channel.or(self.default_channel));
        }
        target
    }

    fn broadcast(&mut self, target: ChannelTarget, build: impl Fn(u8) -> MidiMessage) -> usize {
        let mut delivered = 0;
        for channel in target.channels() {
            let bytes = build(channel).encode();
            for output in &self.outputs {
                match self.transport.send(output, &bytes) {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!("{}", e),
                }
            }
        }
        debug!("Broadcast {:?} reached {} message(s)", target, delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBus;
    use crate::transport::{AccessRequest, Direction, MidiAccess};

    fn transport(bus: &MemoryBus) -> Box<dyn MidiTransport> {
        match bus.access().poll_request() {
            AccessRequest::Granted(t) => t,
            other => panic!("unexpected request outcome: {:?}", other),
        }
    }

    #[test]
    fn test_cc_on_single_channel() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Output, "synth");
        let mut t = transport(&bus);
        let mut sender = MidiSender::new(t.as_mut(), vec![EndpointId::new("synth")], None);

        assert_eq!(sender.cc(74, None, Some(2)), 1);

        let sent = bus.take_sent();
        assert_eq!(sent, vec![(EndpointId::new("synth"), vec![0xB2, 74, 127])]);
    }

    #[test]
    fn test_cc_without_channel_broadcasts_to_all_channels() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Output, "a");
        bus.plug(Direction::Output, "b");
        let mut t = transport(&bus);
        let outputs = vec![EndpointId::new("a"), EndpointId::new("b")];
        let mut sender = MidiSender::new(t.as_mut(), outputs, None);

        assert_eq!(sender.cc(1, Some(64), None), 32);

        let sent = bus.take_sent();
        let statuses: Vec<u8> = sent.iter().step_by(2).map(|(_, b)| b[0]).collect();
        assert_eq!(statuses, (0xB0..=0xBF).collect::<Vec<u8>>());
    }

    #[test]
    fn test_default_channel_applies() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Output, "synth");
        let mut t = transport(&bus);
        let mut sender = MidiSender::new(t.as_mut(), vec![EndpointId::new("synth")], Some(9));

        sender.note_on("C", None, Some(0.5), None);
        sender.note_off("C", None, None);

        let sent: Vec<Vec<u8>> = bus.take_sent().into_iter().map(|(_, b)| b).collect();
        assert_eq!(sent, vec![vec![0x99, 60, 63], vec![0x89, 60, 0]]);
    }

    #[test]
    fn test_unknown_note_sends_nothing() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Output, "synth");
        let mut t = transport(&bus);
        let mut sender = MidiSender::new(t.as_mut(), vec![EndpointId::new("synth")], None);

        assert_eq!(sender.note_on("X", None, None, Some(0)), 0);
        assert!(bus.take_sent().is_empty());
    }

    #[test]
    fn test_out_of_range_channel_sends_nothing() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Output, "synth");
        let mut t = transport(&bus);
        let mut sender = MidiSender::new(t.as_mut(), vec![EndpointId::new("synth")], None);

        assert_eq!(sender.cc(7, None, Some(16)), 0);
        assert_eq!(sender.note_on("C", None, None, Some(17)), 0);
        assert_eq!(sender.note_off("C", None, Some(255)), 0);
        assert!(bus.take_sent().is_empty());

        assert_eq!(ChannelTarget::resolve(None, Some(16)), None);
        assert_eq!(ChannelTarget::resolve(Some(15), Some(16)), Some(ChannelTarget::Channel(15)));
        assert_eq!(ChannelTarget::resolve(None, None), Some(ChannelTarget::All));
    }
}

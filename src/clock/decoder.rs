//! Clock message decoding
//!
//! | status | action |
//! |---|---|
//! | `0xF2` Song Position Pointer | reset pulse count, set position to `(msb << 7) \| lsb` |
//! | `0xF8` Timing Clock | count a pulse; every 6th pulse advances the position by one |
//! | `0xFA`/`0xFB`/`0xFC` | record transport state only |
//! | anything else | ignored |

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, trace};

use super::{ClockEvent, SongClock, TransportState, PULSES_PER_SIXTEENTH};
use crate::midi::MidiMessage;
use crate::transport::{EndpointId, MidiTransport, TransportError};

/// Observer called for every message an attached input delivers
pub type EventObserver = Arc<dyn Fn(&EndpointId, &[u8], Option<ClockEvent>) + Send + Sync>;

/// Decoding state of a single input.
///
/// Each input keeps its own pulse counter; the song position is shared. With
/// two clock sources connected their pulses interleave on the shared counter.
pub struct InputDecoder {
    port: EndpointId,
    pulses: u64,
    clock: SongClock,
}

impl InputDecoder {
    pub fn new(port: EndpointId, clock: SongClock) -> Self {
        Self {
            port,
            pulses: 0,
            clock,
        }
    }

    /// Pulses counted since the last position set
    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    /// Decode one raw message. Returns `None` for anything that does not
    /// concern the clock, including malformed messages.
    pub fn handle(&mut self, data: &[u8]) -> Option<ClockEvent> {
        match MidiMessage::parse(data)? {
            MidiMessage::SongPosition { position } => {
                self.pulses = 0;
                let position = position as u32;
                self.clock.set_position(position);
                debug!("'{}' song position set to {}", self.port, position);
                Some(ClockEvent::PositionSet(position))
            }
            MidiMessage::TimingClock => {
                self.pulses += 1;
                if self.pulses % PULSES_PER_SIXTEENTH == 0 {
                    let position = self.clock.advance();
                    trace!("'{}' sixteenth -> {}", self.port, position);
                    Some(ClockEvent::Sixteenth(position))
                } else {
                    Some(ClockEvent::Pulse)
                }
            }
            MidiMessage::Start => Some(self.transport(TransportState::Started)),
            MidiMessage::Continue => Some(self.transport(TransportState::Continued)),
            MidiMessage::Stop => Some(self.transport(TransportState::Stopped)),
            _ => None,
        }
    }

    fn transport(&mut self, state: TransportState) -> ClockEvent {
        // Stop/Continue leave the pulse counter alone; only a position set resets it
        self.clock.set_transport(state);
        debug!("'{}' transport {:?}", self.port, state);
        ClockEvent::Transport(state)
    }
}

/// Attaches exactly one [`InputDecoder`] per input endpoint
pub struct ClockDecoder {
    clock: SongClock,
    attached: HashSet<EndpointId>,
    observer: Option<EventObserver>,
}

impl ClockDecoder {
    pub fn new(clock: SongClock) -> Self {
        Self {
            clock,
            attached: HashSet::new(),
            observer: None,
        }
    }

    /// Report every delivered message to `observer` (used by the monitor)
    pub fn with_observer(mut self, observer: EventObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn clock(&self) -> &SongClock {
        &self.clock
    }

    pub fn is_attached(&self, id: &EndpointId) -> bool {
        self.attached.contains(id)
    }

    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// Attach a decoder to `id`. Returns `Ok(false)` if one is already attached.
    pub fn attach(
        &mut self,
        transport: &mut dyn MidiTransport,
        id: &EndpointId,
    ) -> Result<bool, TransportError> {
        if self.attached.contains(id) {
            return Ok(false);
        }

        let mut decoder = InputDecoder::new(id.clone(), self.clock.clone());
        let observer = self.observer.clone();
        let port = id.clone();

        transport.connect_input(
            id,
            Box::new(move |bytes| {
                let event = decoder.handle(bytes);
                if let Some(observer) = &observer {
                    observer(&port, bytes, event);
                }
            }),
        )?;

        self.attached.insert(id.clone());
        info!("🎹 Clock decoder attached to '{}'", id);
        Ok(true)
    }

    /// Detach the decoder from `id`, if any
    pub fn detach(&mut self, transport: &mut dyn MidiTransport, id: &EndpointId) {
        if self.attached.remove(id) {
            transport.disconnect_input(id);
            info!("Clock decoder detached from '{}'", id);
        }
    }

    /// Forget every attachment without touching a transport (it is gone)
    pub fn clear(&mut self) {
        self.attached.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decoder() -> (InputDecoder, SongClock) {
        let clock = SongClock::new();
        (InputDecoder::new(EndpointId::new("test"), clock.clone()), clock)
    }

    #[test]
    fn test_24_pulses_advance_four_sixteenths() {
        let (mut decoder, clock) = decoder();
        for _ in 0..24 {
            decoder.handle(&[0xF8]);
        }
        assert_eq!(clock.position(), 4);
    }

    #[test]
    fn test_sixth_pulse_reports_sixteenth() {
        let (mut decoder, _) = decoder();
        for _ in 0..5 {
            assert_eq!(decoder.handle(&[0xF8]), Some(ClockEvent::Pulse));
        }
        assert_eq!(decoder.handle(&[0xF8]), Some(ClockEvent::Sixteenth(1)));
    }

    #[test]
    fn test_position_pointer_decodes_14bit_value() {
        let (mut decoder, clock) = decoder();
        assert_eq!(
            decoder.handle(&[0xF2, 0x10, 0x02]),
            Some(ClockEvent::PositionSet(272))
        );
        assert_eq!(clock.position(), 272);
    }

    #[test]
    fn test_position_pointer_resets_pulse_count() {
        let (mut decoder, clock) = decoder();
        for _ in 0..5 {
            decoder.handle(&[0xF8]);
        }
        decoder.handle(&[0xF2, 0x08, 0x00]);
        assert_eq!(decoder.pulses(), 0);

        // Five more pulses would have completed a sixteenth without the reset
        for _ in 0..5 {
            decoder.handle(&[0xF8]);
        }
        assert_eq!(clock.position(), 8);
        decoder.handle(&[0xF8]);
        assert_eq!(clock.position(), 9);
    }

    #[test]
    fn test_transport_messages_do_not_move_position() {
        let (mut decoder, clock) = decoder();
        decoder.handle(&[0xF2, 0x04, 0x00]);
        for _ in 0..3 {
            decoder.handle(&[0xF8]);
        }

        decoder.handle(&[0xFC]);
        assert_eq!(clock.snapshot().transport, TransportState::Stopped);
        decoder.handle(&[0xFB]);
        assert_eq!(clock.snapshot().transport, TransportState::Continued);

        assert_eq!(clock.position(), 4);
        assert_eq!(decoder.pulses(), 3);
    }

    #[test]
    fn test_unknown_and_malformed_messages_are_ignored() {
        let (mut decoder, clock) = decoder();
        assert_eq!(decoder.handle(&[0x90, 60, 100]), None);
        assert_eq!(decoder.handle(&[0xF2, 0x10]), None);
        assert_eq!(decoder.handle(&[0xF9]), None);
        assert_eq!(decoder.handle(&[]), None);
        assert_eq!(clock.position(), 0);
    }

    #[test]
    fn test_independent_pulse_counters_share_position() {
        let clock = SongClock::new();
        let mut a = InputDecoder::new(EndpointId::new("a"), clock.clone());
        let mut b = InputDecoder::new(EndpointId::new("b"), clock.clone());

        for _ in 0..3 {
            a.handle(&[0xF8]);
            b.handle(&[0xF8]);
        }
        assert_eq!(clock.position(), 0);

        for _ in 0..3 {
            a.handle(&[0xF8]);
        }
        assert_eq!(clock.position(), 1);
        assert_eq!(b.pulses(), 3);
    }

    proptest! {
        #[test]
        fn prop_pulses_advance_by_floor_div_six(start in 0u16..16384, n in 0usize..2000) {
            let (mut decoder, clock) = decoder();
            let (lsb, msb) = crate::midi::split_14bit(start);
            decoder.handle(&[0xF2, lsb, msb]);
            for _ in 0..n {
                decoder.handle(&[0xF8]);
            }
            prop_assert_eq!(clock.position(), start as u32 + (n / 6) as u32);
        }

        #[test]
        fn prop_position_pointer_sets_exact_value(lsb in 0u8..128, msb in 0u8..128, prior in 0usize..12) {
            let (mut decoder, clock) = decoder();
            for _ in 0..prior {
                decoder.handle(&[0xF8]);
            }
            decoder.handle(&[0xF2, lsb, msb]);
            prop_assert_eq!(clock.position(), ((msb as u32) << 7) | lsb as u32);
            prop_assert_eq!(decoder.pulses(), 0);
        }
    }
}

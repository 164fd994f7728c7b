//! In-process clock source
//!
//! Plays the part of an external sequencer on a [`MemoryBus`]: one input port
//! carrying Start, a position reset and timing pulses at a fixed tempo, plus
//! one output port that swallows whatever the sender writes.

use std::time::Duration;

use tracing::{info, trace};

use crate::midi::{self, MidiMessage};
use crate::transport::memory::MemoryBus;
use crate::transport::{Direction, MemoryAccess};

/// Pulses per quarter note
pub const PULSES_PER_QUARTER: f64 = 24.0;

pub const SIM_INPUT: &str = "beatcam sim clock";
pub const SIM_OUTPUT: &str = "beatcam sim out";

/// Interval between timing pulses at `bpm`
pub fn pulse_interval(bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / (bpm * PULSES_PER_QUARTER))
}

pub struct SimulatedClock {
    bus: MemoryBus,
    bpm: f64,
    started: bool,
    pulses: u64,
}

impl SimulatedClock {
    pub fn new(bpm: f64) -> Self {
        let bus = MemoryBus::new();
        bus.plug(Direction::Input, SIM_INPUT);
        bus.plug(Direction::Output, SIM_OUTPUT);
        Self {
            bus,
            bpm,
            started: false,
            pulses: 0,
        }
    }

    /// Access handle for a clock session
    pub fn access(&self) -> MemoryAccess {
        self.bus.access()
    }

    pub fn bus(&self) -> &MemoryBus {
        &self.bus
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn interval(&self) -> Duration {
        pulse_interval(self.bpm)
    }

    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    /// Emit one pulse. Until a decoder is attached nothing is delivered and
    /// the transport start is held back.
    pub fn tick(&mut self) {
        if !self.bus.is_attached(SIM_INPUT) {
            self.started = false;
            return;
        }

        if !self.started {
            self.started = true;
            self.bus.inject(SIM_INPUT, &MidiMessage::Start.encode());
            self.bus
                .inject(SIM_INPUT, &MidiMessage::SongPosition { position: 0 }.encode());
            info!("▶️  Simulated clock started at {} BPM", self.bpm);
        }

        self.bus.inject(SIM_INPUT, &[midi::TIMING_CLOCK]);
        self.pulses += 1;

        for (port, bytes) in self.bus.take_sent() {
            trace!("sim out '{}': {}", port, midi::format_hex(&bytes));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockSession, SessionOptions, TransportState};
    use std::time::Instant;

    #[test]
    fn test_pulse_interval() {
        // 120 BPM: 48 pulses per second
        let interval = pulse_interval(120.0);
        assert!((interval.as_secs_f64() - 1.0 / 48.0).abs() < 1e-9);
    }

    #[test]
    fn test_drives_a_session() {
        let mut sim = SimulatedClock::new(120.0);
        let mut session = ClockSession::new(Box::new(sim.access()), SessionOptions::default());

        // Not attached yet: nothing happens
        sim.tick();
        assert_eq!(sim.pulses(), 0);

        let now = Instant::now();
        session.start(now);
        session.tick(now);
        assert!(session.is_active());

        for _ in 0..48 {
            sim.tick();
        }
        let snapshot = session.snapshot();
        assert_eq!(snapshot.position, 8);
        assert_eq!(snapshot.transport, TransportState::Started);
    }
}

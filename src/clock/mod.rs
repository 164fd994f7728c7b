//! External MIDI clock
//!
//! Turns the timing messages of one or more inputs into a quantized song
//! position counted in sixteenth notes.
//!
//! - [`SongClock`]: the shared position counter and transport state
//! - [`decoder`]: per-input message decoding and handler attachment
//! - [`registry`]: endpoint discovery, hot-plug diffing and poll cadence
//! - [`permission`]: permission polling policy
//! - [`session`]: the poll-driven state machine tying it all together

pub mod decoder;
pub mod permission;
pub mod registry;
pub mod session;


use std::sync::Arc;

use parking_lot::Mutex;

pub use decoder::{ClockDecoder, InputDecoder};
pub use permission::{PermissionAction, PermissionPoller};
pub use registry::{DeviceRegistry, PollCadence, RegistryChanges};
pub use session::{AccessStatus, ClockSession, SessionOptions};

/// Timing clock pulses per sixteenth note (24 per quarter note)
pub const PULSES_PER_SIXTEENTH: u64 = 6;

/// Transport running state reported by Start/Continue/Stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No transport message seen yet
    #[default]
    Unknown,
    Started,
    Continued,
    Stopped,
}

/// Observable outcome of decoding one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Absolute position set by a Song Position Pointer
    PositionSet(u32),
    /// Six pulses elapsed; carries the new position
    Sixteenth(u32),
    /// A pulse that did not complete a sixteenth
    Pulse,
    Transport(TransportState),
}

/// Point-in-time view of the clock, taken once per render tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockSnapshot {
    /// Song position in sixteenth notes
    pub position: u32,
    pub transport: TransportState,
}

#[derive(Debug, Default)]
struct ClockState {
    position: u32,
    transport: TransportState,
}

/// Shared song position.
///
/// Input callbacks run on transport threads, so every mutation happens under
/// one lock and a reader never sees a half-applied message.
#[derive(Debug, Clone, Default)]
pub struct SongClock {
    state: Arc<Mutex<ClockState>>,
}

impl SongClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        let state = self.state.lock();
        ClockSnapshot {
            position: state.position,
            transport: state.transport,
        }
    }

    pub fn position(&self) -> u32 {
        self.state.lock().position
    }

    pub(crate) fn set_position(&self, position: u32) {
        self.state.lock().position = position;
    }

    /// Advance by one sixteenth and return the new position
    pub(crate) fn advance(&self) -> u32 {
        let mut state = self.state.lock();
        state.position = state.position.wrapping_add(1);
        state.position
    }

    pub(crate) fn set_transport(&self, transport: TransportState) {
        self.state.lock().transport = transport;
    }
}

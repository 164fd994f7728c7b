//! Endpoint registry
//!
//! Keeps the set of visible inputs and outputs in step with the transport by
//! polling. There is no device-change event to rely on, so the poll cadence
//! carries the hot-plug latency: fast while a direction is still empty,
//! relaxed once both directions have a device.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::info;

use crate::transport::{EndpointId, MidiTransport};

/// Poll interval while a direction has no device yet
pub const FAST_POLL: Duration = Duration::from_millis(250);
/// Poll interval once both directions have a device
pub const RELAXED_POLL: Duration = Duration::from_millis(1000);

/// Device poll cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollCadence {
    /// No transport: nothing to poll
    Disabled,
    Fast,
    Relaxed,
}

impl PollCadence {
    pub fn interval(self) -> Option<Duration> {
        match self {
            PollCadence::Disabled => None,
            PollCadence::Fast => Some(FAST_POLL),
            PollCadence::Relaxed => Some(RELAXED_POLL),
        }
    }
}

/// Difference between two consecutive polls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryChanges {
    pub added_inputs: Vec<EndpointId>,
    pub removed_inputs: Vec<EndpointId>,
    pub added_outputs: Vec<EndpointId>,
    pub removed_outputs: Vec<EndpointId>,
}

impl RegistryChanges {
    pub fn is_empty(&self) -> bool {
        self.added_inputs.is_empty()
            && self.removed_inputs.is_empty()
            && self.added_outputs.is_empty()
            && self.removed_outputs.is_empty()
    }
}

/// Live set of known endpoints
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inputs: BTreeSet<EndpointId>,
    outputs: BTreeSet<EndpointId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inputs(&self) -> impl Iterator<Item = &EndpointId> {
        self.inputs.iter()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &EndpointId> {
        self.outputs.iter()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Query the transport and replace the stored sets.
    ///
    /// Polling an unchanged transport returns an empty change set and leaves
    /// the registry as it was.
    pub fn poll(&mut self, transport: &dyn MidiTransport) -> RegistryChanges {
        let inputs: BTreeSet<EndpointId> = transport.inputs().into_iter().map(|e| e.id).collect();
        let outputs: BTreeSet<EndpointId> =
            transport.outputs().into_iter().map(|e| e.id).collect();

        let changes = RegistryChanges {
            added_inputs: inputs.difference(&self.inputs).cloned().collect(),
            removed_inputs: self.inputs.difference(&inputs).cloned().collect(),
            added_outputs: outputs.difference(&self.outputs).cloned().collect(),
            removed_outputs: self.outputs.difference(&outputs).cloned().collect(),
        };

        for id in &changes.added_inputs {
            info!("➕ MIDI input available: '{}'", id);
        }
        for id in &changes.removed_inputs {
            info!("➖ MIDI input gone: '{}'", id);
        }
        for id in &changes.added_outputs {
            info!("➕ MIDI output available: '{}'", id);
        }
        for id in &changes.removed_outputs {
            info!("➖ MIDI output gone: '{}'", id);
        }

        self.inputs = inputs;
        self.outputs = outputs;
        changes
    }

    /// Cadence for the next device poll
    pub fn cadence(&self, has_transport: bool) -> PollCadence {
        if !has_transport {
            PollCadence::Disabled
        } else if self.inputs.is_empty() || self.outputs.is_empty() {
            PollCadence::Fast
        } else {
            PollCadence::Relaxed
        }
    }

    /// A transport exists and at least one endpoint of either direction is known
    pub fn is_active(&self, has_transport: bool) -> bool {
        has_transport && !(self.inputs.is_empty() && self.outputs.is_empty())
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
    }
}

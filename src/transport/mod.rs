//! Control-protocol transport seam
//!
//! [`MidiAccess`] models everything that happens before a transport handle
//! exists (permission state, the one-shot acquisition request). [`MidiTransport`]
//! is the acquired handle: endpoint enumeration, per-input message delivery and
//! raw output.
//!
//! Two implementations ship with the crate:
//! - [`midir_backend`] talks to real hardware through `midir`
//! - [`memory`] is an in-process bus used by tests and the simulated clock

pub mod memory;
pub mod midir_backend;
mod sender;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{MemoryAccess, MemoryBus};
pub use midir_backend::{MidirAccess, MidirTransport};
pub use sender::{ChannelTarget, MidiSender};

/// Opaque endpoint identifier assigned by the transport.
///
/// Stays the same for as long as the device is connected, whatever else is
/// plugged or unplugged. Two devices with the same port name get different ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Endpoint direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// A visible input or output endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub id: EndpointId,
    /// Human readable port name
    pub name: String,
}

/// Permission required to use the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Pending user decision
    Prompt,
}

/// Outcome of polling the one-shot transport acquisition request
pub enum AccessRequest {
    Pending,
    Granted(Box<dyn MidiTransport>),
    Failed(String),
}

impl fmt::Debug for AccessRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessRequest::Pending => write!(f, "Pending"),
            AccessRequest::Granted(_) => write!(f, "Granted(..)"),
            AccessRequest::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

/// Callback receiving one raw message (status byte first) from an input
pub type MessageHandler = Box<dyn FnMut(&[u8]) + Send + 'static>;

/// Transport-level failures. None of these are fatal for the application:
/// without a transport the clock is simply inactive.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to initialise MIDI client: {0}")]
    Init(String),

    #[error("{direction:?} port '{id}' not found")]
    PortNotFound { direction: Direction, id: EndpointId },

    #[error("failed to connect to port '{id}': {reason}")]
    Connect { id: EndpointId, reason: String },

    #[error("failed to send to port '{id}': {reason}")]
    Send { id: EndpointId, reason: String },
}

/// Pre-acquisition capability: permission query and the acquisition request
pub trait MidiAccess {
    /// Current permission state. Polled while no transport has been obtained.
    fn query_permission(&mut self) -> PermissionState;

    /// Poll the acquisition request. Once this returns `Granted` or `Failed`
    /// it is not polled again.
    fn poll_request(&mut self) -> AccessRequest;
}

/// An acquired control-protocol transport
pub trait MidiTransport {
    /// Currently visible inputs
    fn inputs(&self) -> Vec<Endpoint>;

    /// Currently visible outputs
    fn outputs(&self) -> Vec<Endpoint>;

    /// Deliver every message received on `id` to `handler`
    fn connect_input(&mut self, id: &EndpointId, handler: MessageHandler)
        -> Result<(), TransportError>;

    /// Stop delivering messages from `id`. Unknown ids are ignored.
    fn disconnect_input(&mut self, id: &EndpointId);

    /// Release any connection held for sending to `id`. Unknown ids are ignored.
    fn disconnect_output(&mut self, id: &EndpointId);

    /// Send raw bytes to an output
    fn send(&mut self, id: &EndpointId, bytes: &[u8]) -> Result<(), TransportError>;
}

//! In-process transport
//!
//! A [`MemoryBus`] is a scriptable stand-in for the system MIDI stack: ports can
//! be plugged and unplugged, permission and the acquisition outcome can be set,
//! messages can be injected into inputs and everything sent to outputs is
//! captured. It backs the session tests and the simulated clock source.
//!
//! Output connections behave like hardware ones: the first send opens one,
//! and a connection that outlives its port silently swallows whatever is
//! sent until the transport releases it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::{
    AccessRequest, Direction, Endpoint, EndpointId, MessageHandler, MidiAccess, MidiTransport,
    PermissionState, TransportError,
};

/// Scripted outcome of the acquisition request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Pending,
    Grant,
    Fail(String),
}

struct BusState {
    permission: PermissionState,
    request: RequestOutcome,
    permission_queries: usize,
    inputs: Vec<Endpoint>,
    outputs: Vec<Endpoint>,
    handlers: HashMap<EndpointId, MessageHandler>,
    connect_count: usize,
    /// Open output connections; `false` once the port went away underneath
    open_outputs: HashMap<EndpointId, bool>,
    output_opens: usize,
    sent: Vec<(EndpointId, Vec<u8>)>,
}

/// Shared handle to an in-process MIDI bus
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    /// New bus with permission granted and an immediately granted request
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                permission: PermissionState::Granted,
                request: RequestOutcome::Grant,
                permission_queries: 0,
                inputs: Vec::new(),
                outputs: Vec::new(),
                handlers: HashMap::new(),
                connect_count: 0,
                open_outputs: HashMap::new(),
                output_opens: 0,
                sent: Vec::new(),
            })),
        }
    }

    /// Access capability bound to this bus
    pub fn access(&self) -> MemoryAccess {
        MemoryAccess {
            bus: self.clone(),
            resolved: false,
        }
    }

    pub fn set_permission(&self, permission: PermissionState) {
        self.state.lock().permission = permission;
    }

    pub fn set_request_outcome(&self, outcome: RequestOutcome) {
        self.state.lock().request = outcome;
    }

    /// Number of permission queries answered so far
    pub fn permission_queries(&self) -> usize {
        self.state.lock().permission_queries
    }

    /// Make a port visible, named after its id
    pub fn plug(&self, direction: Direction, id: &str) {
        self.plug_named(direction, id, id);
    }

    /// Make a port visible under a display name that may be shared with others
    pub fn plug_named(&self, direction: Direction, id: &str, name: &str) {
        let endpoint = Endpoint {
            id: EndpointId::new(id),
            name: name.to_string(),
        };
        let mut state = self.state.lock();
        let list = match direction {
            Direction::Input => &mut state.inputs,
            Direction::Output => &mut state.outputs,
        };
        if !list.iter().any(|e| e.id == endpoint.id) {
            list.push(endpoint);
        }
    }

    /// Remove a port; an attached input handler is dropped with it
    pub fn unplug(&self, direction: Direction, id: &str) {
        let id = EndpointId::new(id);
        let mut state = self.state.lock();
        match direction {
            Direction::Input => {
                state.inputs.retain(|e| e.id != id);
                state.handlers.remove(&id);
            }
            Direction::Output => {
                state.outputs.retain(|e| e.id != id);
                if let Some(live) = state.open_outputs.get_mut(&id) {
                    *live = false;
                }
            }
        }
    }

    /// Deliver a message on an input. Returns false when nothing is attached.
    pub fn inject(&self, id: &str, bytes: &[u8]) -> bool {
        let mut state = self.state.lock();
        match state.handlers.get_mut(&EndpointId::new(id)) {
            Some(handler) => {
                trace!("memory bus: {} bytes on '{}'", bytes.len(), id);
                handler(bytes);
                true
            }
            None => false,
        }
    }

    /// True if a handler is attached to `id`
    pub fn is_attached(&self, id: &str) -> bool {
        self.state.lock().handlers.contains_key(&EndpointId::new(id))
    }

    /// Total successful `connect_input` calls
    pub fn connect_count(&self) -> usize {
        self.state.lock().connect_count
    }

    /// True while the transport holds a connection to output `id`
    pub fn is_output_open(&self, id: &str) -> bool {
        self.state.lock().open_outputs.contains_key(&EndpointId::new(id))
    }

    /// Total output connections opened
    pub fn output_open_count(&self) -> usize {
        self.state.lock().output_opens
    }

    /// Drain everything sent to outputs so far
    pub fn take_sent(&self) -> Vec<(EndpointId, Vec<u8>)> {
        std::mem::take(&mut self.state.lock().sent)
    }
}

/// [`MidiAccess`] over a [`MemoryBus`]
pub struct MemoryAccess {
    bus: MemoryBus,
    resolved: bool,
}

impl MidiAccess for MemoryAccess {
    fn query_permission(&mut self) -> PermissionState {
        let mut state = self.bus.state.lock();
        state.permission_queries += 1;
        state.permission
    }

    fn poll_request(&mut self) -> AccessRequest {
        if self.resolved {
            return AccessRequest::Failed("MIDI access already requested".to_string());
        }

        let outcome = self.bus.state.lock().request.clone();
        match outcome {
            RequestOutcome::Pending => AccessRequest::Pending,
            RequestOutcome::Grant => {
                self.resolved = true;
                AccessRequest::Granted(Box::new(MemoryTransport {
                    bus: self.bus.clone(),
                }))
            }
            RequestOutcome::Fail(reason) => {
                self.resolved = true;
                AccessRequest::Failed(reason)
            }
        }
    }
}

/// [`MidiTransport`] over a [`MemoryBus`]
pub struct MemoryTransport {
    bus: MemoryBus,
}

impl MidiTransport for MemoryTransport {
    fn inputs(&self) -> Vec<Endpoint> {
        self.bus.state.lock().inputs.clone()
    }

    fn outputs(&self) -> Vec<Endpoint> {
        self.bus.state.lock().outputs.clone()
    }

    fn connect_input(
        &mut self,
        id: &EndpointId,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        let mut state = self.bus.state.lock();
        if !state.inputs.iter().any(|e| &e.id == id) {
            return Err(TransportError::PortNotFound {
                direction: Direction::Input,
                id: id.clone(),
            });
        }
        state.handlers.insert(id.clone(), handler);
        state.connect_count += 1;
        Ok(())
    }

    fn disconnect_input(&mut self, id: &EndpointId) {
        self.bus.state.lock().handlers.remove(id);
    }

    fn disconnect_output(&mut self, id: &EndpointId) {
        self.bus.state.lock().open_outputs.remove(id);
    }

    fn send(&mut self, id: &EndpointId, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.bus.state.lock();
        match state.open_outputs.get(id).copied() {
            Some(true) => {}
            Some(false) => {
                trace!("memory bus: {} bytes lost on stale connection '{}'", bytes.len(), id);
                return Ok(());
            }
            None => {
                if !state.outputs.iter().any(|e| &e.id == id) {
                    return Err(TransportError::PortNotFound {
                        direction: Direction::Output,
                        id: id.clone(),
                    });
                }
                state.open_outputs.insert(id.clone(), true);
                state.output_opens += 1;
            }
        }
        state.sent.push((id.clone(), bytes.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_reaches_connected_handler() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Input, "clock");

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();

        let mut transport = MemoryTransport { bus: bus.clone() };
        transport
            .connect_input(
                &EndpointId::new("clock"),
                Box::new(move |bytes| sink.lock().push(bytes.to_vec())),
            )
            .unwrap();

        assert!(bus.inject("clock", &[0xF8]));
        assert!(!bus.inject("other", &[0xF8]));
        assert_eq!(*received.lock(), vec![vec![0xF8]]);
    }

    #[test]
    fn test_unplug_drops_handler() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Input, "clock");
        let mut transport = MemoryTransport { bus: bus.clone() };
        transport
            .connect_input(&EndpointId::new("clock"), Box::new(|_| {}))
            .unwrap();

        bus.unplug(Direction::Input, "clock");
        assert!(!bus.is_attached("clock"));
        assert!(transport.inputs().is_empty());
    }

    #[test]
    fn test_request_resolves_once() {
        let bus = MemoryBus::new();
        bus.set_request_outcome(RequestOutcome::Pending);
        let mut access = bus.access();

        assert!(matches!(access.poll_request(), AccessRequest::Pending));

        bus.set_request_outcome(RequestOutcome::Grant);
        assert!(matches!(access.poll_request(), AccessRequest::Granted(_)));
        assert!(matches!(access.poll_request(), AccessRequest::Failed(_)));
    }

    #[test]
    fn test_stale_output_connection_swallows_sends() {
        let bus = MemoryBus::new();
        bus.plug(Direction::Output, "synth");
        let mut transport = MemoryTransport { bus: bus.clone() };
        let synth = EndpointId::new("synth");

        transport.send(&synth, &[0xB0, 1, 1]).unwrap();
        assert!(bus.is_output_open("synth"));

        bus.unplug(Direction::Output, "synth");
        bus.plug(Direction::Output, "synth");
        transport.send(&synth, &[0xB0, 1, 2]).unwrap();
        assert_eq!(bus.take_sent(), vec![(synth.clone(), vec![0xB0, 1, 1])]);

        transport.disconnect_output(&synth);
        assert!(!bus.is_output_open("synth"));
        transport.send(&synth, &[0xB0, 1, 3]).unwrap();
        assert_eq!(bus.take_sent(), vec![(synth, vec![0xB0, 1, 3])]);
        assert_eq!(bus.output_open_count(), 2);
    }

    #[test]
    fn test_send_to_unknown_output_fails() {
        let bus = MemoryBus::new();
        let mut transport = MemoryTransport { bus: bus.clone() };
        assert!(transport.send(&EndpointId::new("nowhere"), &[0xF8]).is_err());
        assert!(!bus.is_output_open("nowhere"));
    }
}

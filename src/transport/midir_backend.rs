//! Hardware transport backed by `midir`
//!
//! Native platforms have no permission prompt, so access is always granted and
//! the acquisition request resolves on the first poll.

use std::collections::HashMap;

use midir::{
    Ignore, MidiInput, MidiInputConnection, MidiInputPort, MidiOutput, MidiOutputConnection,
    MidiOutputPort,
};
use tracing::{debug, info, warn};

use super::{
    AccessRequest, Direction, Endpoint, EndpointId, MessageHandler, MidiAccess, MidiTransport,
    PermissionState, TransportError,
};
use crate::midi::format_hex;

/// Endpoints are keyed by the backend's port id rather than the port name, so
/// identical devices stay distinguishable across hot-plug
fn endpoint(port_id: String, name: String) -> Endpoint {
    Endpoint {
        id: EndpointId::new(port_id),
        name,
    }
}

/// Access to the system MIDI stack
pub struct MidirAccess {
    client_name: String,
    requested: bool,
}

impl MidirAccess {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            requested: false,
        }
    }
}

impl MidiAccess for MidirAccess {
    fn query_permission(&mut self) -> PermissionState {
        PermissionState::Granted
    }

    fn poll_request(&mut self) -> AccessRequest {
        if self.requested {
            return AccessRequest::Failed("MIDI access already requested".to_string());
        }
        self.requested = true;

        match MidirTransport::open(&self.client_name) {
            Ok(transport) => AccessRequest::Granted(Box::new(transport)),
            Err(e) => AccessRequest::Failed(e.to_string()),
        }
    }
}

/// Acquired `midir` transport.
///
/// `midir` consumes a client per connection, so one scanner client of each
/// direction is kept for enumeration and fresh clients are created to connect.
pub struct MidirTransport {
    client_name: String,
    scanner_in: MidiInput,
    scanner_out: MidiOutput,
    inputs: HashMap<EndpointId, MidiInputConnection<()>>,
    outputs: HashMap<EndpointId, MidiOutputConnection>,
}

impl MidirTransport {
    /// Create the enumeration clients
    pub fn open(client_name: &str) -> Result<Self, TransportError> {
        let scanner_in = MidiInput::new(&format!("{}-scanner-in", client_name))
            .map_err(|e| TransportError::Init(e.to_string()))?;
        let scanner_out = MidiOutput::new(&format!("{}-scanner-out", client_name))
            .map_err(|e| TransportError::Init(e.to_string()))?;

        info!("MIDI client '{}' initialised", client_name);

        Ok(Self {
            client_name: client_name.to_string(),
            scanner_in,
            scanner_out,
            inputs: HashMap::new(),
            outputs: HashMap::new(),
        })
    }

    fn input_ports(midi_in: &MidiInput) -> Vec<(Endpoint, MidiInputPort)> {
        midi_in
            .ports()
            .into_iter()
            .map(|port| {
                let name = midi_in
                    .port_name(&port)
                    .unwrap_or_else(|_| "<unnamed>".to_string());
                (endpoint(port.id(), name), port)
            })
            .collect()
    }

    fn output_ports(midi_out: &MidiOutput) -> Vec<(Endpoint, MidiOutputPort)> {
        midi_out
            .ports()
            .into_iter()
            .map(|port| {
                let name = midi_out
                    .port_name(&port)
                    .unwrap_or_else(|_| "<unnamed>".to_string());
                (endpoint(port.id(), name), port)
            })
            .collect()
    }

    fn open_output(&mut self, id: &EndpointId) -> Result<(), TransportError> {
        let midi_out = MidiOutput::new(&format!("{}-out", self.client_name))
            .map_err(|e| TransportError::Init(e.to_string()))?;

        let (_, port) = Self::output_ports(&midi_out)
            .into_iter()
            .find(|(endpoint, _)| &endpoint.id == id)
            .ok_or_else(|| TransportError::PortNotFound {
                direction: Direction::Output,
                id: id.clone(),
            })?;

        let connection = midi_out
            .connect(&port, &format!("{}-{}", self.client_name, id))
            .map_err(|e| TransportError::Connect {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        debug!("MIDI output opened: '{}'", id);
        self.outputs.insert(id.clone(), connection);
        Ok(())
    }
}

impl MidiTransport for MidirTransport {
    fn inputs(&self) -> Vec<Endpoint> {
        Self::input_ports(&self.scanner_in)
            .into_iter()
            .map(|(endpoint, _)| endpoint)
            .collect()
    }

    fn outputs(&self) -> Vec<Endpoint> {
        Self::output_ports(&self.scanner_out)
            .into_iter()
            .map(|(endpoint, _)| endpoint)
            .collect()
    }

    fn connect_input(
        &mut self,
        id: &EndpointId,
        mut handler: MessageHandler,
    ) -> Result<(), TransportError> {
        let mut midi_in = MidiInput::new(&format!("{}-in", self.client_name))
            .map_err(|e| TransportError::Init(e.to_string()))?;
        // Timing clock and other real-time bytes are filtered by default on some backends
        midi_in.ignore(Ignore::None);

        let (_, port) = Self::input_ports(&midi_in)
            .into_iter()
            .find(|(endpoint, _)| &endpoint.id == id)
            .ok_or_else(|| TransportError::PortNotFound {
                direction: Direction::Input,
                id: id.clone(),
            })?;

        let connection = midi_in
            .connect(
                &port,
                &format!("{}-{}", self.client_name, id),
                move |_timestamp, data, _| handler(data),
                (),
            )
            .map_err(|e| TransportError::Connect {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        self.inputs.insert(id.clone(), connection);
        Ok(())
    }

    fn disconnect_input(&mut self, id: &EndpointId) {
        if let Some(connection) = self.inputs.remove(id) {
            connection.close();
            debug!("MIDI input closed: '{}'", id);
        }
    }

    fn disconnect_output(&mut self, id: &EndpointId) {
        if let Some(connection) = self.outputs.remove(id) {
            connection.close();
            debug!("MIDI output closed: '{}'", id);
        }
    }

    fn send(&mut self, id: &EndpointId, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.outputs.contains_key(id) {
            self.open_output(id)?;
        }

        let Some(connection) = self.outputs.get_mut(id) else {
            return Err(TransportError::PortNotFound {
                direction: Direction::Output,
                id: id.clone(),
            });
        };

        if let Err(e) = connection.send(bytes) {
            warn!("MIDI send to '{}' failed: {}", id, e);
            // Drop the broken connection so the next send reopens it
            self.outputs.remove(id);
            return Err(TransportError::Send {
                id: id.clone(),
                reason: e.to_string(),
            });
        }

        debug!("Sent to '{}': {}", id, format_hex(bytes));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_is_granted_on_native() {
        let mut access = MidirAccess::new("beatcam-test");
        assert_eq!(access.query_permission(), PermissionState::Granted);
    }

    #[test]
    fn test_enumerated_ids_are_unique() {
        // Backends may be unavailable on CI
        if let Ok(transport) = MidirTransport::open("beatcam-test") {
            for endpoints in [transport.inputs(), transport.outputs()] {
                let ids: std::collections::HashSet<_> = endpoints.iter().map(|e| &e.id).collect();
                assert_eq!(ids.len(), endpoints.len());
            }
        }
    }

    #[test]
    fn test_unknown_output_release_is_ignored() {
        if let Ok(mut transport) = MidirTransport::open("beatcam-test") {
            transport.disconnect_output(&EndpointId::new("no such port"));
            assert!(transport.outputs.is_empty());
        }
    }
}

//! Clock session state machine
//!
//! Drives transport acquisition, permission polling and device polling from a
//! single owner. Nothing here sleeps or blocks: the host asks for
//! [`ClockSession::next_deadline`], waits for it alongside its other work and
//! calls [`ClockSession::tick`] when it is reached.

use std::time::Instant;

use tracing::{info, warn};

use super::decoder::ClockDecoder;
use super::permission::{PermissionAction, PermissionPoller, PERMISSION_POLL};
use super::registry::{DeviceRegistry, RegistryChanges};
use super::{ClockSnapshot, SongClock};
use crate::transport::{AccessRequest, EndpointId, MidiAccess, MidiSender, MidiTransport};

/// Where the session is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessStatus {
    /// Waiting for the acquisition request to resolve
    Requesting,
    /// Transport acquired
    Ready,
    /// Acquisition failed; the clock stays inactive
    Failed(String),
    /// Permission denied; terminal
    Denied,
    /// Session ended by the host
    Ended,
}

/// Host-provided session settings
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Channel used by the output sender when a call gives none
    pub default_channel: Option<u8>,
}

pub struct ClockSession {
    access: Box<dyn MidiAccess>,
    transport: Option<Box<dyn MidiTransport>>,
    status: AccessStatus,
    error: Option<String>,
    registry: DeviceRegistry,
    decoder: ClockDecoder,
    permission: PermissionPoller,
    next_device_poll: Option<Instant>,
    next_permission_poll: Option<Instant>,
    options: SessionOptions,
}

impl ClockSession {
    pub fn new(access: Box<dyn MidiAccess>, options: SessionOptions) -> Self {
        Self::with_decoder(access, ClockDecoder::new(SongClock::new()), options)
    }

    /// Session using a preconfigured decoder (e.g. one with an observer)
    pub fn with_decoder(
        access: Box<dyn MidiAccess>,
        decoder: ClockDecoder,
        options: SessionOptions,
    ) -> Self {
        Self {
            access,
            transport: None,
            status: AccessStatus::Requesting,
            error: None,
            registry: DeviceRegistry::new(),
            decoder,
            permission: PermissionPoller::new(),
            next_device_poll: None,
            next_permission_poll: None,
            options,
        }
    }

    /// Issue the acquisition request and arm the permission poll
    pub fn start(&mut self, now: Instant) {
        if self.status != AccessStatus::Requesting {
            return;
        }
        self.next_permission_poll = Some(now + PERMISSION_POLL);
        self.poll_request(now);
    }

    /// Earliest instant at which [`tick`](Self::tick) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.next_device_poll, self.next_permission_poll) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Run every poll that is due at `now`
    pub fn tick(&mut self, now: Instant) {
        if self.next_permission_poll.is_some_and(|at| at <= now) {
            self.poll_permission(now);
        }

        if self.status == AccessStatus::Requesting {
            self.poll_request(now);
        }

        if self.next_device_poll.is_some_and(|at| at <= now) {
            self.poll_devices(now);
        }
    }

    pub fn status(&self) -> &AccessStatus {
        &self.status
    }

    /// Last user-facing error (denial or acquisition failure)
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Transport exists and at least one endpoint is known.
    ///
    /// Clock-derived values must be treated as unused while this is false.
    pub fn is_active(&self) -> bool {
        self.registry.is_active(self.transport.is_some())
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        self.decoder.clock().snapshot()
    }

    pub fn decoder(&self) -> &ClockDecoder {
        &self.decoder
    }

    /// Output sender over every known output; `None` while inactive
    pub fn sender(&mut self) -> Option<MidiSender<'_>> {
        if !self.is_active() {
            return None;
        }
        let outputs: Vec<EndpointId> = self.registry.outputs().cloned().collect();
        let default_channel = self.options.default_channel;
        let transport = self.transport.as_mut()?;
        Some(MidiSender::new(transport.as_mut(), outputs, default_channel))
    }

    /// Stop all polling and release the transport
    pub fn end(&mut self) {
        if self.status == AccessStatus::Ended {
            return;
        }

        if let Some(mut transport) = self.transport.take() {
            let inputs: Vec<EndpointId> = self.registry.inputs().cloned().collect();
            for id in &inputs {
                self.decoder.detach(transport.as_mut(), id);
            }
            for id in self.registry.outputs() {
                transport.disconnect_output(id);
            }
        }
        self.decoder.clear();
        self.registry.clear();
        self.next_device_poll = None;
        self.next_permission_poll = None;
        self.status = AccessStatus::Ended;
        info!("Clock session ended");
    }

    fn poll_request(&mut self, now: Instant) {
        match self.access.poll_request() {
            AccessRequest::Pending => {}
            AccessRequest::Granted(transport) => {
                info!("✅ MIDI transport acquired");
                self.transport = Some(transport);
                self.status = AccessStatus::Ready;
                self.next_permission_poll = None;
                self.next_device_poll = Some(now);
            }
            AccessRequest::Failed(reason) => {
                warn!("MIDI transport unavailable, continuing without clock sync: {}", reason);
                self.error = Some(reason.clone());
                self.status = AccessStatus::Failed(reason);
            }
        }
    }

    fn poll_permission(&mut self, now: Instant) {
        if self.transport.is_some() {
            self.next_permission_poll = None;
            return;
        }

        match self.permission.on_status(self.access.query_permission()) {
            PermissionAction::Continue => {
                self.next_permission_poll = Some(now + PERMISSION_POLL);
            }
            PermissionAction::Deny => {
                self.error = Some("MIDI access denied".to_string());
                self.status = AccessStatus::Denied;
                self.next_permission_poll = None;
                self.next_device_poll = None;
            }
        }
    }

    fn poll_devices(&mut self, now: Instant) {
        let Some(transport) = self.transport.as_mut() else {
            self.next_device_poll = None;
            return;
        };

        let changes = self.registry.poll(transport.as_ref());
        Self::apply_changes(&mut self.decoder, &self.registry, transport.as_mut(), &changes);

        self.next_device_poll = self
            .registry
            .cadence(true)
            .interval()
            .map(|interval| now + interval);
    }

    fn apply_changes(
        decoder: &mut ClockDecoder,
        registry: &DeviceRegistry,
        transport: &mut dyn MidiTransport,
        changes: &RegistryChanges,
    ) {
        for id in &changes.removed_inputs {
            decoder.detach(transport, id);
        }
        // A connection kept past unplug would swallow sends after a replug
        for id in &changes.removed_outputs {
            transport.disconnect_output(id);
        }

        // Every known input without a decoder, so a failed attach is retried next poll
        let pending: Vec<EndpointId> = registry
            .inputs()
            .filter(|id| !decoder.is_attached(id))
            .cloned()
            .collect();

        for id in &pending {
            if let Err(e) = decoder.attach(transport, id) {
                warn!("Could not attach clock decoder: {}", e);
            }
        }
    }
}

impl Drop for ClockSession {
    fn drop(&mut self) {
        self.end();
    }
}

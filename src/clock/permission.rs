//! Permission polling policy
//!
//! Runs only while no transport has been obtained. A grant needs no action
//! here since acquisition completes through its own request; a denial is
//! terminal.

use std::time::Duration;

use tracing::{debug, error};

use crate::transport::PermissionState;

/// Fixed permission poll interval
pub const PERMISSION_POLL: Duration = Duration::from_millis(1000);

/// What the session does after a permission answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAction {
    /// Keep polling on the fixed cadence
    Continue,
    /// Access was denied: stop every poll and stay inert
    Deny,
}

/// Interprets permission answers and logs state changes once
#[derive(Debug, Default)]
pub struct PermissionPoller {
    last: Option<PermissionState>,
}

impl PermissionPoller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<PermissionState> {
        self.last
    }

    pub fn on_status(&mut self, state: PermissionState) -> PermissionAction {
        let changed = self.last != Some(state);
        self.last = Some(state);

        match state {
            PermissionState::Granted => {
                if changed {
                    debug!("MIDI access granted");
                }
                PermissionAction::Continue
            }
            PermissionState::Prompt => {
                if changed {
                    debug!("MIDI access pending");
                }
                PermissionAction::Continue
            }
            PermissionState::Denied => {
                error!("MIDI access denied");
                PermissionAction::Deny
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_denied_is_terminal() {
        let mut poller = PermissionPoller::new();
        assert_eq!(poller.on_status(PermissionState::Prompt), PermissionAction::Continue);
        assert_eq!(poller.on_status(PermissionState::Granted), PermissionAction::Continue);
        assert_eq!(poller.on_status(PermissionState::Denied), PermissionAction::Deny);
        assert_eq!(poller.last(), Some(PermissionState::Denied));
    }
}

//! Connection status state machine.
//!
//! [`transition`] is a pure function from (current status, manual-disconnect
//! flag, transport event) to a status change plus side effects. The session
//! event loop applies the effects; the table itself has no transport or
//! timer dependency and is tested standalone.

use crate::transport::TransportEvent;
use serde::Serialize;
use std::fmt;

/// Connection lifecycle status. Single source of truth for all gating
/// logic; no component reads transport internals directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ConnectionStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Side effects the session runs when applying a [`Step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Subscribe to the response topics, publish the initial request burst,
    /// and arm the polling timer.
    BeginSession,
    /// Cancel the polling timer.
    StopPolling,
    /// Announce the established connection.
    NotifyConnected,
    /// Announce the closed connection.
    NotifyClosed,
    /// Announce that the broker is unreachable and polling paused.
    NotifyOffline,
    /// Announce a transport error with the carried wording. The session
    /// substitutes a dedicated message for authorization failures.
    NotifyError(String),
}

/// Result of one transition: the status to move to (None for no change)
/// and the effects to run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Step {
    pub status: Option<ConnectionStatus>,
    pub effects: Vec<Effect>,
}

impl Step {
    fn none() -> Self {
        Self::default()
    }

    /// Reports whether the step changes nothing.
    pub fn is_noop(&self) -> bool {
        self.status.is_none() && self.effects.is_empty()
    }
}

/// Computes the status change and side effects for one transport event.
///
/// While the manual-disconnect flag is set, the disconnect sequence owns
/// the status; events may still stop polling but never mutate status or
/// produce notices, so a close/error fired by the forcible teardown cannot
/// masquerade as a connection failure.
pub fn transition(
    current: ConnectionStatus,
    manual_disconnect: bool,
    event: &TransportEvent,
) -> Step {
    use ConnectionStatus::*;

    match event {
        TransportEvent::Connected => {
            if manual_disconnect {
                return Step::none();
            }
            let mut effects = Vec::new();
            if current != Connected {
                effects.push(Effect::NotifyConnected);
            }
            // Side effects run on every broker acknowledgement: a reconnect
            // needs its subscriptions and polling re-established even though
            // the status may already read connected
            effects.push(Effect::BeginSession);
            Step {
                status: (current != Connected).then_some(Connected),
                effects,
            }
        }
        TransportEvent::Error(message) => {
            if manual_disconnect || current == Error {
                return Step::none();
            }
            Step {
                status: Some(Error),
                effects: vec![Effect::StopPolling, Effect::NotifyError(message.clone())],
            }
        }
        TransportEvent::Closed => {
            if manual_disconnect {
                // The disconnect sequence sets the final status itself
                return Step {
                    status: Some(Disconnected),
                    effects: vec![Effect::StopPolling],
                };
            }
            if current == Error || current == Disconnected {
                return Step {
                    status: None,
                    effects: vec![Effect::StopPolling],
                };
            }
            Step {
                status: Some(Disconnected),
                effects: vec![Effect::StopPolling, Effect::NotifyClosed],
            }
        }
        TransportEvent::Offline => {
            // Soft failure: only degrades an established connection
            if manual_disconnect || current != Connected {
                return Step::none();
            }
            Step {
                status: Some(Disconnected),
                effects: vec![Effect::StopPolling, Effect::NotifyOffline],
            }
        }
        TransportEvent::Reconnecting => {
            if manual_disconnect || current == Connecting {
                return Step::none();
            }
            Step {
                status: Some(Connecting),
                effects: Vec::new(),
            }
        }
        // Messages are routed to the store, not through the state machine
        TransportEvent::Message { .. } => Step::none(),
    }
}

//! Connection state machine.

use crate::events::{ConnectionUpdate, DisconnectReason};
use serde::Serialize;

/// Externally visible connection state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    #[serde(rename = "disconnected")]
    Disconnected,
    #[serde(rename = "waiting_scan")]
    AwaitingScan,
    #[serde(rename = "connected")]
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingScan => "waiting_scan",
            Self::Connected => "connected",
        }
    }
}

/// What the event loop has to do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowUp {
    None,
    /// Open a new session after the reconnect delay.
    Reconnect,
    /// Session was unlinked: forget credentials, do not reconnect.
    LoggedOut,
}

/// Connection state plus the pairing token, if any.
///
/// A token is held exactly while the state is [`ConnectionState::AwaitingScan`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    state: ConnectionState,
    pairing_token: Option<String>,
}

impl SessionState {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn pairing_token(&self) -> Option<&str> {
        self.pairing_token.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Apply one connection update. Total: every update yields exactly one state.
    pub fn apply(&mut self, update: &ConnectionUpdate) -> FollowUp {
        match update {
            ConnectionUpdate::PairingToken(token) => {
                self.state = ConnectionState::AwaitingScan;
                self.pairing_token = Some(token.clone());
                FollowUp::None
            }
            ConnectionUpdate::Open => {
                self.state = ConnectionState::Connected;
                self.pairing_token = None;
                FollowUp::None
            }
            ConnectionUpdate::Close(reason) => self.close(*reason),
        }
    }

    fn close(&mut self, reason: DisconnectReason) -> FollowUp {
        self.state = ConnectionState::Disconnected;
        self.pairing_token = None;
        if reason.is_logged_out() {
            FollowUp::LoggedOut
        } else {
            FollowUp::Reconnect
        }
    }
}

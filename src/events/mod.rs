//! Events emitted by a session transport.
//!
//! A transport never touches relay state directly: everything it observes is
//! pushed into an [`EventSink`](crate::transport::EventSink) as a
//! [`SessionEvent`] and consumed by the session manager's event loop.

use crate::proto;
use crate::store::Credentials;
use crate::types::{Jid, MessageId};
use std::fmt;

/// Events emitted by a [`Transport`](crate::transport::Transport) for one session.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// Key material or registration state changed and must be persisted.
    CredentialsUpdated(Credentials),

    /// Connection state changed.
    Connection(ConnectionUpdate),

    /// A batch of incoming messages.
    Messages(MessageBatch),
}

/// Connection-state change reported by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionUpdate {
    /// A pairing token (QR payload) is available for scanning.
    PairingToken(String),

    /// Session authenticated and ready to send.
    Open,

    /// Session closed.
    Close(DisconnectReason),
}

/// Why a session closed. Codes follow the stream/failure codes used by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// Device was unlinked; credentials are no longer valid.
    LoggedOut,
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    TimedOut,
    BadSession,
    /// Server asks for a fresh connection (sent right after pairing).
    RestartRequired,
    MultideviceMismatch,
    Forbidden,
    ServiceUnavailable,
    /// No cause was reported.
    Unknown,
    /// Any other status code.
    Other(u16),
}

impl DisconnectReason {
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => Self::LoggedOut,
            403 => Self::Forbidden,
            408 => Self::ConnectionLost,
            411 => Self::MultideviceMismatch,
            428 => Self::ConnectionClosed,
            440 => Self::ConnectionReplaced,
            500 => Self::BadSession,
            503 => Self::ServiceUnavailable,
            515 => Self::RestartRequired,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::LoggedOut => Some(401),
            Self::Forbidden => Some(403),
            Self::ConnectionLost | Self::TimedOut => Some(408),
            Self::MultideviceMismatch => Some(411),
            Self::ConnectionClosed => Some(428),
            Self::ConnectionReplaced => Some(440),
            Self::BadSession => Some(500),
            Self::ServiceUnavailable => Some(503),
            Self::RestartRequired => Some(515),
            Self::Unknown => None,
            Self::Other(code) => Some(*code),
        }
    }

    /// Only an explicit logout is terminal; every other cause is retried.
    pub fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::LoggedOut => "logged out",
            Self::ConnectionClosed => "connection closed",
            Self::ConnectionLost => "connection lost",
            Self::ConnectionReplaced => "connection replaced by another session",
            Self::TimedOut => "timed out",
            Self::BadSession => "bad session",
            Self::RestartRequired => "restart required",
            Self::MultideviceMismatch => "multidevice mismatch",
            Self::Forbidden => "forbidden",
            Self::ServiceUnavailable => "service unavailable",
            Self::Unknown => "unknown",
            Self::Other(_) => "connection failure",
        };
        match self.code() {
            Some(code) => write!(f, "{} (code {})", msg, code),
            None => write!(f, "{}", msg),
        }
    }
}

/// How a message batch was delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertKind {
    /// New message delivered live.
    Notify,
    /// Message added from history or another device; not a live delivery.
    Append,
}

/// One batch of messages from the transport.
#[derive(Clone, Debug)]
pub struct MessageBatch {
    pub kind: UpsertKind,
    pub messages: Vec<WireMessage>,
}

impl MessageBatch {
    pub fn notify(messages: Vec<WireMessage>) -> Self {
        Self {
            kind: UpsertKind::Notify,
            messages,
        }
    }
}

/// Addressing info of one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageKey {
    /// Chat the message belongs to (sender for direct chats).
    pub remote_jid: Jid,
    pub from_me: bool,
    pub id: MessageId,
}

/// A message as received from the transport.
#[derive(Clone, Debug)]
pub struct WireMessage {
    pub key: MessageKey,
    /// Decoded body; `None` for protocol-only stubs without content.
    pub message: Option<proto::Message>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_logged_out_is_terminal() {
        assert!(DisconnectReason::from_code(401).is_logged_out());
        for code in [403, 408, 411, 428, 440, 500, 503, 515, 999] {
            assert!(!DisconnectReason::from_code(code).is_logged_out(), "{code}");
        }
        assert!(!DisconnectReason::Unknown.is_logged_out());
    }

    #[test]
    fn code_roundtrips_through_from_code() {
        for code in [401, 403, 408, 411, 428, 440, 500, 503, 515, 418] {
            assert_eq!(DisconnectReason::from_code(code).code(), Some(code));
        }
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(
            DisconnectReason::LoggedOut.to_string(),
            "logged out (code 401)"
        );
        assert_eq!(DisconnectReason::Unknown.to_string(), "unknown");
    }
}

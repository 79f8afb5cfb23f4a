//! Transport abstraction for the session layer.
//!
//! A [`Connector`] opens one session from stored credentials and reports what
//! happens on it through an [`EventSink`]; the returned [`Transport`] is the
//! handle used for sending. Implement these traits to plug in the WebSocket +
//! Noise connection or a test double.

use crate::events::SessionEvent;
use crate::store::Credentials;
use crate::types::MessageId;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Async trait for a live session handle.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a text message to a qualified address and return its id.
    async fn send_text(&self, to: &str, text: &str) -> Result<MessageId>;

    /// Close the session. Must not emit further events afterwards.
    async fn close(&self) -> Result<()>;
}

/// Opens sessions. Called once at startup and again on every reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, creds: Credentials, events: EventSink) -> Result<Arc<dyn Transport>>;
}

/// One event tagged with the generation of the session that produced it.
#[derive(Debug)]
pub(crate) struct Tagged {
    pub generation: u64,
    pub event: SessionEvent,
}

/// Where a transport pushes its events.
///
/// Each sink is bound to one session generation; the session manager drops
/// events from generations that have since been replaced.
#[derive(Clone, Debug)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Tagged>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Push an event. Returns `false` once the session manager has shut down.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(Tagged {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

//! Inbound forwarding: every live message from someone else is posted to the
//! configured webhook, best effort.

mod webhook;

pub use webhook::WebhookNotifier;

use crate::error::WebhookError;
use crate::events::{MessageBatch, UpsertKind, WireMessage};
use crate::types::{Jid, MessageId};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Best-effort delivery of one forwarded message.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &ForwardPayload) -> Result<(), WebhookError>;
}

/// Normalized view of one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: Jid,
    /// Text body; empty when the message carries no text.
    pub text: String,
    pub id: MessageId,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    /// Normalize a wire message. `None` for our own messages and for stubs
    /// without a body.
    pub fn from_wire(msg: &WireMessage, received_at: DateTime<Utc>) -> Option<Self> {
        if msg.key.from_me {
            return None;
        }
        let body = msg.message.as_ref()?;
        Some(Self {
            from: msg.key.remote_jid.clone(),
            text: body.body_text().to_string(),
            id: msg.key.id.clone(),
            received_at,
        })
    }
}

/// JSON body posted to the webhook.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardPayload {
    pub from: Jid,
    pub message: String,
    /// RFC 3339 receipt time, millisecond precision, UTC.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl From<&InboundMessage> for ForwardPayload {
    fn from(msg: &InboundMessage) -> Self {
        Self {
            from: msg.from.clone(),
            message: msg.text.clone(),
            timestamp: msg
                .received_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            message_id: Some(msg.id.clone()).filter(|id| !id.is_empty()),
        }
    }
}

/// Outcome of forwarding one batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Turns message batches into webhook calls.
pub struct Forwarder {
    notifier: Arc<dyn Notifier>,
}

impl Forwarder {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Forward every qualifying message of a live batch, one call each.
    /// Failures are logged and the batch continues; nothing is retried.
    pub async fn forward_batch(&self, batch: &MessageBatch) -> ForwardStats {
        let mut stats = ForwardStats::default();
        if batch.kind != UpsertKind::Notify {
            debug!(count = batch.messages.len(), "ignoring non-live message batch");
            stats.skipped = batch.messages.len();
            return stats;
        }

        for wire in &batch.messages {
            let Some(msg) = InboundMessage::from_wire(wire, Utc::now()) else {
                stats.skipped += 1;
                continue;
            };
            info!(from = %msg.from, id = %msg.id, "inbound message");
            debug!(text = %msg.text, "inbound message body");

            match self.notifier.notify(&ForwardPayload::from(&msg)).await {
                Ok(()) => {
                    debug!(id = %msg.id, "forwarded to webhook");
                    stats.delivered += 1;
                }
                Err(e) => {
                    warn!(id = %msg.id, error = %e, "webhook delivery failed");
                    stats.failed += 1;
                }
            }
        }
        stats
    }
}

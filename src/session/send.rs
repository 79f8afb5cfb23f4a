//! Send message types.

use crate::types::MessageId;
use chrono::{DateTime, Utc};
use sha2::Digest;

/// Result of a successful send.
#[derive(Clone, Debug)]
pub struct SendReceipt {
    pub id: MessageId,
    /// Address exactly as sent.
    pub to: String,
    pub timestamp: DateTime<Utc>,
}

/// Generate a message ID (3EB0 + hex of hash).
pub fn generate_message_id() -> MessageId {
    let mut data = Vec::with_capacity(8 + 5 + 16);
    data.extend_from_slice(&Utc::now().timestamp().to_be_bytes());
    data.extend_from_slice(b"@c.us");
    data.extend_from_slice(&rand::random::<[u8; 16]>());
    let hash = sha2::Sha256::digest(&data);
    format!("3EB0{}", hex::encode_upper(&hash[..9]))
}

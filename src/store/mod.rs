//! Credential store: persists the session's key material across restarts.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::pairing::{generate_pairing_keys, verify_signed_identity};
use crate::types::Jid;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Key material and registration state for the linked device.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// X25519 static key used for the Noise handshake.
    #[serde(with = "b64_key")]
    pub noise_key_pub: [u8; 32],
    #[serde(with = "b64_key")]
    pub noise_key_priv: [u8; 32],
    /// Ed25519 identity key pair.
    #[serde(with = "b64_key")]
    pub identity_key_pub: [u8; 32],
    #[serde(with = "b64_key")]
    pub identity_key_priv: [u8; 32],
    /// Shared secret used to authenticate the pair-success payload.
    #[serde(with = "b64_key")]
    pub adv_secret_key: [u8; 32],
    pub registration_id: u32,
    /// Our JID once paired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<Jid>,
    /// Signed device identity after pairing.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub account: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl Credentials {
    /// Fresh, unregistered credentials.
    pub fn generate() -> Self {
        let keys = generate_pairing_keys();
        Self {
            noise_key_pub: keys.noise_public,
            noise_key_priv: keys.noise_private,
            identity_key_pub: keys.identity_public,
            identity_key_priv: keys.identity_private,
            adv_secret_key: keys.adv_secret,
            registration_id: keys.registration_id,
            me: None,
            account: None,
            platform: None,
        }
    }

    /// Whether the device has completed pairing.
    pub fn is_registered(&self) -> bool {
        self.me.is_some()
    }

    /// The stored account blob must carry a valid signature by our own
    /// identity key. Unpaired credentials have none and pass.
    pub fn has_valid_account(&self) -> bool {
        match &self.account {
            None => true,
            Some(blob) => {
                verify_signed_identity(blob).is_ok() && blob[..32] == self.identity_key_pub
            }
        }
    }
}

// Private halves stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("noise_key_pub", &hex::encode(self.noise_key_pub))
            .field("identity_key_pub", &hex::encode(self.identity_key_pub))
            .field("registration_id", &self.registration_id)
            .field("me", &self.me)
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

/// Store trait: persist and load the session credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load saved credentials, `None` on first run.
    async fn load(&self) -> crate::Result<Option<Credentials>>;

    /// Persist credentials (after every credential-update event).
    async fn save(&self, creds: &Credentials) -> crate::Result<()>;

    /// Forget credentials (after logout).
    async fn clear(&self) -> crate::Result<()>;
}

/// Shared store handle.
pub type Store = Arc<dyn CredentialStore>;

mod b64_key {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let raw = String::deserialize(d)?;
        let bytes = STANDARD.decode(raw.as_bytes()).map_err(de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|v: Vec<u8>| de::Error::invalid_length(v.len(), &"32 bytes"))
    }
}

mod b64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_some(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|raw| STANDARD.decode(raw.as_bytes()).map_err(de::Error::custom))
            .transpose()
    }
}

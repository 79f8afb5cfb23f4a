use super::{CredentialStore, Credentials};
use crate::{error::StoreError, Result};
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory credential store (for testing or single-run; not persistent).
pub struct MemoryStore {
    creds: RwLock<Option<Credentials>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            creds: RwLock::new(None),
        }
    }

    /// Store pre-seeded with credentials, e.g. a registered device.
    pub fn with_credentials(creds: Credentials) -> Self {
        Self {
            creds: RwLock::new(Some(creds)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        Ok(self
            .creds
            .read()
            .map_err(|e| StoreError::Load(e.to_string()))?
            .clone())
    }

    async fn save(&self, creds: &Credentials) -> Result<()> {
        *self
            .creds
            .write()
            .map_err(|e| StoreError::Save(e.to_string()))? = Some(creds.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self
            .creds
            .write()
            .map_err(|e| StoreError::Save(e.to_string()))? = None;
        Ok(())
    }
}

use super::{CredentialStore, Credentials};
use crate::{error::StoreError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const CREDS_FILE: &str = "creds.json";

/// Credential store backed by `<dir>/creds.json`.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write leaves the previous credentials intact.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn load(&self) -> Result<Option<Credentials>> {
        let path = self.creds_path();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Load(format!("{}: {e}", path.display())).into()),
        };
        let creds = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::Corrupt(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "loaded credentials");
        Ok(Some(creds))
    }

    async fn save(&self, creds: &Credentials) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::Save(format!("{}: {e}", self.dir.display())))?;
        let json =
            serde_json::to_vec_pretty(creds).map_err(|e| StoreError::Save(e.to_string()))?;

        let path = self.creds_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| StoreError::Save(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Save(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "saved credentials");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let path = self.creds_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Save(format!("{}: {e}", path.display())).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Jid;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("auth_info"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_creates_dir_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let auth = dir.path().join("auth_info");
        let mut creds = Credentials::generate();
        creds.me = Some(Jid::new_ad("5511999999999", 0, 2, "s.whatsapp.net"));

        FileStore::new(&auth).save(&creds).await.unwrap();
        assert!(auth.join("creds.json").exists());
        assert!(!auth.join("creds.json.tmp").exists());

        let reloaded = FileStore::new(&auth).load().await.unwrap().unwrap();
        assert_eq!(reloaded, creds);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("creds.json"), b"{not json")
            .await
            .unwrap();
        let err = FileStore::new(dir.path()).load().await.unwrap_err();
        assert!(matches!(err, crate::Error::Store(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.save(&Credentials::generate()).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}

//! Local file storage with a quarantine area and a public area.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("object '{0}' not found")]
    NotFound(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

const QUARANTINE: &str = "quarantine";
const PUBLIC: &str = "public";

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

/// Keys are generated server-side; anything outside `[A-Za-z0-9_-]` is refused.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn new_storage_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the quarantine and public directories.
    pub async fn ensure_layout(&self) -> Result<(), StorageError> {
        fs::create_dir_all(self.root.join(QUARANTINE)).await?;
        fs::create_dir_all(self.root.join(PUBLIC)).await?;
        Ok(())
    }

    fn path(&self, area: &str, key: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_key(key) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(area).join(key))
    }

    pub async fn write_quarantined(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path(QUARANTINE, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, bytes).await?;
        Ok(())
    }

    async fn relocate(&self, key: &str, from_area: &str, to_area: &str) -> Result<(), StorageError> {
        let from = self.path(from_area, key)?;
        let to = self.path(to_area, key)?;
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::rename(&from, &to).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves a quarantined object into the public area.
    pub async fn promote(&self, key: &str) -> Result<(), StorageError> {
        self.relocate(key, QUARANTINE, PUBLIC).await
    }

    /// Moves a public object back into quarantine.
    pub async fn demote(&self, key: &str) -> Result<(), StorageError> {
        self.relocate(key, PUBLIC, QUARANTINE).await
    }

    /// Deletes a quarantined object. Returns false if it was already gone.
    pub async fn remove_quarantined(&self, key: &str) -> Result<bool, StorageError> {
        remove_if_exists(&self.path(QUARANTINE, key)?).await
    }

    pub async fn read_public(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path(PUBLIC, key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

async fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_validation() {
        assert!(is_valid_key(&new_storage_key()));
        assert!(is_valid_key("abc_DEF-123"));
        assert!(!is_valid_key("../secret"));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key(""));
    }

    #[tokio::test]
    async fn quarantine_then_promote() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.ensure_layout().await.unwrap();

        storage.write_quarantined("obj1", b"payload").await.unwrap();
        assert!(matches!(storage.read_public("obj1").await, Err(StorageError::NotFound(_))));

        storage.promote("obj1").await.unwrap();
        assert_eq!(storage.read_public("obj1").await.unwrap(), b"payload");
        assert!(!storage.remove_quarantined("obj1").await.unwrap());
    }

    #[tokio::test]
    async fn demote_returns_object_to_quarantine() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.write_quarantined("obj3", b"payload").await.unwrap();
        storage.promote("obj3").await.unwrap();

        storage.demote("obj3").await.unwrap();
        assert!(matches!(storage.read_public("obj3").await, Err(StorageError::NotFound(_))));
        storage.promote("obj3").await.unwrap();
        assert_eq!(storage.read_public("obj3").await.unwrap(), b"payload");
        assert!(matches!(storage.demote("missing").await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn removing_missing_object_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.write_quarantined("obj2", b"x").await.unwrap();
        assert!(storage.remove_quarantined("obj2").await.unwrap());
        assert!(!storage.remove_quarantined("obj2").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_keys_never_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.write_quarantined("../escape", b"x").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.promote("..").await, Err(StorageError::InvalidKey(_))));
    }
}

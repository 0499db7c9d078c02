//! Durable side of a collection: one JSON array per file, rewritten in full.

use crate::core::{Document, Record, Result, StoreError};
use async_trait::async_trait;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::debug;

/// Storage seam between the store facade and the medium holding the
/// collection snapshot.
#[async_trait]
pub trait SnapshotStorage<D: Document>: Send + Sync {
    /// Prepares the medium before the first load (e.g. creates directories).
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    /// Reads every stored record. Absent storage yields an empty vector;
    /// unreadable or malformed storage is a `Persistence` error.
    async fn load(&self) -> Result<Vec<Record<D>>>;

    /// Replaces the stored contents with `records`.
    async fn persist(&self, records: Vec<Record<D>>) -> Result<()>;

    /// Where the data lives, for logs and stats.
    fn location(&self) -> String;
}

// ============================================================================
// JSON file storage
// ============================================================================

#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
    pretty: bool,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pretty: true,
        }
    }

    /// Indented (default) or compact output.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn encode<D: Document>(&self, records: &[Record<D>]) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(records)
        } else {
            serde_json::to_vec(records)
        };
        let mut bytes = encoded.map_err(|e| {
            StoreError::persistence(format!(
                "Failed to serialize '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

#[async_trait]
impl<D: Document> SnapshotStorage<D> for JsonFileStorage {
    async fn prepare(&self) -> Result<()> {
        ensure_parent_dir(&self.path).await
    }

    async fn load(&self) -> Result<Vec<Record<D>>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::persistence(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::persistence(format!(
                "Malformed data in '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn persist(&self, records: Vec<Record<D>>) -> Result<()> {
        let bytes = self.encode(&records)?;
        ensure_parent_dir(&self.path).await?;

        let path = self.path.clone();
        let written = bytes.len();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StoreError::persistence(format!("Write task failed: {}", e)))??;

        debug!(
            path = %self.path.display(),
            records = records.len(),
            bytes = written,
            "collection persisted"
        );
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

async fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            StoreError::persistence(format!(
                "Failed to create directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }
    Ok(())
}

/// Temp file in the target directory, fsync, rename over the target.
fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| {
        StoreError::persistence(format!(
            "Failed to create temp file in '{}': {}",
            dir.display(),
            e
        ))
    })?;
    temp.write_all(bytes)
        .and_then(|_| carry_permissions(path, temp.as_file()))
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| {
            StoreError::persistence(format!(
                "Failed to write temp file for '{}': {}",
                path.display(),
                e
            ))
        })?;
    temp.persist(path).map_err(|e| {
        StoreError::persistence(format!(
            "Failed to replace '{}': {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

/// Gives the replacement the target's permissions, or 0644 for a new file.
/// The temp file itself is created owner-only.
fn carry_permissions(target: &Path, file: &File) -> io::Result<()> {
    match std::fs::metadata(target) {
        Ok(meta) => file.set_permissions(meta.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => set_default_permissions(file),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn set_default_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tag {
        label: String,
    }

    impl Document for Tag {
        const UNIQUE_FIELD: &'static str = "label";

        fn unique_key(&self) -> &str {
            &self.label
        }
    }

    fn tag(label: &str) -> Record<Tag> {
        Record::new(Tag {
            label: label.to_string(),
        })
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::new(temp_dir.path().join("tags.json"));

        let records: Vec<Record<Tag>> = storage.load().await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn persist_creates_directories_and_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/deeper/tags.json");
        let storage = JsonFileStorage::new(&path);
        let records = vec![tag("rust"), tag("json")];

        storage.persist(records.clone()).await.unwrap();
        assert!(path.exists());

        let loaded: Vec<Record<Tag>> = storage.load().await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn persisted_file_is_a_plain_json_array() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tags.json");
        let storage = JsonFileStorage::new(&path).pretty(false);

        storage.persist(vec![tag("rust")]).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["label"], "rust");
        assert!(items[0]["createdAt"].is_string());
        assert!(!raw.trim_end().contains('\n'));
    }

    #[tokio::test]
    async fn persist_replaces_previous_contents() {
        let temp_dir = TempDir::new().unwrap();
        let storage = JsonFileStorage::new(temp_dir.path().join("tags.json"));

        storage.persist(vec![tag("a"), tag("b")]).await.unwrap();
        storage.persist(vec![tag("c")]).await.unwrap();

        let loaded: Vec<Record<Tag>> = storage.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fields.label, "c");
    }

    #[tokio::test]
    async fn malformed_file_is_a_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tags.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let result: Result<Vec<Record<Tag>>> = JsonFileStorage::new(&path).load().await;
        assert!(result.unwrap_err().is_persistence());
    }

    #[tokio::test]
    async fn unwritable_target_is_a_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tags.json");
        std::fs::create_dir(&path).unwrap();

        let err = JsonFileStorage::new(&path)
            .persist(vec![tag("rust")])
            .await
            .unwrap_err();
        assert!(err.is_persistence());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rewrite_keeps_existing_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tags.json");
        std::fs::write(&path, b"[]").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

        JsonFileStorage::new(&path)
            .persist(vec![tag("rust")])
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn new_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tags.json");

        JsonFileStorage::new(&path)
            .persist(vec![tag("rust")])
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}

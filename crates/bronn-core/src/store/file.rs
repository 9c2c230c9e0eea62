// # File Snapshot Store
//
// File-based implementation of SnapshotStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Recovery: Falls back to backup if corruption detected
//
// ## Write Discipline
//
// A mutation is applied to a copy of the image, the copy is written to disk,
// and only then does the copy replace the in-memory image. A failed write
// leaves both disk and memory at the previous state.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "updated_at": "2025-01-09T12:00:00Z",
//   "guilds": { "42": { "guild_id": 42, "mod_log": 1234, ... } },
//   "filters": { "42": [".png", ".jpg"] }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{FilterRecord, GuildConfigRecord, GuildId};
use crate::traits::snapshot_store::{GuildConfigStream, SnapshotStore, SnapshotStoreFactory};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// In-memory image of the store file
#[derive(Debug, Clone, Default)]
struct StoreImage {
    guilds: BTreeMap<GuildId, GuildConfigRecord>,
    filters: BTreeMap<GuildId, Vec<String>>,
}

/// Serializable store file format
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    #[serde(default)]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    guilds: BTreeMap<GuildId, GuildConfigRecord>,
    #[serde(default)]
    filters: BTreeMap<GuildId, Vec<String>>,
}

/// File-based snapshot store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use bronn_core::model::{GuildConfigRecord, GuildId};
/// use bronn_core::store::FileStore;
/// use bronn_core::traits::SnapshotStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/bronn/guilds.json").await?;
///     store.upsert_guild_config(&GuildConfigRecord::new(GuildId(42))).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    image: Arc<RwLock<StoreImage>>,
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Try to load the existing store file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let image = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            image: Arc::new(RwLock::new(image)),
        })
    }

    /// Load the image with automatic recovery from backup
    async fn load_with_recovery(path: &Path) -> Result<StoreImage, Error> {
        match Self::load(path).await {
            Ok(image) => {
                tracing::debug!(
                    "Loaded store file: {} guild rows, {} filter rows",
                    image.guilds.len(),
                    image.filters.len()
                );
                Ok(image)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(StoreImage::default());
                }

                match Self::load(&backup_path).await {
                    Ok(image) => {
                        tracing::info!(
                            "Recovered store from backup: {} guild rows",
                            image.guilds.len()
                        );
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(image)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty state.",
                            backup_err
                        );
                        Ok(StoreImage::default())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Load the image from a file. A missing file is an empty image.
    async fn load(path: &Path) -> Result<StoreImage, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(StoreImage::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            ))
        })?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(StoreImage {
            guilds: file.guilds,
            filters: file.filters,
        })
    }

    /// Apply `mutate` to a copy of the image, persist it, then commit it
    async fn commit<F>(&self, mutate: F) -> Result<(), Error>
    where
        F: FnOnce(&mut StoreImage),
    {
        let mut guard = self.image.write().await;
        let mut next = guard.clone();
        mutate(&mut next);
        self.write_image(&next).await?;
        *guard = next;
        Ok(())
    }

    /// Write an image to disk atomically
    async fn write_image(&self, image: &StoreImage) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            updated_at: Some(chrono::Utc::now()),
            guilds: image.guilds.clone(),
            filters: image.filters.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::persistence(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.flush().await.map_err(|e| {
                Error::persistence(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::persistence(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl SnapshotStore for FileStore {
    async fn get_guild_config(&self, guild_id: GuildId) -> Result<Option<GuildConfigRecord>, Error> {
        let guard = self.image.read().await;
        Ok(guard.guilds.get(&guild_id).cloned())
    }

    async fn upsert_guild_config(&self, record: &GuildConfigRecord) -> Result<(), Error> {
        let record = record.clone();
        self.commit(move |image| {
            image.guilds.insert(record.guild_id, record);
        })
        .await
    }

    async fn delete_guild_config(&self, guild_id: GuildId) -> Result<(), Error> {
        if !self.image.read().await.guilds.contains_key(&guild_id) {
            return Ok(());
        }
        self.commit(move |image| {
            image.guilds.remove(&guild_id);
        })
        .await
    }

    async fn get_filter_record(&self, guild_id: GuildId) -> Result<Option<FilterRecord>, Error> {
        let guard = self.image.read().await;
        Ok(guard
            .filters
            .get(&guild_id)
            .map(|exts| FilterRecord::from_extensions(guild_id, exts)))
    }

    async fn upsert_filter_record(&self, guild_id: GuildId, extensions: &[String]) -> Result<(), Error> {
        let extensions = extensions.to_vec();
        self.commit(move |image| {
            image.filters.insert(guild_id, extensions);
        })
        .await
    }

    async fn list_all_guild_configs(&self) -> Result<GuildConfigStream, Error> {
        let guard = self.image.read().await;
        let rows: Vec<Result<GuildConfigRecord, Error>> =
            guard.guilds.values().cloned().map(Ok).collect();
        Ok(Box::pin(tokio_stream::iter(rows)))
    }

    async fn flush(&self) -> Result<(), Error> {
        // Every commit is written immediately
        Ok(())
    }
}

/// Factory for [`FileStore`]
///
/// Expects the serialized `StoreConfig::File` form: `{"type": "file", "path": "..."}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStoreFactory;

#[async_trait]
impl SnapshotStoreFactory for FileStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn SnapshotStore>, Error> {
        let path = config
            .get("path")
            .and_then(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::config("File store requires a non-empty `path`"))?;
        Ok(Box::new(FileStore::new(path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChannelId;
    use tempfile::tempdir;

    fn record(id: u64, mod_log: u64) -> GuildConfigRecord {
        let mut record = GuildConfigRecord::new(GuildId(id));
        record.mod_log = ChannelId(mod_log);
        record
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guilds.json");

        let store = FileStore::new(&path).await.unwrap();
        store.upsert_guild_config(&record(42, 7)).await.unwrap();
        store
            .upsert_filter_record(GuildId(42), &[".png".to_string()])
            .await
            .unwrap();
        assert!(path.exists());

        let store2 = FileStore::new(&path).await.unwrap();
        assert_eq!(
            store2.get_guild_config(GuildId(42)).await.unwrap(),
            Some(record(42, 7))
        );
        let filters = store2.get_filter_record(GuildId(42)).await.unwrap().unwrap();
        assert!(filters.contains("png"));
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guilds.json");

        let store = FileStore::new(&path).await.unwrap();
        store.upsert_guild_config(&record(1, 10)).await.unwrap();
        store.upsert_guild_config(&record(1, 11)).await.unwrap();

        let backup_path = FileStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileStore::new(&path).await.unwrap();
        // The backup holds the state before the last write
        assert_eq!(
            recovered.get_guild_config(GuildId(1)).await.unwrap(),
            Some(record(1, 10))
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_image_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guilds.json");

        let store = FileStore::new(&path).await.unwrap();
        store.upsert_guild_config(&record(1, 10)).await.unwrap();

        // Block the rename target's temp file by turning it into a directory
        fs::create_dir(store.temp_path()).await.unwrap();

        let err = store.upsert_guild_config(&record(1, 99)).await.unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(
            store.get_guild_config(GuildId(1)).await.unwrap(),
            Some(record(1, 10))
        );
    }
}

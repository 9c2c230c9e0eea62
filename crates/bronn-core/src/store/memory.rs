// # Memory Snapshot Store
//
// In-memory implementation of SnapshotStore.
//
// ## Purpose
//
// Provides a fast store that doesn't persist across restarts. Useful for
// tests and for deployments where guild settings are re-entered after a
// restart.
//
// ## Crash Behavior
//
// - All rows are lost on restart/crash
// - Every guild comes back default-configured

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::model::{FilterRecord, GuildConfigRecord, GuildId};
use crate::traits::snapshot_store::{GuildConfigStream, SnapshotStore, SnapshotStoreFactory};

#[derive(Debug, Default)]
struct MemoryState {
    guilds: HashMap<GuildId, GuildConfigRecord>,
    filters: HashMap<GuildId, Vec<String>>,
}

/// In-memory snapshot store
///
/// Clones share the same underlying rows.
///
/// # Example
///
/// ```rust,no_run
/// use bronn_core::model::{GuildConfigRecord, GuildId};
/// use bronn_core::store::MemoryStore;
/// use bronn_core::traits::SnapshotStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///     store.upsert_guild_config(&GuildConfigRecord::new(GuildId(1))).await?;
///     assert!(store.get_guild_config(GuildId(1)).await?.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of guild configuration rows
    pub async fn guild_count(&self) -> usize {
        self.inner.read().await.guilds.len()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn get_guild_config(&self, guild_id: GuildId) -> Result<Option<GuildConfigRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.guilds.get(&guild_id).cloned())
    }

    async fn upsert_guild_config(&self, record: &GuildConfigRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.guilds.insert(record.guild_id, record.clone());
        Ok(())
    }

    async fn delete_guild_config(&self, guild_id: GuildId) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.guilds.remove(&guild_id);
        Ok(())
    }

    async fn get_filter_record(&self, guild_id: GuildId) -> Result<Option<FilterRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard
            .filters
            .get(&guild_id)
            .map(|exts| FilterRecord::from_extensions(guild_id, exts)))
    }

    async fn upsert_filter_record(&self, guild_id: GuildId, extensions: &[String]) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.filters.insert(guild_id, extensions.to_vec());
        Ok(())
    }

    async fn list_all_guild_configs(&self) -> Result<GuildConfigStream, Error> {
        let guard = self.inner.read().await;
        let rows: Vec<Result<GuildConfigRecord, Error>> =
            guard.guilds.values().cloned().map(Ok).collect();
        Ok(Box::pin(tokio_stream::iter(rows)))
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing is buffered
        Ok(())
    }
}

/// Factory for [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreFactory;

#[async_trait]
impl SnapshotStoreFactory for MemoryStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn SnapshotStore>, Error> {
        Ok(Box::new(MemoryStore::new()))
    }
}

//! Filter list cache
//!
//! Unlike the guild config cache, filter rows are never warmed in bulk.
//! Each guild is hydrated from the store the first time it is touched.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{HYDRATION_WARN_INTERVAL, Slot, Slots, WarnThrottle};
use crate::error::{Error, Result};
use crate::model::{FilterRecord, GuildId, normalize_extension};
use crate::traits::SnapshotStore;

/// Result of an idempotent filter mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChange {
    /// The list changed; carries the normalized extension
    Applied(String),
    /// The list already had the requested shape
    Unchanged(String),
}

impl FilterChange {
    /// Normalized extension the command referred to
    pub fn extension(&self) -> &str {
        match self {
            FilterChange::Applied(ext) | FilterChange::Unchanged(ext) => ext,
        }
    }

    /// Whether the store was written
    pub fn is_applied(&self) -> bool {
        matches!(self, FilterChange::Applied(_))
    }
}

struct Inner {
    store: Arc<dyn SnapshotStore>,
    records: DashMap<GuildId, FilterRecord>,
    slots: Slots,
    warnings: WarnThrottle,
}

/// Write-through cache of per-guild allowed file extensions
#[derive(Clone)]
pub struct FilterCache {
    inner: Arc<Inner>,
}

impl FilterCache {
    /// Create an empty cache over a store
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                records: DashMap::new(),
                slots: Slots::default(),
                warnings: WarnThrottle::new(HYDRATION_WARN_INTERVAL),
            }),
        }
    }

    /// Current filter list of a guild, empty while unhydrated
    pub fn get(&self, guild_id: GuildId) -> FilterRecord {
        if let Some(record) = self.inner.records.get(&guild_id) {
            return record.clone();
        }
        if !self.inner.slots.is_hydrated(guild_id) {
            self.spawn_hydration(guild_id);
        }
        FilterRecord::new(guild_id)
    }

    /// Whether an extension is allowed in a guild
    pub fn contains(&self, guild_id: GuildId, extension: &str) -> bool {
        match self.inner.records.get(&guild_id) {
            Some(record) => record.contains(extension),
            None => {
                if !self.inner.slots.is_hydrated(guild_id) {
                    self.spawn_hydration(guild_id);
                }
                false
            }
        }
    }

    /// Allowed extensions of a guild, sorted, after hydration
    pub async fn list(&self, guild_id: GuildId) -> Result<Vec<String>> {
        let slot = self.inner.slots.slot(guild_id);
        self.hydrate(guild_id, &slot).await?;

        let mut extensions = self.cached_or_empty(guild_id).extensions().to_vec();
        extensions.sort();
        Ok(extensions)
    }

    /// Add an extension to a guild's list
    ///
    /// Appending an extension that is already present succeeds without a
    /// store write.
    ///
    /// # Returns
    ///
    /// - `Ok(FilterChange)`: Whether the list changed
    /// - `Err(Error::InvalidInput)`: The extension is malformed
    /// - `Err(Error::Persistence)`: The store rejected the write; the cached
    ///   list is unchanged
    pub async fn append(&self, guild_id: GuildId, extension: &str) -> Result<FilterChange> {
        let ext = Self::normalize(extension)?;
        self.mutate(guild_id, ext, |record, ext| record.insert_normalized(ext.to_string()))
            .await
    }

    /// Remove an extension from a guild's list
    ///
    /// Removing an absent extension succeeds without a store write.
    pub async fn remove(&self, guild_id: GuildId, extension: &str) -> Result<FilterChange> {
        let ext = Self::normalize(extension)?;
        self.mutate(guild_id, ext, |record, ext| record.remove_normalized(ext))
            .await
    }

    /// Discard the cached list and reload it from the store
    pub async fn resync(&self, guild_id: GuildId) -> Result<FilterRecord> {
        let slot = self.inner.slots.slot(guild_id);
        let _guard = slot.write.lock().await;

        let fetched = self
            .inner
            .store
            .get_filter_record(guild_id)
            .await
            .map_err(Error::into_persistence)?;
        let record = fetched.unwrap_or_else(|| FilterRecord::new(guild_id));
        self.inner.records.insert(guild_id, record.clone());
        slot.mark_hydrated();

        info!(
            "Resynced filter list of guild {} ({} extension(s))",
            guild_id,
            record.len()
        );
        Ok(record)
    }

    /// Drop a guild's cached list
    pub fn evict(&self, guild_id: GuildId) {
        self.inner.records.remove(&guild_id);
        self.inner.slots.remove(guild_id);
    }

    fn normalize(extension: &str) -> Result<String> {
        normalize_extension(extension)
            .ok_or_else(|| Error::invalid_input(format!("'{}' is not a file extension", extension)))
    }

    async fn mutate<F>(&self, guild_id: GuildId, ext: String, apply: F) -> Result<FilterChange>
    where
        F: FnOnce(&mut FilterRecord, &str) -> bool,
    {
        let slot = self.inner.slots.slot(guild_id);
        let _guard = slot.write.lock().await;
        self.hydrate(guild_id, &slot).await?;

        let mut next = self.cached_or_empty(guild_id);
        if !apply(&mut next, &ext) {
            debug!("Filter list of guild {} already settled for {}", guild_id, ext);
            return Ok(FilterChange::Unchanged(ext));
        }

        self.inner
            .store
            .upsert_filter_record(guild_id, next.extensions())
            .await
            .map_err(Error::into_persistence)?;
        self.inner.records.insert(guild_id, next);

        debug!("Filter list of guild {} updated for {}", guild_id, ext);
        Ok(FilterChange::Applied(ext))
    }

    fn cached_or_empty(&self, guild_id: GuildId) -> FilterRecord {
        self.inner
            .records
            .get(&guild_id)
            .map(|r| r.clone())
            .unwrap_or_else(|| FilterRecord::new(guild_id))
    }

    async fn hydrate(&self, guild_id: GuildId, slot: &Slot) -> Result<()> {
        let inner = &self.inner;
        slot.hydrate(|| async move {
            let fetched = inner
                .store
                .get_filter_record(guild_id)
                .await
                .map_err(Error::into_persistence)?;
            if let Some(record) = fetched {
                inner.records.insert(guild_id, record);
            }
            Ok(())
        })
        .await
    }

    fn spawn_hydration(&self, guild_id: GuildId) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let slot = self.inner.slots.slot(guild_id);
        if !slot.try_begin_background() {
            return;
        }
        let cache = self.clone();
        handle.spawn(async move {
            let result = cache.hydrate(guild_id, &slot).await;
            slot.end_background();
            if let Err(e) = result {
                cache.inner.warnings.hydration_failed("Background filter hydration", guild_id, &e);
            }
        });
    }
}

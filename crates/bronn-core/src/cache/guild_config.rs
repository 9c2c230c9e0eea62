//! Guild configuration cache
//!
//! Eagerly warmed at startup by [`GuildConfigCache::bulk_load`], then kept in
//! step with the store by write-through setters. A guild missing from the
//! warm-up pass reads as default-configured.

use dashmap::DashMap;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::{HYDRATION_WARN_INTERVAL, Slot, Slots, WarnThrottle};
use crate::error::{Error, Result};
use crate::model::{ChannelId, GuildConfigRecord, GuildId, LogCategory};
use crate::traits::SnapshotStore;

/// A single settable field of a guild record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigField {
    /// Route a log category to a channel (zero unsets it)
    LogChannel(LogCategory, ChannelId),
    /// Master audit logging switch
    LoggingEnabled(bool),
    /// Automatic moderation switch
    AutomodEnabled(bool),
    /// Bot blacklist status, with an optional new reason
    Blacklisted {
        /// New status
        blacklisted: bool,
        /// Replacement reason; `None` keeps the current one
        reason: Option<String>,
    },
    /// Premium tier
    Premium(bool),
}

impl ConfigField {
    fn apply(self, record: &mut GuildConfigRecord) {
        match self {
            ConfigField::LogChannel(category, channel) => record.set_log_channel(category, channel),
            ConfigField::LoggingEnabled(on) => record.logging_enabled = on,
            ConfigField::AutomodEnabled(on) => record.automod_enabled = on,
            ConfigField::Blacklisted {
                blacklisted,
                reason,
            } => {
                record.blacklisted = blacklisted;
                if let Some(reason) = reason {
                    record.blacklist_reason = reason;
                }
            }
            ConfigField::Premium(on) => record.premium = on,
        }
    }
}

struct Inner {
    store: Arc<dyn SnapshotStore>,
    records: DashMap<GuildId, GuildConfigRecord>,
    slots: Slots,
    warnings: WarnThrottle,
}

/// Write-through cache of guild configuration records
///
/// Cloning is cheap and clones share the same cache.
///
/// # Example
///
/// ```rust,no_run
/// use bronn_core::cache::{ConfigField, GuildConfigCache};
/// use bronn_core::model::{ChannelId, GuildId, LogCategory};
/// use bronn_core::store::MemoryStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> bronn_core::Result<()> {
///     let cache = GuildConfigCache::new(Arc::new(MemoryStore::new()));
///     cache.bulk_load().await?;
///
///     cache
///         .set(GuildId(42), ConfigField::LogChannel(LogCategory::Moderation, ChannelId(7)))
///         .await?;
///     assert_eq!(cache.get(GuildId(42)).mod_log, ChannelId(7));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct GuildConfigCache {
    inner: Arc<Inner>,
}

impl GuildConfigCache {
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

    /// Current record of a guild
    ///
    /// Never fails. An unseen guild reads as [`GuildConfigRecord::new`] and a
    /// background hydration is started (inside a tokio runtime).
    pub fn get(&self, guild_id: GuildId) -> GuildConfigRecord {
        if let Some(record) = self.inner.records.get(&guild_id) {
            return record.clone();
        }
        if !self.inner.slots.is_hydrated(guild_id) {
            self.spawn_hydration(guild_id);
        }
        GuildConfigRecord::new(guild_id)
    }

    /// Current record of a guild, waiting for hydration first
    ///
    /// Falls back to the cached or default record if the store is unreachable.
    pub async fn get_hydrated(&self, guild_id: GuildId) -> GuildConfigRecord {
        let slot = self.inner.slots.slot(guild_id);
        if let Err(e) = self.hydrate(guild_id, &slot).await {
            self.inner.warnings.hydration_failed("Hydration", guild_id, &e);
        }
        self.cached_or_default(guild_id)
    }

    /// Configured channel of a log category
    pub fn log_channel(&self, guild_id: GuildId, category: LogCategory) -> ChannelId {
        self.get(guild_id).log_channel(category)
    }

    /// Whether the guild is blacklisted from using the bot
    pub fn is_blacklisted(&self, guild_id: GuildId) -> bool {
        self.get(guild_id).blacklisted
    }

    /// Write one field through to the store, then to the cache
    ///
    /// # Returns
    ///
    /// - `Ok(record)`: The committed record
    /// - `Err(Error::Persistence)`: The store rejected the write or hydration;
    ///   the cached record is unchanged
    pub async fn set(&self, guild_id: GuildId, field: ConfigField) -> Result<GuildConfigRecord> {
        let slot = self.inner.slots.slot(guild_id);
        let _guard = slot.write.lock().await;
        self.hydrate(guild_id, &slot).await?;

        let current = self.cached_or_default(guild_id);
        let mut next = current.clone();
        field.apply(&mut next);

        if next == current && self.inner.records.contains_key(&guild_id) {
            debug!("Guild {} config unchanged, skipping write", guild_id);
            return Ok(next);
        }

        // The cache is only touched after the store acknowledges, so a
        // failed write leaves nothing to roll back.
        self.inner
            .store
            .upsert_guild_config(&next)
            .await
            .map_err(Error::into_persistence)?;
        self.inner.records.insert(guild_id, next.clone());

        debug!("Guild {} config committed", guild_id);
        Ok(next)
    }

    /// Populate the cache from every persisted row
    ///
    /// Guilds already hydrated by an earlier access keep their cached record.
    /// Unreadable rows are skipped with a warning.
    ///
    /// # Returns
    ///
    /// The number of rows loaded into the cache.
    pub async fn bulk_load(&self) -> Result<usize> {
        let mut rows = self
            .inner
            .store
            .list_all_guild_configs()
            .await
            .map_err(Error::into_persistence)?;

        let mut loaded = 0;
        while let Some(row) = rows.next().await {
            match row {
                Ok(record) => {
                    let slot = self.inner.slots.slot(record.guild_id);
                    if slot.mark_hydrated() {
                        self.inner.records.insert(record.guild_id, record);
                        loaded += 1;
                    }
                }
                Err(e) => warn!("Skipping unreadable guild row during bulk load: {}", e),
            }
        }

        info!("Guild config cache warmed with {} guild(s)", loaded);
        Ok(loaded)
    }

    /// Ensure a persisted row exists for a guild the bot just joined
    pub async fn on_guild_join(&self, guild_id: GuildId) -> Result<GuildConfigRecord> {
        let slot = self.inner.slots.slot(guild_id);
        let _guard = slot.write.lock().await;
        self.hydrate(guild_id, &slot).await?;

        if let Some(record) = self.inner.records.get(&guild_id) {
            info!("Guild {} re-joined, keeping existing config", guild_id);
            return Ok(record.clone());
        }

        let record = GuildConfigRecord::new(guild_id);
        self.inner
            .store
            .upsert_guild_config(&record)
            .await
            .map_err(Error::into_persistence)?;
        self.inner.records.insert(guild_id, record.clone());
        info!("Joined guild {}, created default config", guild_id);
        Ok(record)
    }

    /// Delete a guild's row after the guild left the platform
    pub async fn on_guild_remove(&self, guild_id: GuildId) -> Result<()> {
        let slot = self.inner.slots.slot(guild_id);
        let _guard = slot.write.lock().await;

        self.inner
            .store
            .delete_guild_config(guild_id)
            .await
            .map_err(Error::into_persistence)?;
        self.inner.records.remove(&guild_id);
        self.inner.slots.remove(guild_id);
        info!("Removed config of guild {}", guild_id);
        Ok(())
    }

    /// Number of guilds with a cached record
    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    /// Whether no guild has a cached record
    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }

    fn cached_or_default(&self, guild_id: GuildId) -> GuildConfigRecord {
        self.inner
            .records
            .get(&guild_id)
            .map(|r| r.clone())
            .unwrap_or_else(|| GuildConfigRecord::new(guild_id))
    }

    async fn hydrate(&self, guild_id: GuildId, slot: &Slot) -> Result<()> {
        let inner = &self.inner;
        slot.hydrate(|| async move {
            let fetched = inner
                .store
                .get_guild_config(guild_id)
                .await
                .map_err(Error::into_persistence)?;
            if let Some(record) = fetched {
                inner.records.insert(guild_id, record);
            }
            debug!("Hydrated guild {} config", guild_id);
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
                cache.inner.warnings.hydration_failed("Background hydration", guild_id, &e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_unseen_guild_reads_default() {
        let cache = GuildConfigCache::new(Arc::new(MemoryStore::new()));
        let record = cache.get(GuildId(1));
        assert_eq!(record, GuildConfigRecord::new(GuildId(1)));
        assert!(cache.log_channel(GuildId(1), LogCategory::Message).is_unset());
        assert!(!cache.is_blacklisted(GuildId(1)));
    }

    #[tokio::test]
    async fn test_set_writes_through() {
        let store = Arc::new(MemoryStore::new());
        let cache = GuildConfigCache::new(store.clone());

        cache
            .set(GuildId(5), ConfigField::LogChannel(LogCategory::Automod, ChannelId(9)))
            .await
            .unwrap();
        cache
            .set(GuildId(5), ConfigField::LoggingEnabled(true))
            .await
            .unwrap();

        let persisted = store.get_guild_config(GuildId(5)).await.unwrap().unwrap();
        assert_eq!(persisted.automod_log, ChannelId(9));
        assert!(persisted.logging_enabled);
        assert_eq!(cache.get(GuildId(5)), persisted);
    }

    #[tokio::test]
    async fn test_blacklist_reason_kept_when_not_given() {
        let cache = GuildConfigCache::new(Arc::new(MemoryStore::new()));
        let record = cache
            .set(
                GuildId(2),
                ConfigField::Blacklisted {
                    blacklisted: true,
                    reason: None,
                },
            )
            .await
            .unwrap();
        assert!(record.blacklisted);
        assert_eq!(record.blacklist_reason, "Violating TOS");
    }

    #[tokio::test]
    async fn test_get_hydrated_reads_store() {
        let store = Arc::new(MemoryStore::new());
        let mut row = GuildConfigRecord::new(GuildId(8));
        row.premium = true;
        store.upsert_guild_config(&row).await.unwrap();

        let cache = GuildConfigCache::new(store);
        assert_eq!(cache.get_hydrated(GuildId(8)).await, row);
    }

    #[tokio::test]
    async fn test_guild_join_and_remove() {
        let store = Arc::new(MemoryStore::new());
        let cache = GuildConfigCache::new(store.clone());

        cache.on_guild_join(GuildId(3)).await.unwrap();
        assert_eq!(store.guild_count().await, 1);

        cache.set(GuildId(3), ConfigField::Premium(true)).await.unwrap();
        let rejoined = cache.on_guild_join(GuildId(3)).await.unwrap();
        assert!(rejoined.premium);

        cache.on_guild_remove(GuildId(3)).await.unwrap();
        assert_eq!(store.guild_count().await, 0);
        assert!(cache.is_empty());
    }
}

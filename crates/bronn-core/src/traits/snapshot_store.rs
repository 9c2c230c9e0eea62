// # Snapshot Store Trait
//
// Defines the interface to the durable backend holding guild configuration
// and filter-list rows.
//
// ## Purpose
//
// The caches are write-through mirrors of this store:
// - Every mutation is written here before the in-memory copy changes
// - Cache misses hydrate from here
// - Startup warm-up streams every guild row from here
//
// ## Implementations
//
// - Memory: `MemoryStore` (tests, ephemeral deployments)
// - File: `FileStore` (JSON with atomic writes and backup recovery)

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::model::{FilterRecord, GuildConfigRecord, GuildId};

/// Stream of guild rows used for bulk cache warm-up
pub type GuildConfigStream =
    Pin<Box<dyn Stream<Item = Result<GuildConfigRecord, crate::Error>> + Send + 'static>>;

/// Trait for snapshot store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage (files, databases, etc.)
/// - ✅ Implement locking/concurrency control for thread safety
///
/// ## Forbidden Capabilities
/// - ❌ Cache rows for callers (owned by the guild and filter caches)
/// - ❌ Emit audit records (owned by `AuditRouter`)
/// - ❌ Retry failed writes (the caller rejects the command instead)
///
/// A failed write must leave the persisted row unchanged. The caches rely on
/// this to keep memory and store in agreement.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Fetch the configuration row of a guild
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: The persisted row
    /// - `Ok(None)`: The guild has no row
    /// - `Err(Error)`: Storage error
    async fn get_guild_config(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<GuildConfigRecord>, crate::Error>;

    /// Create or replace the configuration row of `record.guild_id`
    async fn upsert_guild_config(&self, record: &GuildConfigRecord) -> Result<(), crate::Error>;

    /// Delete the configuration row of a guild (ok if it didn't exist)
    async fn delete_guild_config(&self, guild_id: GuildId) -> Result<(), crate::Error>;

    /// Fetch the filter row of a guild
    async fn get_filter_record(
        &self,
        guild_id: GuildId,
    ) -> Result<Option<FilterRecord>, crate::Error>;

    /// Create or replace the filter row of a guild
    ///
    /// `extensions` is the full array column, already normalized and unique.
    async fn upsert_filter_record(
        &self,
        guild_id: GuildId,
        extensions: &[String],
    ) -> Result<(), crate::Error>;

    /// Stream every guild configuration row
    async fn list_all_guild_configs(&self) -> Result<GuildConfigStream, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing snapshot stores from configuration
#[async_trait]
pub trait SnapshotStoreFactory: Send + Sync {
    /// Create a SnapshotStore instance from its JSON configuration
    async fn create(
        &self,
        config: &serde_json::Value,
    ) -> Result<Box<dyn SnapshotStore>, crate::Error>;
}

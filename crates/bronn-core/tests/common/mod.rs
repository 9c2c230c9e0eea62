//! Test doubles and common utilities for contract tests
//!
//! These doubles stand in for the collaborators the core calls into: the
//! snapshot store, the channel sink and the permission check.

#![allow(dead_code)]

use async_trait::async_trait;
use bronn_core::audit::{AuditRouter, SuppressionLedger};
use bronn_core::cache::{FilterCache, GuildConfigCache};
use bronn_core::config::AuditConfig;
use bronn_core::error::{Error, Result};
use bronn_core::model::{ChannelId, EntityId, FilterRecord, GuildConfigRecord, GuildId};
use bronn_core::store::MemoryStore;
use bronn_core::traits::{
    ChannelSink, DeliveryError, GuildConfigStream, PermissionCheck, RenderedBlock, SnapshotStore,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Sink that records every delivery and can be told to fail
#[derive(Default)]
pub struct RecordingSink {
    deliveries: Mutex<Vec<(ChannelId, RenderedBlock)>>,
    attempts: AtomicUsize,
    failure: Mutex<Option<DeliveryError>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Reject every following delivery with `error`
    pub fn fail_with(&self, error: DeliveryError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Sleep inside every following delivery
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of `deliver` calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted deliveries, in order
    pub fn deliveries(&self) -> Vec<(ChannelId, RenderedBlock)> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Titles of accepted deliveries, in order
    pub fn titles(&self) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .map(|(_, block)| block.title)
            .collect()
    }
}

#[async_trait]
impl ChannelSink for RecordingSink {
    async fn deliver(
        &self,
        channel_id: ChannelId,
        block: &RenderedBlock,
    ) -> std::result::Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((channel_id, block.clone()));
        Ok(())
    }
}

/// Store wrapper that counts calls and can be switched to failing
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    guild_reads: AtomicUsize,
    filter_reads: AtomicUsize,
    writes: AtomicUsize,
    read_delay: Mutex<Option<Duration>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backing store, for seeding and inspecting rows directly
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Sleep inside every following single-row read
    pub fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = Some(delay);
    }

    pub fn guild_reads(&self) -> usize {
        self.guild_reads.load(Ordering::SeqCst)
    }

    pub fn filter_reads(&self) -> usize {
        self.filter_reads.load(Ordering::SeqCst)
    }

    /// Number of accepted upserts and deletes
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn before_read(&self) -> Result<()> {
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::persistence("store unreachable"));
        }
        Ok(())
    }

    fn before_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::persistence("constraint violated"));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for FlakyStore {
    async fn get_guild_config(&self, guild_id: GuildId) -> Result<Option<GuildConfigRecord>> {
        self.guild_reads.fetch_add(1, Ordering::SeqCst);
        self.before_read().await?;
        self.inner.get_guild_config(guild_id).await
    }

    async fn upsert_guild_config(&self, record: &GuildConfigRecord) -> Result<()> {
        self.before_write()?;
        self.inner.upsert_guild_config(record).await
    }

    async fn delete_guild_config(&self, guild_id: GuildId) -> Result<()> {
        self.before_write()?;
        self.inner.delete_guild_config(guild_id).await
    }

    async fn get_filter_record(&self, guild_id: GuildId) -> Result<Option<FilterRecord>> {
        self.filter_reads.fetch_add(1, Ordering::SeqCst);
        self.before_read().await?;
        self.inner.get_filter_record(guild_id).await
    }

    async fn upsert_filter_record(&self, guild_id: GuildId, extensions: &[String]) -> Result<()> {
        self.before_write()?;
        self.inner.upsert_filter_record(guild_id, extensions).await
    }

    async fn list_all_guild_configs(&self) -> Result<GuildConfigStream> {
        self.before_read().await?;
        self.inner.list_all_guild_configs().await
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Permission check with an explicit allow-list of actors
#[derive(Default)]
pub struct ModeratorsOnly {
    moderators: HashSet<EntityId>,
}

impl ModeratorsOnly {
    pub fn new(moderators: impl IntoIterator<Item = u64>) -> Arc<Self> {
        Arc::new(Self {
            moderators: moderators.into_iter().map(EntityId).collect(),
        })
    }
}

#[async_trait]
impl PermissionCheck for ModeratorsOnly {
    async fn can_manage_guild(&self, _guild_id: GuildId, actor: EntityId) -> bool {
        self.moderators.contains(&actor)
    }
}

/// Fully wired pipeline over a [`FlakyStore`] and a [`RecordingSink`]
pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub sink: Arc<RecordingSink>,
    pub guilds: GuildConfigCache,
    pub filters: FilterCache,
    pub router: AuditRouter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_audit_config(AuditConfig::default())
    }

    pub fn with_audit_config(audit: AuditConfig) -> Self {
        let store = FlakyStore::new();
        let sink = RecordingSink::new();
        let guilds = GuildConfigCache::new(store.clone());
        let filters = FilterCache::new(store.clone());
        let router = AuditRouter::new(
            guilds.clone(),
            SuppressionLedger::new(Duration::from_secs(30)),
            sink.clone(),
            audit,
        );
        Self {
            store,
            sink,
            guilds,
            filters,
            router,
        }
    }

    pub fn ledger(&self) -> &SuppressionLedger {
        self.router.ledger()
    }

    /// Point every log category of `guild` at `channel` and enable logging
    pub async fn configure_logging(&self, guild: u64, channel: u64) {
        use bronn_core::cache::ConfigField;
        use bronn_core::model::LogCategory;

        for category in LogCategory::ALL {
            self.guilds
                .set(
                    GuildId(guild),
                    ConfigField::LogChannel(category, ChannelId(channel)),
                )
                .await
                .unwrap();
        }
        self.guilds
            .set(GuildId(guild), ConfigField::LoggingEnabled(true))
            .await
            .unwrap();
    }
}

/// Snapshot from a JSON object literal
pub fn snapshot(value: serde_json::Value) -> bronn_core::diff::Snapshot {
    serde_json::from_value(value).unwrap()
}

//! Audit routing
//!
//! The [`AuditRouter`] turns an [`AuditRecord`] into at most one sink
//! delivery. Every step that does not deliver is an ordinary
//! [`AuditOutcome`], never an error, so audit logging can not fail the
//! operation that triggered it.
//!
//! # Routing steps
//!
//! 1. A live [`SuppressionLedger`] entry for the record's event and entity
//!    is consumed and the record is dropped.
//! 2. The destination channel is resolved from the guild config cache. An
//!    unset channel drops the record.
//! 3. A guild with logging switched off drops the record.
//! 4. A record with nothing to say is dropped.
//! 5. The body is rendered and capped, then handed to the sink once.
//!
//! Records of one guild and category pass through a FIFO lane, so they are
//! delivered in the order they were routed. Distinct lanes run concurrently.

pub mod ledger;
pub mod render;

pub use ledger::SuppressionLedger;
pub use render::{truncate_body, BULLET};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::GuildConfigCache;
use crate::config::AuditConfig;
use crate::model::{EntityId, GuildId, LogCategory};
use crate::traits::{ChannelSink, DeliveryError};

/// Platform event that produced an audit record
///
/// Also the category key of [`SuppressionLedger`] entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ChannelCreate,
    ChannelDelete,
    ChannelUpdate,
    RoleCreate,
    RoleDelete,
    RoleUpdate,
    GuildUpdate,
    MemberJoin,
    MemberRemove,
    MemberBan,
    MemberUnban,
    MemberUpdate,
    MessageDelete,
    MessageEdit,
    /// Marker armed by a logged cached edit, consumed by its raw echo
    MessageEditEcho,
    ThreadCreate,
    ThreadDelete,
    ThreadUpdate,
    /// A moderator changed the guild's filter list
    FilterUpdate,
}

impl EventKind {
    /// Log a record of this kind is routed to by default
    pub fn log_category(self) -> LogCategory {
        match self {
            EventKind::MemberJoin => LogCategory::Automod,
            EventKind::MessageDelete | EventKind::MessageEdit | EventKind::MessageEditEcho => {
                LogCategory::Message
            }
            _ => LogCategory::Moderation,
        }
    }
}

/// Content of an audit record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditBody {
    /// Pre-formatted text, rendered as is
    Text(String),
    /// Change lines, rendered as a bulleted list under an optional header
    Changes {
        /// Context shown above the list (entity mention, author)
        header: Option<String>,
        /// One line per change
        lines: Vec<String>,
    },
}

impl AuditBody {
    /// Whether there is nothing to log
    pub fn is_empty(&self) -> bool {
        match self {
            AuditBody::Text(text) => text.trim().is_empty(),
            AuditBody::Changes { lines, .. } => lines.is_empty(),
        }
    }
}

/// One loggable event, ready for routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Guild the event happened in
    pub guild_id: GuildId,
    /// Event that produced the record
    pub kind: EventKind,
    /// Entity the event is about; matched against the suppression ledger
    pub entity_id: EntityId,
    /// Destination log
    pub category: LogCategory,
    /// Block heading
    pub title: String,
    /// Block content
    pub body: AuditBody,
    /// Optional image reference
    pub thumbnail: Option<String>,
    /// Optional footer line
    pub footer: Option<String>,
    /// When the event happened
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// New record routed to the kind's default category, stamped now
    pub fn new(
        guild_id: GuildId,
        kind: EventKind,
        entity_id: EntityId,
        title: impl Into<String>,
        body: AuditBody,
    ) -> Self {
        Self {
            guild_id,
            kind,
            entity_id,
            category: kind.log_category(),
            title: title.into(),
            body,
            thumbnail: None,
            footer: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach a thumbnail reference, if there is one
    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    /// Attach a footer line
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Override the event time
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// What happened to a routed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Handed to the sink; `truncated` reports that the body was capped
    Delivered { truncated: bool },
    /// A ledger entry matched and was consumed
    Suppressed,
    /// The guild has no channel for the record's category
    NotConfigured,
    /// The guild switched audit logging off
    LoggingDisabled,
    /// Nothing to log after diffing
    Empty,
    /// The sink rejected the block; logged and dropped
    DeliveryFailed(DeliveryError),
}

impl AuditOutcome {
    /// Whether the sink accepted the block
    pub fn is_delivered(&self) -> bool {
        matches!(self, AuditOutcome::Delivered { .. })
    }

    /// Whether the delivered body was capped
    pub fn truncation_applied(&self) -> bool {
        matches!(self, AuditOutcome::Delivered { truncated: true })
    }
}

struct RouterInner {
    guilds: GuildConfigCache,
    ledger: SuppressionLedger,
    sink: Arc<dyn ChannelSink>,
    config: AuditConfig,
    lanes: DashMap<(GuildId, LogCategory), Arc<Mutex<()>>>,
}

/// Routes audit records to their guild's log channels
///
/// Cloning is cheap and clones share lanes and collaborators.
#[derive(Clone)]
pub struct AuditRouter {
    inner: Arc<RouterInner>,
}

impl AuditRouter {
    /// Create a router over the guild config cache, ledger and sink
    pub fn new(
        guilds: GuildConfigCache,
        ledger: SuppressionLedger,
        sink: Arc<dyn ChannelSink>,
        config: AuditConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                guilds,
                ledger,
                sink,
                config,
                lanes: DashMap::new(),
            }),
        }
    }

    /// Ledger consulted before every delivery
    pub fn ledger(&self) -> &SuppressionLedger {
        &self.inner.ledger
    }

    /// Guild config cache used for destination lookup
    pub fn guilds(&self) -> &GuildConfigCache {
        &self.inner.guilds
    }

    /// Route one record
    pub async fn route(&self, record: AuditRecord) -> AuditOutcome {
        let inner = &self.inner;

        if inner.ledger.consume(record.kind, record.entity_id) {
            debug!(
                "Suppressed {:?} record for {} in guild {}",
                record.kind, record.entity_id, record.guild_id
            );
            return AuditOutcome::Suppressed;
        }

        let lane = self.lane(record.guild_id, record.category);
        let _turn = lane.lock().await;

        let guild = inner.guilds.get_hydrated(record.guild_id).await;
        let channel = guild.log_channel(record.category);
        if channel.is_unset() {
            debug!(
                "Guild {} has no {} channel, dropping {:?} record",
                record.guild_id, record.category, record.kind
            );
            return AuditOutcome::NotConfigured;
        }
        if !guild.logging_enabled {
            debug!("Guild {} has logging disabled", record.guild_id);
            return AuditOutcome::LoggingDisabled;
        }
        if record.body.is_empty() {
            debug!("Nothing to log for {:?} on {}", record.kind, record.entity_id);
            return AuditOutcome::Empty;
        }

        let (block, truncated) = render::render(
            &record,
            inner.config.max_body_chars,
            &inner.config.truncation_marker,
        );
        if truncated {
            debug!("Truncated {:?} record body for guild {}", record.kind, record.guild_id);
        }

        match inner.sink.deliver(channel, &block).await {
            Ok(()) => AuditOutcome::Delivered { truncated },
            Err(e) => {
                warn!(
                    "Delivery of {:?} record to channel {} in guild {} failed: {}",
                    record.kind, channel, record.guild_id, e
                );
                AuditOutcome::DeliveryFailed(e)
            }
        }
    }

    fn lane(&self, guild_id: GuildId, category: LogCategory) -> Arc<Mutex<()>> {
        Arc::clone(
            self.inner
                .lanes
                .entry((guild_id, category))
                .or_default()
                .value(),
        )
    }

    /// Drop the lanes of a guild that left
    pub fn forget_guild(&self, guild_id: GuildId) {
        self.inner.lanes.retain(|(guild, _), _| *guild != guild_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ConfigField;
    use crate::model::ChannelId;
    use crate::store::MemoryStore;
    use crate::traits::RenderedBlock;
    use async_trait::async_trait;
    use std::time::Duration;

    #[derive(Default)]
    struct Collect {
        blocks: std::sync::Mutex<Vec<(ChannelId, RenderedBlock)>>,
    }

    #[async_trait]
    impl ChannelSink for Collect {
        async fn deliver(
            &self,
            channel_id: ChannelId,
            block: &RenderedBlock,
        ) -> Result<(), DeliveryError> {
            self.blocks.lock().unwrap().push((channel_id, block.clone()));
            Ok(())
        }
    }

    async fn router() -> (AuditRouter, Arc<Collect>) {
        let guilds = GuildConfigCache::new(Arc::new(MemoryStore::new()));
        guilds
            .set(GuildId(1), ConfigField::LogChannel(LogCategory::Moderation, ChannelId(10)))
            .await
            .unwrap();
        guilds
            .set(GuildId(1), ConfigField::LoggingEnabled(true))
            .await
            .unwrap();

        let sink = Arc::new(Collect::default());
        let router = AuditRouter::new(
            guilds,
            SuppressionLedger::new(Duration::from_secs(30)),
            sink.clone(),
            AuditConfig::default(),
        );
        (router, sink)
    }

    fn record(kind: EventKind, lines: &[&str]) -> AuditRecord {
        AuditRecord::new(
            GuildId(1),
            kind,
            EntityId(5),
            "Role updated",
            AuditBody::Changes {
                header: None,
                lines: lines.iter().map(|l| l.to_string()).collect(),
            },
        )
    }

    #[test]
    fn test_event_categories() {
        assert_eq!(EventKind::MemberJoin.log_category(), LogCategory::Automod);
        assert_eq!(EventKind::MessageEdit.log_category(), LogCategory::Message);
        assert_eq!(EventKind::RoleDelete.log_category(), LogCategory::Moderation);
        assert_eq!(EventKind::FilterUpdate.log_category(), LogCategory::Moderation);
    }

    #[tokio::test]
    async fn test_delivers_to_category_channel() {
        let (router, sink) = router().await;
        let outcome = router.route(record(EventKind::RoleUpdate, &["**Name:** `a` **→** `b`"])).await;

        assert_eq!(outcome, AuditOutcome::Delivered { truncated: false });
        let blocks = sink.blocks.lock().unwrap();
        assert_eq!(blocks[0].0, ChannelId(10));
        assert_eq!(blocks[0].1.title, "Role updated");
    }

    #[tokio::test]
    async fn test_empty_and_suppressed_records_skip_sink() {
        let (router, sink) = router().await;
        assert_eq!(router.route(record(EventKind::RoleUpdate, &[])).await, AuditOutcome::Empty);

        router.ledger().arm(EventKind::RoleUpdate, EntityId(5));
        assert_eq!(
            router.route(record(EventKind::RoleUpdate, &["x"])).await,
            AuditOutcome::Suppressed
        );
        assert!(sink.blocks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logging_disabled() {
        let (router, _sink) = router().await;
        router
            .guilds()
            .set(GuildId(1), ConfigField::LoggingEnabled(false))
            .await
            .unwrap();
        assert_eq!(
            router.route(record(EventKind::RoleUpdate, &["x"])).await,
            AuditOutcome::LoggingDisabled
        );
    }
}

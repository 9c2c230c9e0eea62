//! Command-layer facade over the guild caches
//!
//! Every operation asks the [`PermissionCheck`] first. Configuration
//! changes are silent; filter list changes that actually modify the list
//! are announced in the guild's moderation log.

use std::sync::Arc;
use tracing::{debug, info};

use crate::audit::{AuditBody, AuditRecord, AuditRouter, EventKind};
use crate::cache::{ConfigField, FilterCache, FilterChange, GuildConfigCache};
use crate::error::{Error, Result};
use crate::model::{ChannelId, EntityId, FilterRecord, GuildConfigRecord, GuildId, LogCategory};
use crate::traits::PermissionCheck;

/// Guild settings commands
#[derive(Clone)]
pub struct GuildSettings {
    guilds: GuildConfigCache,
    filters: FilterCache,
    router: AuditRouter,
    permissions: Arc<dyn PermissionCheck>,
}

impl GuildSettings {
    pub fn new(
        guilds: GuildConfigCache,
        filters: FilterCache,
        router: AuditRouter,
        permissions: Arc<dyn PermissionCheck>,
    ) -> Self {
        Self {
            guilds,
            filters,
            router,
            permissions,
        }
    }

    /// Allow an extension in a guild
    pub async fn whitelist(
        &self,
        guild_id: GuildId,
        actor: EntityId,
        extension: &str,
    ) -> Result<FilterChange> {
        self.authorize(guild_id, actor).await?;
        let change = self.filters.append(guild_id, extension).await?;
        if change.is_applied() {
            self.announce_filter_change(guild_id, actor, "Whitelisted", change.extension())
                .await;
        }
        Ok(change)
    }

    /// Stop allowing an extension in a guild
    pub async fn blacklist(
        &self,
        guild_id: GuildId,
        actor: EntityId,
        extension: &str,
    ) -> Result<FilterChange> {
        self.authorize(guild_id, actor).await?;
        let change = self.filters.remove(guild_id, extension).await?;
        if change.is_applied() {
            self.announce_filter_change(guild_id, actor, "Blacklisted", change.extension())
                .await;
        }
        Ok(change)
    }

    /// Route a log category to a channel; `ChannelId(0)` unsets it
    pub async fn set_log_channel(
        &self,
        guild_id: GuildId,
        actor: EntityId,
        category: LogCategory,
        channel: ChannelId,
    ) -> Result<GuildConfigRecord> {
        self.authorize(guild_id, actor).await?;
        let record = self
            .guilds
            .set(guild_id, ConfigField::LogChannel(category, channel))
            .await?;
        info!("Guild {} routes {} to channel {}", guild_id, category, channel);
        Ok(record)
    }

    /// Switch audit logging on or off
    pub async fn toggle_logging(
        &self,
        guild_id: GuildId,
        actor: EntityId,
        enabled: bool,
    ) -> Result<GuildConfigRecord> {
        self.authorize(guild_id, actor).await?;
        self.guilds
            .set(guild_id, ConfigField::LoggingEnabled(enabled))
            .await
    }

    /// Switch automatic moderation on or off
    pub async fn set_automod(
        &self,
        guild_id: GuildId,
        actor: EntityId,
        enabled: bool,
    ) -> Result<GuildConfigRecord> {
        self.authorize(guild_id, actor).await?;
        self.guilds
            .set(guild_id, ConfigField::AutomodEnabled(enabled))
            .await
    }

    /// Allowed extensions of a guild, sorted
    pub async fn list_filters(&self, guild_id: GuildId, actor: EntityId) -> Result<Vec<String>> {
        self.authorize(guild_id, actor).await?;
        self.filters.list(guild_id).await
    }

    /// Reload a guild's filter list from the store
    pub async fn sync_filters(&self, guild_id: GuildId, actor: EntityId) -> Result<FilterRecord> {
        self.authorize(guild_id, actor).await?;
        self.filters.resync(guild_id).await
    }

    async fn authorize(&self, guild_id: GuildId, actor: EntityId) -> Result<()> {
        if self.permissions.can_manage_guild(guild_id, actor).await {
            return Ok(());
        }
        debug!("Actor {} may not manage guild {}", actor, guild_id);
        Err(Error::permission_denied(format!(
            "{} may not manage guild {}",
            actor, guild_id
        )))
    }

    async fn announce_filter_change(
        &self,
        guild_id: GuildId,
        actor: EntityId,
        action: &str,
        extension: &str,
    ) {
        let record = AuditRecord::new(
            guild_id,
            EventKind::FilterUpdate,
            actor,
            "Filter list updated",
            AuditBody::Changes {
                header: Some(format!("**Moderator:** <@{}> (`{}`)", actor, actor)),
                lines: vec![format!("**{}:** `{}`", action, extension)],
            },
        );
        let outcome = self.router.route(record).await;
        debug!("Filter change in guild {} audited: {:?}", guild_id, outcome);
    }
}

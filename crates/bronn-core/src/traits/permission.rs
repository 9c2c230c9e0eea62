// # Permission Check Trait
//
// Authorization is owned by the command layer. The core only asks one
// question before a settings mutation: may this actor change this guild?

use async_trait::async_trait;

use crate::model::{EntityId, GuildId};

/// Trait for permission check implementations
#[async_trait]
pub trait PermissionCheck: Send + Sync {
    /// Whether `actor` may mutate the configuration of `guild_id`
    async fn can_manage_guild(&self, guild_id: GuildId, actor: EntityId) -> bool;
}

/// Permission check that allows everyone
///
/// For embedders that authorize before calling into the core.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl PermissionCheck for AllowAll {
    async fn can_manage_guild(&self, _guild_id: GuildId, _actor: EntityId) -> bool {
        true
    }
}

//! Inbound platform events
//!
//! The gateway adapter converts whatever its client library delivers into
//! these shapes. Updates carry a before/after pair; everything else carries
//! a single snapshot. Attribute maps feed the diff engine directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::diff::{RoleRef, Snapshot};
use crate::model::{EntityId, GuildId};

/// Structural kind of a guild channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Category,
}

/// Name and location of a channel or thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: EntityId,
    pub name: String,
    /// Name of the parent category, if any
    #[serde(default)]
    pub category: Option<String>,
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(category) => write!(f, "{}/#{}", category, self.name),
            None => write!(f, "#{}", self.name),
        }
    }
}

/// Snapshot of a guild channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub category: Option<String>,
    /// Diffable attributes (topic, nsfw, overwrites, ...)
    #[serde(default)]
    pub attributes: Snapshot,
}

impl ChannelInfo {
    /// Location of this channel
    pub fn location(&self) -> ChannelRef {
        ChannelRef {
            id: self.id,
            name: self.name.clone(),
            category: self.category.clone(),
        }
    }
}

/// Snapshot of a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadInfo {
    pub id: EntityId,
    pub name: String,
    /// Channel the thread was started from
    pub parent: ChannelRef,
    #[serde(default)]
    pub archived: bool,
}

/// Snapshot of a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub attributes: Snapshot,
}

/// Snapshot of the guild object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildInfo {
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub attributes: Snapshot,
}

/// A platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserInfo {
    /// Mention followed by the id, e.g. ``<@7> (`7`)``
    pub fn format(&self) -> String {
        format!("<@{}> (`{}`)", self.id, self.id)
    }
}

/// A user inside a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub user: UserInfo,
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Diffable attributes (nick, pending, timeout, ...)
    #[serde(default)]
    pub attributes: Snapshot,
}

/// A cached message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub id: EntityId,
    pub channel: ChannelRef,
    pub author: UserInfo,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: usize,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub jump_url: Option<String>,
}

/// Event delivered by the platform
///
/// Message events carry an optional guild; `None` means a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    ChannelCreate {
        guild_id: GuildId,
        channel: ChannelInfo,
    },
    ChannelDelete {
        guild_id: GuildId,
        channel: ChannelInfo,
    },
    ChannelUpdate {
        guild_id: GuildId,
        before: ChannelInfo,
        after: ChannelInfo,
    },
    RoleCreate {
        guild_id: GuildId,
        role: RoleInfo,
    },
    RoleDelete {
        guild_id: GuildId,
        role: RoleInfo,
    },
    RoleUpdate {
        guild_id: GuildId,
        before: RoleInfo,
        after: RoleInfo,
    },
    GuildUpdate {
        guild_id: GuildId,
        before: GuildInfo,
        after: GuildInfo,
    },
    MemberJoin {
        guild_id: GuildId,
        member: MemberInfo,
    },
    MemberRemove {
        guild_id: GuildId,
        member: MemberInfo,
    },
    MemberBan {
        guild_id: GuildId,
        user: UserInfo,
    },
    MemberUnban {
        guild_id: GuildId,
        user: UserInfo,
    },
    MemberUpdate {
        guild_id: GuildId,
        before: MemberInfo,
        after: MemberInfo,
    },
    /// Deletion of a message, with its content if it was cached
    MessageDelete {
        guild_id: Option<GuildId>,
        channel: ChannelRef,
        message_id: EntityId,
        #[serde(default)]
        cached: Option<MessageInfo>,
    },
    /// Edit of a cached message
    MessageEdit {
        guild_id: Option<GuildId>,
        before: MessageInfo,
        after: MessageInfo,
    },
    /// Edit seen without the previous content
    RawMessageEdit {
        guild_id: Option<GuildId>,
        message: MessageInfo,
    },
    ThreadCreate {
        guild_id: GuildId,
        thread: ThreadInfo,
    },
    ThreadDelete {
        guild_id: GuildId,
        thread: ThreadInfo,
    },
    ThreadUpdate {
        guild_id: GuildId,
        before: ThreadInfo,
        after: ThreadInfo,
    },
    /// The bot was added to a guild
    GuildJoin { guild_id: GuildId },
    /// The bot left a guild or the guild was deleted
    GuildRemove { guild_id: GuildId },
}

impl PlatformEvent {
    /// Guild the event belongs to; `None` for direct messages
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            PlatformEvent::MessageDelete { guild_id, .. }
            | PlatformEvent::MessageEdit { guild_id, .. }
            | PlatformEvent::RawMessageEdit { guild_id, .. } => *guild_id,
            PlatformEvent::ChannelCreate { guild_id, .. }
            | PlatformEvent::ChannelDelete { guild_id, .. }
            | PlatformEvent::ChannelUpdate { guild_id, .. }
            | PlatformEvent::RoleCreate { guild_id, .. }
            | PlatformEvent::RoleDelete { guild_id, .. }
            | PlatformEvent::RoleUpdate { guild_id, .. }
            | PlatformEvent::GuildUpdate { guild_id, .. }
            | PlatformEvent::MemberJoin { guild_id, .. }
            | PlatformEvent::MemberRemove { guild_id, .. }
            | PlatformEvent::MemberBan { guild_id, .. }
            | PlatformEvent::MemberUnban { guild_id, .. }
            | PlatformEvent::MemberUpdate { guild_id, .. }
            | PlatformEvent::ThreadCreate { guild_id, .. }
            | PlatformEvent::ThreadDelete { guild_id, .. }
            | PlatformEvent::ThreadUpdate { guild_id, .. }
            | PlatformEvent::GuildJoin { guild_id }
            | PlatformEvent::GuildRemove { guild_id } => Some(*guild_id),
        }
    }
}

//! Translation of platform events into audit records
//!
//! [`ModLog`] is the inbound edge of the pipeline. It diffs update events,
//! formats create/delete events, keeps the guild caches in step with guild
//! join/leave, and hands every record to the [`AuditRouter`].
//!
//! Messages authored by bots and direct messages are never logged.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::audit::{AuditBody, AuditOutcome, AuditRecord, AuditRouter, EventKind};
use crate::cache::FilterCache;
use crate::config::AuditConfig;
use crate::diff::{self, EntityKind, render_word_diff, role_changes, word_diff};
use crate::events::{
    ChannelInfo, ChannelKind, ChannelRef, MemberInfo, MessageInfo, PlatformEvent, ThreadInfo,
    UserInfo,
};
use crate::model::{EntityId, GuildId};

/// Milliseconds between the Unix epoch and the first platform snowflake
const SNOWFLAKE_EPOCH_MILLIS: i64 = 1_420_070_400_000;

/// Event-to-record translator in front of the router
#[derive(Clone)]
pub struct ModLog {
    router: AuditRouter,
    filters: FilterCache,
    edit_grace: Duration,
}

impl ModLog {
    /// Create a mod log feeding `router`
    ///
    /// `filters` is only used to evict guilds the bot left.
    pub fn new(router: AuditRouter, filters: FilterCache, config: &AuditConfig) -> Self {
        Self {
            router,
            filters,
            edit_grace: config.edit_grace(),
        }
    }

    /// Router records are handed to
    pub fn router(&self) -> &AuditRouter {
        &self.router
    }

    /// Handle one platform event
    ///
    /// # Returns
    ///
    /// One outcome per record the event produced, in routing order. Guild
    /// lifecycle events and ignored messages produce none.
    pub async fn handle(&self, event: PlatformEvent) -> Vec<AuditOutcome> {
        match event {
            PlatformEvent::GuildJoin { guild_id } => {
                self.on_guild_join(guild_id).await;
                Vec::new()
            }
            PlatformEvent::GuildRemove { guild_id } => {
                self.on_guild_remove(guild_id).await;
                Vec::new()
            }
            event => {
                let mut outcomes = Vec::new();
                for record in self.records(event).await {
                    outcomes.push(self.router.route(record).await);
                }
                outcomes
            }
        }
    }

    /// Records an event translates into, without routing them
    ///
    /// A raw message edit waits out the edit grace period first, so the
    /// cached edit of the same message gets the chance to claim it.
    pub async fn records(&self, event: PlatformEvent) -> Vec<AuditRecord> {
        match event {
            PlatformEvent::ChannelCreate { guild_id, channel } => {
                vec![channel_created(guild_id, &channel)]
            }
            PlatformEvent::ChannelDelete { guild_id, channel } => {
                vec![channel_deleted(guild_id, &channel)]
            }
            PlatformEvent::ChannelUpdate {
                guild_id,
                before,
                after,
            } => vec![channel_updated(guild_id, &before, &after)],
            PlatformEvent::RoleCreate { guild_id, role } => vec![AuditRecord::new(
                guild_id,
                EventKind::RoleCreate,
                role.id,
                "Role created",
                AuditBody::Text(format!("{} (`{}`)", role.name, role.id)),
            )],
            PlatformEvent::RoleDelete { guild_id, role } => vec![AuditRecord::new(
                guild_id,
                EventKind::RoleDelete,
                role.id,
                "Role removed",
                AuditBody::Text(format!("{} (`{}`)", role.name, role.id)),
            )],
            PlatformEvent::RoleUpdate {
                guild_id,
                before,
                after,
            } => {
                let lines = change_lines(diff::diff(
                    &before.attributes,
                    &after.attributes,
                    EntityKind::Role,
                ));
                vec![AuditRecord::new(
                    guild_id,
                    EventKind::RoleUpdate,
                    after.id,
                    "Role updated",
                    AuditBody::Changes {
                        header: Some(format!("**{}** (`{}`)", after.name, after.id)),
                        lines,
                    },
                )]
            }
            PlatformEvent::GuildUpdate {
                guild_id,
                before,
                after,
            } => {
                let lines = change_lines(diff::diff(
                    &before.attributes,
                    &after.attributes,
                    EntityKind::Guild,
                ));
                let record = AuditRecord::new(
                    guild_id,
                    EventKind::GuildUpdate,
                    EntityId(guild_id.get()),
                    "Guild updated",
                    AuditBody::Changes {
                        header: Some(format!("**{}** (`{}`)", after.name, guild_id)),
                        lines,
                    },
                );
                vec![record.with_thumbnail(after.icon)]
            }
            PlatformEvent::MemberJoin { guild_id, member } => {
                vec![member_joined(guild_id, &member.user, Utc::now())]
            }
            PlatformEvent::MemberRemove { guild_id, member } => {
                vec![user_record(guild_id, EventKind::MemberRemove, "User left", &member.user)]
            }
            PlatformEvent::MemberBan { guild_id, user } => {
                vec![user_record(guild_id, EventKind::MemberBan, "User banned", &user)]
            }
            PlatformEvent::MemberUnban { guild_id, user } => {
                vec![user_record(guild_id, EventKind::MemberUnban, "User unbanned", &user)]
            }
            PlatformEvent::MemberUpdate {
                guild_id,
                before,
                after,
            } => vec![member_updated(guild_id, &before, &after)],
            PlatformEvent::MessageDelete {
                guild_id,
                channel,
                message_id,
                cached,
            } => {
                let Some(guild_id) = guild_id else {
                    return Vec::new();
                };
                match cached {
                    Some(message) if message.author.bot => Vec::new(),
                    Some(message) => vec![cached_message_deleted(guild_id, &message)],
                    None => vec![uncached_message_deleted(guild_id, &channel, message_id)],
                }
            }
            PlatformEvent::MessageEdit {
                guild_id,
                before,
                after,
            } => {
                let Some(guild_id) = guild_id else {
                    return Vec::new();
                };
                if before.author.bot {
                    return Vec::new();
                }
                self.router
                    .ledger()
                    .arm(EventKind::MessageEditEcho, before.id);
                if before.content == after.content {
                    trace!("Edit of message {} kept its content", before.id);
                    return Vec::new();
                }
                vec![message_edited(guild_id, &before, &after)]
            }
            PlatformEvent::RawMessageEdit { guild_id, message } => {
                let Some(guild_id) = guild_id else {
                    return Vec::new();
                };
                if message.author.bot {
                    return Vec::new();
                }
                tokio::time::sleep(self.edit_grace).await;
                if self
                    .router
                    .ledger()
                    .consume(EventKind::MessageEditEcho, message.id)
                {
                    debug!("Raw edit of message {} already logged from cache", message.id);
                    return Vec::new();
                }
                raw_message_edited(guild_id, &message)
            }
            PlatformEvent::ThreadCreate { guild_id, thread } => vec![AuditRecord::new(
                guild_id,
                EventKind::ThreadCreate,
                thread.id,
                "Thread created",
                AuditBody::Text(thread_line(&thread, "created")),
            )],
            PlatformEvent::ThreadDelete { guild_id, thread } => vec![AuditRecord::new(
                guild_id,
                EventKind::ThreadDelete,
                thread.id,
                "Thread deleted",
                AuditBody::Text(thread_line(&thread, "deleted")),
            )],
            PlatformEvent::ThreadUpdate {
                guild_id,
                before,
                after,
            } => thread_updated(guild_id, &before, &after).into_iter().collect(),
            PlatformEvent::GuildJoin { .. } | PlatformEvent::GuildRemove { .. } => Vec::new(),
        }
    }

    async fn on_guild_join(&self, guild_id: GuildId) {
        if let Err(e) = self.router.guilds().on_guild_join(guild_id).await {
            warn!("Could not create config for joined guild {}: {}", guild_id, e);
        }
    }

    async fn on_guild_remove(&self, guild_id: GuildId) {
        if let Err(e) = self.router.guilds().on_guild_remove(guild_id).await {
            warn!("Could not delete config of removed guild {}: {}", guild_id, e);
        }
        self.filters.evict(guild_id);
        self.router.forget_guild(guild_id);
    }
}

fn change_lines(changes: Vec<diff::ChangeRecord>) -> Vec<String> {
    changes.iter().map(ToString::to_string).collect()
}

fn channel_created(guild_id: GuildId, channel: &ChannelInfo) -> AuditRecord {
    let title = match channel.kind {
        ChannelKind::Category => "Category created",
        ChannelKind::Voice => "Voice channel created",
        ChannelKind::Text => "Text channel created",
    };
    AuditRecord::new(
        guild_id,
        EventKind::ChannelCreate,
        channel.id,
        title,
        AuditBody::Text(channel_line(channel)),
    )
}

fn channel_deleted(guild_id: GuildId, channel: &ChannelInfo) -> AuditRecord {
    let title = match channel.kind {
        ChannelKind::Category => "Category deleted",
        ChannelKind::Voice => "Voice channel deleted",
        ChannelKind::Text => "Text channel deleted",
    };
    AuditRecord::new(
        guild_id,
        EventKind::ChannelDelete,
        channel.id,
        title,
        AuditBody::Text(channel_line(channel)),
    )
}

fn channel_line(channel: &ChannelInfo) -> String {
    match (&channel.category, channel.kind) {
        (Some(category), ChannelKind::Text | ChannelKind::Voice) => {
            format!("{}/{} (`{}`)", category, channel.name, channel.id)
        }
        _ => format!("{} (`{}`)", channel.name, channel.id),
    }
}

fn channel_updated(guild_id: GuildId, before: &ChannelInfo, after: &ChannelInfo) -> AuditRecord {
    let lines = change_lines(diff::diff(
        &before.attributes,
        &after.attributes,
        EntityKind::Channel,
    ));
    AuditRecord::new(
        guild_id,
        EventKind::ChannelUpdate,
        after.id,
        "Channel updated",
        AuditBody::Changes {
            header: Some(format!("**{}** (`{}`)", after.location(), after.id)),
            lines,
        },
    )
}

fn user_record(guild_id: GuildId, kind: EventKind, title: &str, user: &UserInfo) -> AuditRecord {
    AuditRecord::new(guild_id, kind, user.id, title, AuditBody::Text(user.format()))
        .with_thumbnail(user.avatar.clone())
}

fn member_joined(guild_id: GuildId, user: &UserInfo, now: DateTime<Utc>) -> AuditRecord {
    let mut text = user.format();
    if let Some(created_at) = user.created_at {
        let age = (now - created_at).abs();
        text.push_str("\n\n**Account age:** ");
        text.push_str(&humanize_age(age));
        if age < TimeDelta::days(1) {
            text = format!("\u{1F195} {}", text);
        }
    }
    AuditRecord::new(
        guild_id,
        EventKind::MemberJoin,
        user.id,
        "User joined",
        AuditBody::Text(text),
    )
    .with_thumbnail(user.avatar.clone())
}

fn member_updated(guild_id: GuildId, before: &MemberInfo, after: &MemberInfo) -> AuditRecord {
    let mut lines: Vec<String> = role_changes(&before.roles, &after.roles)
        .iter()
        .map(ToString::to_string)
        .collect();
    lines.extend(change_lines(diff::diff(
        &before.attributes,
        &after.attributes,
        EntityKind::Member,
    )));
    lines.sort();

    AuditRecord::new(
        guild_id,
        EventKind::MemberUpdate,
        after.user.id,
        "Member updated",
        AuditBody::Changes {
            header: Some(after.user.format()),
            lines,
        },
    )
    .with_thumbnail(after.user.avatar.clone())
}

fn message_header(message: &MessageInfo) -> String {
    format!(
        "**Author:** {}\n**Channel:** {} (`{}`)\n**Message ID:** `{}`\n",
        message.author.format(),
        message.channel,
        message.channel.id,
        message.id
    )
}

fn cached_message_deleted(guild_id: GuildId, message: &MessageInfo) -> AuditRecord {
    let mut text = String::new();
    if message.attachments > 0 {
        text.push_str(&format!("**Attachments:** {}\n", message.attachments));
    }
    text.push_str(&message_header(message));
    let sent_at = message
        .created_at
        .unwrap_or_else(|| snowflake_time(message.id));
    text.push_str(&format!("**Sent at:** {}\n", format_dt(sent_at)));
    if let Some(url) = &message.jump_url {
        text.push_str(&format!("[Jump to message]({})\n", url));
    }
    text.push('\n');
    text.push_str(&message.content);

    AuditRecord::new(
        guild_id,
        EventKind::MessageDelete,
        message.id,
        "Message deleted",
        AuditBody::Text(text),
    )
}

fn uncached_message_deleted(
    guild_id: GuildId,
    channel: &ChannelRef,
    message_id: EntityId,
) -> AuditRecord {
    let text = format!(
        "**Channel:** {} (`{}`)\n**Message ID:** `{}`\n**Sent at:** {}\n\n\
         This message was not cached, so the message content cannot be displayed.",
        channel,
        channel.id,
        message_id,
        format_dt(snowflake_time(message_id))
    );
    AuditRecord::new(
        guild_id,
        EventKind::MessageDelete,
        message_id,
        "Message deleted",
        AuditBody::Text(text),
    )
}

fn message_edited(guild_id: GuildId, before: &MessageInfo, after: &MessageInfo) -> AuditRecord {
    let (old, new) = render_word_diff(&word_diff(&before.content, &after.content));
    let mut text = format!(
        "{}\n**Before**:\n{}\n**After**:\n{}\n",
        message_header(before),
        old,
        new
    );
    if let Some(url) = &after.jump_url {
        text.push_str(&format!("\n[Jump to message]({})", url));
    }

    let record = AuditRecord::new(
        guild_id,
        EventKind::MessageEdit,
        before.id,
        "Message edited",
        AuditBody::Text(text),
    );
    match (before.edited_at, after.edited_at, before.created_at) {
        (Some(previous), Some(latest), _) => record
            .with_timestamp(previous)
            .with_footer(format!("Last edited {} ago", humanize_age((latest - previous).abs()))),
        (Some(previous), None, _) => record.with_timestamp(previous),
        (None, _, Some(created_at)) => record.with_timestamp(created_at),
        (None, _, None) => record,
    }
}

fn raw_message_edited(guild_id: GuildId, message: &MessageInfo) -> Vec<AuditRecord> {
    let header = message_header(message);
    let before = AuditRecord::new(
        guild_id,
        EventKind::MessageEdit,
        message.id,
        "Message edited (Before)",
        AuditBody::Text(format!(
            "{}\nThis message was not cached, so the message content cannot be displayed.",
            header
        )),
    );
    let after = AuditRecord::new(
        guild_id,
        EventKind::MessageEdit,
        message.id,
        "Message edited (After)",
        AuditBody::Text(format!("{}\n{}", header, message.content)),
    );
    vec![before, after]
}

fn thread_line(thread: &ThreadInfo, action: &str) -> String {
    format!(
        "Thread <#{}> ({}, `{}`) from <#{}> (`{}`) {}",
        thread.id, thread.name, thread.id, thread.parent.id, thread.parent.id, action
    )
}

fn thread_updated(guild_id: GuildId, before: &ThreadInfo, after: &ThreadInfo) -> Option<AuditRecord> {
    if before.name != after.name {
        return Some(AuditRecord::new(
            guild_id,
            EventKind::ThreadUpdate,
            after.id,
            "Thread name edited",
            AuditBody::Text(format!(
                "Thread <#{}> (`{}`) from <#{}> (`{}`): `{}` -> `{}`",
                after.id, after.id, after.parent.id, after.parent.id, before.name, after.name
            )),
        ));
    }

    let action = match (before.archived, after.archived) {
        (false, true) => "archived",
        (true, false) => "un-archived",
        _ => return None,
    };
    Some(AuditRecord::new(
        guild_id,
        EventKind::ThreadUpdate,
        after.id,
        format!("Thread {}", action),
        AuditBody::Text(format!(
            "Thread <#{}> ({}, `{}`) from <#{}> (`{}`) was {}",
            after.id, after.name, after.id, after.parent.id, after.parent.id, action
        )),
    ))
}

/// Creation time encoded in a platform snowflake
pub fn snowflake_time(id: EntityId) -> DateTime<Utc> {
    let millis = (id.get() >> 22) as i64 + SNOWFLAKE_EPOCH_MILLIS;
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

fn format_dt(at: DateTime<Utc>) -> String {
    format!("<t:{}:f>", at.timestamp())
}

/// Coarse human description of a duration, largest unit only
pub fn humanize_age(age: TimeDelta) -> String {
    fn unit(n: i64, name: &str) -> String {
        if n == 1 {
            format!("1 {}", name)
        } else {
            format!("{} {}s", n, name)
        }
    }

    let days = age.num_days();
    if days >= 365 {
        unit(days / 365, "year")
    } else if days >= 30 {
        unit(days / 30, "month")
    } else if days >= 1 {
        unit(days, "day")
    } else if age.num_hours() >= 1 {
        unit(age.num_hours(), "hour")
    } else if age.num_minutes() >= 1 {
        unit(age.num_minutes(), "minute")
    } else {
        "less than a minute".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(id: u64) -> UserInfo {
        UserInfo {
            id: EntityId(id),
            name: format!("user{}", id),
            bot: false,
            avatar: Some(format!("https://cdn.example/{}.png", id)),
            created_at: None,
        }
    }

    #[test]
    fn test_snowflake_time() {
        // Snowflake from the platform's documentation
        let at = snowflake_time(EntityId(175_928_847_299_117_063));
        assert_eq!(at, Utc.timestamp_millis_opt(1_462_015_105_796).unwrap());
    }

    #[test]
    fn test_humanize_age() {
        assert_eq!(humanize_age(TimeDelta::seconds(20)), "less than a minute");
        assert_eq!(humanize_age(TimeDelta::hours(1)), "1 hour");
        assert_eq!(humanize_age(TimeDelta::days(3)), "3 days");
        assert_eq!(humanize_age(TimeDelta::days(800)), "2 years");
    }

    #[test]
    fn test_new_account_is_flagged() {
        let now = Utc::now();
        let mut fresh = user(1);
        fresh.created_at = Some(now - TimeDelta::hours(2));
        let record = member_joined(GuildId(1), &fresh, now);

        let AuditBody::Text(text) = &record.body else {
            panic!("join records are plain text");
        };
        assert!(text.starts_with('\u{1F195}'));
        assert!(text.ends_with("**Account age:** 2 hours"));
        assert_eq!(record.category, crate::model::LogCategory::Automod);
    }

    #[test]
    fn test_edit_record_uses_previous_edit_time() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let previous = created + TimeDelta::hours(2);
        let message = |content: &str, edited_at: Option<DateTime<Utc>>| MessageInfo {
            id: EntityId(30),
            channel: ChannelRef {
                id: EntityId(1),
                name: "general".into(),
                category: None,
            },
            author: user(3),
            content: content.into(),
            attachments: 0,
            created_at: Some(created),
            edited_at,
            jump_url: None,
        };

        let record = message_edited(
            GuildId(1),
            &message("first", Some(previous)),
            &message("second", Some(previous + TimeDelta::hours(1))),
        );
        assert_eq!(record.timestamp, previous);
        assert_eq!(record.footer.as_deref(), Some("Last edited 1 hour ago"));

        let record = message_edited(GuildId(1), &message("first", None), &message("second", None));
        assert_eq!(record.timestamp, created);
        assert_eq!(record.footer, None);
    }

    #[test]
    fn test_user_records_carry_avatar() {
        let record = member_joined(GuildId(1), &user(4), Utc::now());
        assert_eq!(record.thumbnail.as_deref(), Some("https://cdn.example/4.png"));

        let mut faceless = user(5);
        faceless.avatar = None;
        let record = user_record(GuildId(1), EventKind::MemberBan, "User banned", &faceless);
        assert_eq!(record.thumbnail, None);
    }

    #[test]
    fn test_member_update_lines_sorted() {
        let role = crate::diff::RoleRef {
            id: EntityId(9),
            name: "Muted".into(),
        };
        let before = MemberInfo {
            user: user(2),
            roles: vec![],
            attributes: [("nick".to_string(), serde_json::json!("a"))].into(),
        };
        let after = MemberInfo {
            user: user(2),
            roles: vec![role],
            attributes: [("nick".to_string(), serde_json::json!("b"))].into(),
        };

        let record = member_updated(GuildId(1), &before, &after);
        let AuditBody::Changes { lines, .. } = record.body else {
            panic!("member updates are change lists");
        };
        assert_eq!(
            lines,
            vec!["**Nick:** `a` **→** `b`", "**Role added:** Muted (`9`)"]
        );
    }

    #[test]
    fn test_thread_update_without_visible_change() {
        let thread = ThreadInfo {
            id: EntityId(5),
            name: "help".into(),
            parent: ChannelRef {
                id: EntityId(1),
                name: "general".into(),
                category: None,
            },
            archived: false,
        };
        assert!(thread_updated(GuildId(1), &thread, &thread).is_none());

        let mut archived = thread.clone();
        archived.archived = true;
        let record = thread_updated(GuildId(1), &thread, &archived).unwrap();
        assert_eq!(record.title, "Thread archived");
    }
}

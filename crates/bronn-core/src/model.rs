//! Persisted record shapes and identifier types
//!
//! Guild settings are keyed by a numeric [`GuildId`] and always have a
//! fixed shape. A guild the store has never seen is represented by
//! [`GuildConfigRecord::new`], never by an absent value.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake!(
    /// Platform guild identifier
    GuildId
);
snowflake!(
    /// Platform channel identifier. Zero means "not configured".
    ChannelId
);
snowflake!(
    /// Identifier of any platform entity (member, role, channel, message)
    EntityId
);

impl ChannelId {
    /// Whether this channel id is the unset sentinel
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

/// Destination log a record is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// Staff actions and structural guild changes
    Moderation,
    /// Deleted and edited messages
    Message,
    /// Automatic moderation and member joins
    Automod,
}

impl LogCategory {
    /// All categories, in display order
    pub const ALL: [LogCategory; 3] = [Self::Moderation, Self::Message, Self::Automod];

    /// Parse a category name as typed by a moderator or stored in old rows
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "moderation" | "mod" | "mod_log" | "modlog" => Some(Self::Moderation),
            "message" | "messages" | "message_log" => Some(Self::Message),
            "automod" | "automoderation" | "automod_log" => Some(Self::Automod),
            _ => None,
        }
    }

    /// Column name of this category in the guild record
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Moderation => "mod_log",
            Self::Message => "message_log",
            Self::Automod => "automod_log",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_blacklist_reason() -> String {
    "Violating TOS".to_string()
}

/// Persisted per-guild configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildConfigRecord {
    /// Owning guild
    pub guild_id: GuildId,
    /// Moderation log channel
    #[serde(default)]
    pub mod_log: ChannelId,
    /// Message log channel
    #[serde(default)]
    pub message_log: ChannelId,
    /// Automod log channel
    #[serde(default)]
    pub automod_log: ChannelId,
    /// Master switch for audit logging
    #[serde(default)]
    pub logging_enabled: bool,
    /// Automatic moderation switch
    #[serde(default)]
    pub automod_enabled: bool,
    /// Guild is banned from using the bot
    #[serde(default)]
    pub blacklisted: bool,
    /// Reason shown to blacklisted guilds
    #[serde(default = "default_blacklist_reason")]
    pub blacklist_reason: String,
    /// Premium tier
    #[serde(default)]
    pub premium: bool,
}

impl GuildConfigRecord {
    /// Default-configured record for a guild
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            mod_log: ChannelId::default(),
            message_log: ChannelId::default(),
            automod_log: ChannelId::default(),
            logging_enabled: false,
            automod_enabled: false,
            blacklisted: false,
            blacklist_reason: default_blacklist_reason(),
            premium: false,
        }
    }

    /// Configured channel for a log category
    pub fn log_channel(&self, category: LogCategory) -> ChannelId {
        match category {
            LogCategory::Moderation => self.mod_log,
            LogCategory::Message => self.message_log,
            LogCategory::Automod => self.automod_log,
        }
    }

    /// Replace the channel for a log category
    pub fn set_log_channel(&mut self, category: LogCategory, channel: ChannelId) {
        match category {
            LogCategory::Moderation => self.mod_log = channel,
            LogCategory::Message => self.message_log = channel,
            LogCategory::Automod => self.automod_log = channel,
        }
    }
}

/// Normalize a file extension to its canonical leading-dot, lowercase form
///
/// Inner dots are kept, so `tar.gz` becomes `.tar.gz`. Returns `None` for
/// empty input, a bare `.`, a leading `..`, or input containing whitespace.
pub fn normalize_extension(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let bare = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if bare.is_empty() || bare.starts_with('.') || bare.chars().any(char::is_whitespace) {
        return None;
    }
    Some(format!(".{}", bare.to_lowercase()))
}

/// Allowed file extensions of a guild
///
/// Keeps insertion order for display and a hash index for O(1) membership.
/// Every entry is unique. Entries are normalized, apart from malformed
/// ones carried over verbatim from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FilterRecordRepr", into = "FilterRecordRepr")]
pub struct FilterRecord {
    guild_id: GuildId,
    extensions: Vec<String>,
    index: HashSet<String>,
}

#[derive(Serialize, Deserialize)]
struct FilterRecordRepr {
    guild_id: GuildId,
    #[serde(default)]
    extensions: Vec<String>,
}

impl From<FilterRecordRepr> for FilterRecord {
    fn from(repr: FilterRecordRepr) -> Self {
        Self::from_extensions(repr.guild_id, repr.extensions)
    }
}

impl From<FilterRecord> for FilterRecordRepr {
    fn from(record: FilterRecord) -> Self {
        Self {
            guild_id: record.guild_id,
            extensions: record.extensions,
        }
    }
}

impl FilterRecord {
    /// Empty filter list for a guild
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            extensions: Vec::new(),
            index: HashSet::new(),
        }
    }

    /// Build from a persisted array column
    ///
    /// Entries are normalized and deduplicated. An entry that does not
    /// normalize is kept verbatim so writing the record back never drops
    /// persisted data.
    pub fn from_extensions<I, S>(guild_id: GuildId, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut record = Self::new(guild_id);
        for ext in extensions {
            let raw = ext.as_ref();
            match normalize_extension(raw) {
                Some(ext) => {
                    record.insert_normalized(ext);
                }
                None => {
                    warn!(
                        "Keeping malformed filter entry {:?} of guild {} as stored",
                        raw, guild_id
                    );
                    record.insert_normalized(raw.to_string());
                }
            }
        }
        record
    }

    /// Owning guild
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Extensions in insertion order
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Membership test; the argument is normalized first
    pub fn contains(&self, extension: &str) -> bool {
        normalize_extension(extension).is_some_and(|ext| self.index.contains(&ext))
    }

    /// Number of extensions
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Insert an already-normalized extension. Returns `false` if present.
    pub(crate) fn insert_normalized(&mut self, extension: String) -> bool {
        if self.index.contains(&extension) {
            return false;
        }
        self.index.insert(extension.clone());
        self.extensions.push(extension);
        true
    }

    /// Remove an already-normalized extension. Returns `false` if absent.
    pub(crate) fn remove_normalized(&mut self, extension: &str) -> bool {
        if !self.index.remove(extension) {
            return false;
        }
        self.extensions.retain(|e| e != extension);
        true
    }
}

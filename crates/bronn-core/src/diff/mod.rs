//! Structural diff of entity snapshots
//!
//! [`diff`] compares two flat attribute maps of the same entity and returns
//! the changed fields as [`ChangeRecord`]s, sorted by field name. Each
//! [`EntityKind`] carries a rule table:
//!
//! - *unsupported* fields are reported as "updated" without values
//! - *suppressed* fields are never reported
//!
//! The module is pure. Nothing here touches caches, the store, or a sink.

pub mod words;

pub use words::{WordOp, WordRun, render_word_diff, word_diff};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::model::EntityId;

/// Flat attribute map of a platform entity
pub type Snapshot = BTreeMap<String, Value>;

/// Placeholder rendered for an empty or absent value
pub const EMPTY_PLACEHOLDER: &str = "None";

/// Kind of entity a snapshot describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Text, voice or category channel, and threads
    Channel,
    /// Guild role
    Role,
    /// The guild object itself
    Guild,
    /// Guild member (roles are diffed by [`role_changes`])
    Member,
}

/// Field rules of one entity kind
#[derive(Debug, Clone, Copy)]
pub struct DiffRules {
    /// Fields reported as "updated" without old/new values
    pub unsupported: &'static [&'static str],
    /// Fields never reported
    pub suppressed: &'static [&'static str],
}

const CHANNEL_RULES: DiffRules = DiffRules {
    unsupported: &["overwrites", "permissions"],
    suppressed: &["position"],
};

const ROLE_RULES: DiffRules = DiffRules {
    unsupported: &["colour", "permissions"],
    suppressed: &["color"],
};

const GUILD_RULES: DiffRules = DiffRules {
    unsupported: &[],
    suppressed: &[],
};

const MEMBER_RULES: DiffRules = DiffRules {
    unsupported: &[],
    suppressed: &["roles"],
};

impl EntityKind {
    /// Rule table of this kind
    pub fn rules(self) -> &'static DiffRules {
        match self {
            EntityKind::Channel => &CHANNEL_RULES,
            EntityKind::Role => &ROLE_RULES,
            EntityKind::Guild => &GUILD_RULES,
            EntityKind::Member => &MEMBER_RULES,
        }
    }
}

/// What changed about a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDetail {
    /// Rendered old and new values
    Values {
        /// Value before the change, `"None"` if empty or absent
        old: String,
        /// Value after the change, `"None"` if empty or absent
        new: String,
    },
    /// The field changed but its value cannot be shown meaningfully
    Updated,
}

/// One changed field of an entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Raw field name as it appears in the snapshot
    pub field: String,
    /// Old/new values or a generic update marker
    pub detail: ChangeDetail,
}

impl ChangeRecord {
    /// Change with rendered old and new values
    pub fn values(
        field: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            detail: ChangeDetail::Values {
                old: old.into(),
                new: new.into(),
            },
        }
    }

    /// Change of an unsupported field
    pub fn updated(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            detail: ChangeDetail::Updated,
        }
    }

    /// Field name for display
    pub fn title(&self) -> String {
        title_case(&self.field)
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            ChangeDetail::Values { old, new } => {
                write!(f, "**{}:** `{}` **→** `{}`", self.title(), old, new)
            }
            ChangeDetail::Updated => write!(f, "**{}** updated", self.title()),
        }
    }
}

/// Compare two snapshots of the same entity
///
/// Values are compared structurally. An absent key differs from any present
/// value, including `false` and `null`.
///
/// # Returns
///
/// Changed fields sorted by field name (ordinal). Empty if nothing
/// reportable changed.
///
/// # Example
///
/// ```rust
/// use bronn_core::diff::{diff, ChangeRecord, EntityKind, Snapshot};
/// use serde_json::json;
///
/// let before: Snapshot = [("name".into(), json!("general")), ("topic".into(), json!("old"))].into();
/// let after: Snapshot = [("name".into(), json!("general")), ("topic".into(), json!("new"))].into();
///
/// assert_eq!(
///     diff(&before, &after, EntityKind::Channel),
///     vec![ChangeRecord::values("topic", "old", "new")]
/// );
/// ```
pub fn diff(before: &Snapshot, after: &Snapshot, kind: EntityKind) -> Vec<ChangeRecord> {
    let rules = kind.rules();
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let old = before.get(key);
            let new = after.get(key);
            if old == new || rules.suppressed.contains(&key.as_str()) {
                return None;
            }
            if rules.unsupported.contains(&key.as_str()) {
                return Some(ChangeRecord::updated(key.clone()));
            }
            Some(ChangeRecord::values(
                key.clone(),
                render_value(old),
                render_value(new),
            ))
        })
        .collect()
}

/// Render a snapshot value for inline display
///
/// Absent, `null`, empty strings, empty arrays and empty objects all render
/// as [`EMPTY_PLACEHOLDER`]. `0` and `false` are real values.
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => EMPTY_PLACEHOLDER.to_string(),
        Some(Value::String(s)) if s.is_empty() => EMPTY_PLACEHOLDER.to_string(),
        Some(Value::Array(items)) if items.is_empty() => EMPTY_PLACEHOLDER.to_string(),
        Some(Value::Object(map)) if map.is_empty() => EMPTY_PLACEHOLDER.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| render_value(Some(item)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other @ Value::Object(_)) => other.to_string(),
    }
}

/// Role reference inside a member snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role id
    pub id: EntityId,
    /// Role name at the time of the snapshot
    pub name: String,
}

/// Added or removed member role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChange {
    /// Role the member lost
    Removed(RoleRef),
    /// Role the member gained
    Added(RoleRef),
}

impl fmt::Display for RoleChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleChange::Removed(role) => write!(f, "**Role removed:** {} (`{}`)", role.name, role.id),
            RoleChange::Added(role) => write!(f, "**Role added:** {} (`{}`)", role.name, role.id),
        }
    }
}

/// Roles removed from and added to a member, compared by id
///
/// Removals come first, each group in snapshot order.
pub fn role_changes(before: &[RoleRef], after: &[RoleRef]) -> Vec<RoleChange> {
    let before_ids: HashSet<EntityId> = before.iter().map(|r| r.id).collect();
    let after_ids: HashSet<EntityId> = after.iter().map(|r| r.id).collect();

    let removed = before
        .iter()
        .filter(|r| !after_ids.contains(&r.id))
        .cloned()
        .map(RoleChange::Removed);
    let added = after
        .iter()
        .filter(|r| !before_ids.contains(&r.id))
        .cloned()
        .map(RoleChange::Added);

    removed.chain(added).collect()
}

/// `default_auto_archive_duration` → `Default Auto Archive Duration`
pub fn title_case(field: &str) -> String {
    field
        .split(['_', '.'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

//! Write-through guild caches
//!
//! Both caches mirror rows of the [`SnapshotStore`](crate::traits::SnapshotStore)
//! and share the same per-guild discipline:
//!
//! - Reads never block on I/O and never fail; an unseen guild reads as its
//!   default record while hydration runs in the background.
//! - Every mutation takes the guild's write lock, hydrates if needed, writes
//!   the store, and only then replaces the in-memory record.
//! - Concurrent misses for one guild share a single store fetch. A failed
//!   fetch is not remembered, so the next access tries again.
//! - At most one background hydration per guild is pending, and failure
//!   warnings are rate limited per cache while the store is down.

pub mod filter;
pub mod guild_config;

pub use filter::{FilterCache, FilterChange};
pub use guild_config::{ConfigField, GuildConfigCache};

use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::GuildId;

/// Per-guild coordination state
#[derive(Debug, Default)]
pub(crate) struct Slot {
    /// Serializes mutations of one guild
    pub(crate) write: Mutex<()>,
    /// Set once the guild's row has been fetched (or bulk loaded)
    pub(crate) hydrated: OnceCell<()>,
    /// A background hydration task is pending
    background: AtomicBool,
}

impl Slot {
    /// Run `fetch` unless the slot is already hydrated
    ///
    /// Concurrent callers wait on the one running fetch. On error the slot
    /// stays unhydrated.
    pub(crate) async fn hydrate<F, Fut>(&self, fetch: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.hydrated.get_or_try_init(fetch).await.map(|_| ())
    }

    pub(crate) fn is_hydrated(&self) -> bool {
        self.hydrated.initialized()
    }

    /// Mark hydrated without fetching. Returns `false` if a fetch already
    /// ran or is in flight.
    pub(crate) fn mark_hydrated(&self) -> bool {
        self.hydrated.set(()).is_ok()
    }

    /// Claim the background hydration of this guild. Returns `false` while
    /// another background task holds it.
    pub(crate) fn try_begin_background(&self) -> bool {
        self.background
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_background(&self) {
        self.background.store(false, Ordering::Release);
    }
}

/// How often a cache repeats a background hydration failure at warn level
pub(crate) const HYDRATION_WARN_INTERVAL: Duration = Duration::from_secs(30);

/// Lets one warning through per interval and counts the rest
#[derive(Debug)]
pub(crate) struct WarnThrottle {
    interval: Duration,
    last: std::sync::Mutex<Option<Instant>>,
    held: AtomicUsize,
}

impl WarnThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: std::sync::Mutex::new(None),
            held: AtomicUsize::new(0),
        }
    }

    /// `Some(n)` if a warning may be emitted now, where `n` warnings were
    /// held back since the previous one. `None` while throttled.
    pub(crate) fn allow(&self) -> Option<usize> {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(at) if now.duration_since(at) < self.interval => {
                self.held.fetch_add(1, Ordering::Relaxed);
                None
            }
            _ => {
                *last = Some(now);
                Some(self.held.swap(0, Ordering::Relaxed))
            }
        }
    }

    /// Log a failed hydration at warn level unless throttled
    pub(crate) fn hydration_failed(&self, context: &str, guild_id: GuildId, error: &Error) {
        match self.allow() {
            Some(0) => warn!("{} of guild {} failed: {}", context, guild_id, error),
            Some(held) => warn!(
                "{} of guild {} failed: {} ({} more failure(s) since the last report)",
                context, guild_id, error, held
            ),
            None => debug!("{} of guild {} failed: {}", context, guild_id, error),
        }
    }
}

/// Map from guild to its slot
#[derive(Debug, Default)]
pub(crate) struct Slots {
    inner: DashMap<GuildId, Arc<Slot>>,
}

impl Slots {
    pub(crate) fn slot(&self, guild_id: GuildId) -> Arc<Slot> {
        Arc::clone(self.inner.entry(guild_id).or_default().value())
    }

    pub(crate) fn is_hydrated(&self, guild_id: GuildId) -> bool {
        self.inner
            .get(&guild_id)
            .is_some_and(|slot| slot.is_hydrated())
    }

    pub(crate) fn remove(&self, guild_id: GuildId) {
        self.inner.remove(&guild_id);
    }
}

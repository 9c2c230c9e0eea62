// # Suppression Ledger
//
// Records the bot's own mutations so their echoed platform events are not
// logged as if a third party made them.
//
// ## Entry lifecycle
//
// - armed: `arm` pushes a deadline for `(kind, entity)`
// - consumed: the first matching `consume` pops it
// - expired: the deadline passes; `consume` ignores it and `sweep` drops it
//
// Arming a key twice suppresses two events. Each key is a sharded map
// entry, so `consume` is atomic per key and never blocks other keys.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::EventKind;
use crate::model::EntityId;

/// Skip-once set for self-triggered platform events
///
/// Cloning is cheap and clones share the same entries.
#[derive(Debug, Clone)]
pub struct SuppressionLedger {
    entries: Arc<DashMap<(EventKind, EntityId), VecDeque<Instant>>>,
    ttl: Duration,
}

impl SuppressionLedger {
    /// Create a ledger whose entries expire after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Suppress the next `kind` event about `entity`
    ///
    /// Call immediately before performing the mutation that will echo.
    pub fn arm(&self, kind: EventKind, entity: EntityId) {
        let deadline = Instant::now() + self.ttl;
        self.entries
            .entry((kind, entity))
            .or_default()
            .push_back(deadline);
        trace!("Armed suppression for {:?} on {}", kind, entity);
    }

    /// Consume one live entry for `(kind, entity)`
    ///
    /// Returns `true` if the event should be skipped. Of two concurrent
    /// calls racing for a single entry, exactly one returns `true`.
    pub fn consume(&self, kind: EventKind, entity: EntityId) -> bool {
        let now = Instant::now();
        let Entry::Occupied(mut entry) = self.entries.entry((kind, entity)) else {
            return false;
        };

        let deadlines = entry.get_mut();
        while deadlines.front().is_some_and(|deadline| *deadline <= now) {
            deadlines.pop_front();
        }
        let consumed = deadlines.pop_front().is_some();
        if deadlines.is_empty() {
            entry.remove();
        }

        if consumed {
            debug!("Suppressed {:?} event on {}", kind, entity);
        }
        consumed
    }

    /// Drop every expired entry
    ///
    /// # Returns
    ///
    /// The number of entries dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut dropped = 0;
        self.entries.retain(|_, deadlines| {
            let before = deadlines.len();
            deadlines.retain(|deadline| *deadline > now);
            dropped += before - deadlines.len();
            !deadlines.is_empty()
        });
        if dropped > 0 {
            debug!("Swept {} expired suppression entr(ies)", dropped);
        }
        dropped
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current runtime
    ///
    /// The task runs until its handle is aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let ledger = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                ledger.sweep();
            }
        })
    }

    /// Number of armed, not yet swept entries
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    /// Whether no entry is armed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Contract Test: Cache and Store Consistency
//!
//! Constraints verified:
//! - Reads never fail; unseen guilds read as default-configured
//! - A rejected store write leaves the cache unchanged
//! - Concurrent misses for one guild share a single store fetch
//! - A failed fetch is retried on the next access
//! - Repeated misses keep at most one background fetch pending per guild
//! - Filter mutations are idempotent and never lose concurrent updates
//! - Rewriting a filter row keeps every entry already stored
//!
//! If this test fails, someone has:
//! - Mutated the cache before the store acknowledged a write
//! - Cached a failed hydration as a negative result
//! - Replaced per-guild locking with unsynchronized read-modify-write

mod common;

use bronn_core::cache::{ConfigField, FilterChange, GuildConfigCache};
use bronn_core::error::Error;
use bronn_core::model::{ChannelId, GuildConfigRecord, GuildId, LogCategory};
use bronn_core::traits::SnapshotStore;
use common::*;
use std::time::Duration;

#[tokio::test]
async fn unseen_guild_reads_as_default() {
    let harness = Harness::new();

    for id in [0u64, 1, 42, u64::MAX] {
        let record = harness.guilds.get(GuildId(id));
        assert_eq!(record, GuildConfigRecord::new(GuildId(id)));
        assert!(record.log_channel(LogCategory::Moderation).is_unset());
    }
    assert!(harness.filters.get(GuildId(42)).is_empty());
}

#[tokio::test]
async fn rejected_config_write_leaves_cache_and_store_unchanged() {
    let harness = Harness::new();
    harness.configure_logging(1, 100).await;
    let before = harness.guilds.get(GuildId(1));

    harness.store.fail_writes(true);
    let err = harness
        .guilds
        .set(
            GuildId(1),
            ConfigField::LogChannel(LogCategory::Moderation, ChannelId(200)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Persistence(_)));
    assert_eq!(harness.guilds.get(GuildId(1)), before);
    assert_eq!(
        harness.store.inner().get_guild_config(GuildId(1)).await.unwrap(),
        Some(before)
    );
}

#[tokio::test]
async fn rejected_filter_write_leaves_cache_unchanged() {
    let harness = Harness::new();
    harness.filters.append(GuildId(1), "png").await.unwrap();

    harness.store.fail_writes(true);
    assert!(harness.filters.append(GuildId(1), "exe").await.is_err());
    assert!(harness.filters.remove(GuildId(1), "png").await.is_err());

    assert!(harness.filters.contains(GuildId(1), "png"));
    assert!(!harness.filters.contains(GuildId(1), "exe"));
}

#[tokio::test]
async fn appending_twice_is_a_noop() {
    let harness = Harness::new();

    let first = harness.filters.append(GuildId(3), ".zip").await.unwrap();
    let writes = harness.store.writes();
    let second = harness.filters.append(GuildId(3), "ZIP").await.unwrap();

    assert_eq!(first, FilterChange::Applied(".zip".to_string()));
    assert_eq!(second, FilterChange::Unchanged(".zip".to_string()));
    assert_eq!(harness.filters.get(GuildId(3)).len(), 1);
    assert_eq!(harness.store.writes(), writes);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_lose_no_update() {
    let harness = Harness::new();
    let extensions: Vec<String> = (0..20).map(|i| format!("ext{}", i)).collect();

    let mut handles = Vec::new();
    for ext in &extensions {
        let filters = harness.filters.clone();
        let ext = ext.clone();
        handles.push(tokio::spawn(async move {
            filters.append(GuildId(9), &ext).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_applied());
    }

    let cached = harness.filters.get(GuildId(9));
    let stored = harness
        .store
        .inner()
        .get_filter_record(GuildId(9))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.len(), 20);
    assert_eq!(stored, cached);
    for ext in &extensions {
        assert!(cached.contains(ext));
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_fetch() {
    let harness = Harness::new();
    harness.store.delay_reads(Duration::from_millis(50));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let guilds = harness.guilds.clone();
        handles.push(tokio::spawn(async move {
            guilds.get_hydrated(GuildId(5)).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), GuildConfigRecord::new(GuildId(5)));
    }

    assert_eq!(harness.store.guild_reads(), 1);
}

#[tokio::test(start_paused = true)]
async fn misses_while_store_is_down_keep_one_fetch_pending() {
    let harness = Harness::new();
    harness.store.fail_reads(true);
    harness.store.delay_reads(Duration::from_millis(50));

    for _ in 0..100 {
        assert!(harness.guilds.get(GuildId(7)).mod_log.is_unset());
        assert!(harness.filters.get(GuildId(7)).is_empty());
    }
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.store.guild_reads(), 1);
    assert_eq!(harness.store.filter_reads(), 1);

    // The failed attempt is not remembered, so the next miss tries again
    harness.guilds.get(GuildId(7));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.store.guild_reads(), 2);
}

#[tokio::test]
async fn failed_hydration_is_retried() {
    let harness = Harness::new();
    let mut row = GuildConfigRecord::new(GuildId(6));
    row.mod_log = ChannelId(66);
    harness.store.inner().upsert_guild_config(&row).await.unwrap();

    harness.store.fail_reads(true);
    assert!(harness.guilds.get_hydrated(GuildId(6)).await.mod_log.is_unset());

    harness.store.fail_reads(false);
    assert_eq!(harness.guilds.get_hydrated(GuildId(6)).await, row);
    assert_eq!(harness.store.guild_reads(), 2);
}

#[tokio::test]
async fn write_during_failed_hydration_is_rejected() {
    let harness = Harness::new();
    harness.store.fail_reads(true);

    let err = harness
        .guilds
        .set(GuildId(7), ConfigField::Premium(true))
        .await
        .unwrap_err();
    assert!(err.is_persistence());
    assert_eq!(harness.store.writes(), 0);
}

#[tokio::test]
async fn bulk_load_warms_every_row() {
    let store = FlakyStore::new();
    for id in 1..=3u64 {
        let mut row = GuildConfigRecord::new(GuildId(id));
        row.message_log = ChannelId(id * 10);
        store.inner().upsert_guild_config(&row).await.unwrap();
    }

    let guilds = GuildConfigCache::new(store.clone());
    assert_eq!(guilds.bulk_load().await.unwrap(), 3);
    assert_eq!(guilds.len(), 3);
    assert_eq!(guilds.get(GuildId(2)).message_log, ChannelId(20));

    // Warm guilds never hit the store again
    guilds.get_hydrated(GuildId(2)).await;
    assert_eq!(store.guild_reads(), 0);
}

#[tokio::test]
async fn resync_picks_up_external_changes() {
    let harness = Harness::new();
    harness.filters.append(GuildId(8), "png").await.unwrap();

    harness
        .store
        .inner()
        .upsert_filter_record(GuildId(8), &[".gif".to_string(), ".png".to_string()])
        .await
        .unwrap();
    assert!(!harness.filters.contains(GuildId(8), "gif"));

    harness.filters.resync(GuildId(8)).await.unwrap();
    assert!(harness.filters.contains(GuildId(8), "gif"));
    assert_eq!(
        harness.filters.list(GuildId(8)).await.unwrap(),
        vec![".gif", ".png"]
    );
}

#[tokio::test]
async fn append_never_drops_stored_entries() {
    let harness = Harness::new();
    let stored: Vec<String> = [".tar.gz", ".png", "my file"]
        .into_iter()
        .map(String::from)
        .collect();
    harness
        .store
        .inner()
        .upsert_filter_record(GuildId(11), &stored)
        .await
        .unwrap();

    let change = harness.filters.append(GuildId(11), "jpg").await.unwrap();
    assert_eq!(change, FilterChange::Applied(".jpg".to_string()));

    let record = harness
        .store
        .inner()
        .get_filter_record(GuildId(11))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.extensions(), &[".tar.gz", ".png", "my file", ".jpg"]);
    assert!(harness.filters.contains(GuildId(11), ".TAR.GZ"));
}

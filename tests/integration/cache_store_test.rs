//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存存储集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{key, setup_logging, FailingStorage, Stats};
use oxsync::backend::{KeyValueStorage, MemoryStorage};
use oxsync::cache::{CacheStore, ManualClock};
use std::sync::Arc;
use std::time::Duration;

const START: i64 = 1_700_000_000_000;

fn stats(k: &str, version: usize) -> Stats {
    Stats {
        key: k.to_string(),
        version,
    }
}

fn store(
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<ManualClock>,
    ttl: Duration,
) -> CacheStore<Stats> {
    CacheStore::new("dashboard", storage, ttl).with_clock(clock)
}

#[tokio::test]
async fn test_five_minute_ttl_window() {
    setup_logging();

    let clock = Arc::new(ManualClock::new(START));
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new(100));
    let cache = store(storage.clone(), clock.clone(), Duration::from_secs(300));

    cache.write(&key("w-1"), &stats("w-1", 1)).await;

    clock.advance(Duration::from_secs(240));
    assert_eq!(cache.read(&key("w-1")).await, Some(stats("w-1", 1)));

    // 恰好等于 TTL 时已经过期
    clock.set(START + 300_000);
    assert_eq!(cache.read(&key("w-1")).await, None);

    // 过期条目被惰性删除
    assert!(storage.get("dashboard_cache_w-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_identity_mismatch_is_miss_and_kept() {
    setup_logging();

    let clock = Arc::new(ManualClock::new(START));
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new(100));
    let cache = store(storage, clock, Duration::from_secs(600))
        .with_key_template("manager_warehouses_cache");

    cache.write(&key("m-1"), &stats("m-1", 1)).await;

    assert_eq!(cache.read(&key("m-2")).await, None);
    let entry = cache.peek(&key("m-2")).await.unwrap();
    assert_eq!(entry.identity, "m-1");
    assert_eq!(cache.read(&key("m-1")).await, Some(stats("m-1", 1)));
}

#[tokio::test]
async fn test_write_overwrites_and_restamps() {
    setup_logging();

    let clock = Arc::new(ManualClock::new(START));
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new(100));
    let cache = store(storage, clock.clone(), Duration::from_secs(300));

    cache.write(&key("w-1"), &stats("w-1", 1)).await;
    clock.advance(Duration::from_secs(200));
    cache.write(&key("w-1"), &stats("w-1", 2)).await;

    let entry = cache.peek(&key("w-1")).await.unwrap();
    assert_eq!(entry.stored_at, START + 200_000);
    assert_eq!(entry.value.version, 2);

    clock.advance(Duration::from_secs(200));
    assert_eq!(cache.read(&key("w-1")).await, Some(stats("w-1", 2)));
}

#[tokio::test]
async fn test_partial_structures_are_misses() {
    setup_logging();

    let clock = Arc::new(ManualClock::new(START));
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new(100));
    let cache = store(storage.clone(), clock, Duration::from_secs(300));

    let samples: [&[u8]; 4] = [
        b"",
        b"{\"value\":{\"key\":\"w-1\",\"version\":1},\"stored_at\":",
        b"{\"value\":{\"key\":\"w-1\"},\"stored_at\":1,\"identity\":\"w-1\"}",
        b"[1,2,3]",
    ];
    for sample in samples {
        storage
            .set("dashboard_cache_w-1", sample.to_vec())
            .await
            .unwrap();
        assert_eq!(cache.read(&key("w-1")).await, None);
    }
}

#[tokio::test]
async fn test_storage_errors_are_swallowed() {
    setup_logging();

    let clock = Arc::new(ManualClock::new(START));
    let cache = store(Arc::new(FailingStorage), clock, Duration::from_secs(300));

    cache.write(&key("w-1"), &stats("w-1", 1)).await;
    assert_eq!(cache.read(&key("w-1")).await, None);
    cache.remove(&key("w-1")).await;
    assert!(cache.peek(&key("w-1")).await.is_none());
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    setup_logging();

    let clock = Arc::new(ManualClock::new(START));
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new(100));
    let cache = store(storage, clock, Duration::from_secs(300));

    cache.write(&key("w-1"), &stats("w-1", 1)).await;
    cache.remove(&key("w-1")).await;
    cache.remove(&key("w-1")).await;
    assert_eq!(cache.read(&key("w-1")).await, None);
}

#[tokio::test]
async fn test_handles_share_storage_with_own_ttl() {
    setup_logging();

    let clock = Arc::new(ManualClock::new(START));
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new(100));
    let short = store(storage.clone(), clock.clone(), Duration::from_secs(60));
    let long = store(storage, clock.clone(), Duration::from_secs(600));

    long.write(&key("w-1"), &stats("w-1", 1)).await;
    clock.advance(Duration::from_secs(120));

    assert_eq!(long.read(&key("w-1")).await, Some(stats("w-1", 1)));
    assert_eq!(short.read(&key("w-1")).await, None);
    // 短TTL的句柄删除了共享条目
    assert_eq!(long.read(&key("w-1")).await, None);
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 推送失效集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{key, setup_logging, Stats, TestSource};
use oxsync::backend::MemoryStorage;
use oxsync::client::{ResourceSynchronizer, SyncDeps, SyncOptions};
use oxsync::presets;
use oxsync::sync::channel::LocalChannel;
use oxsync::sync::debounce::MAX_DEBOUNCE_DELAY;
use oxsync::{ChangeEvent, SyncError};
use rand::seq::SliceRandom;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn deps(channel: &Arc<LocalChannel>) -> SyncDeps {
    SyncDeps::new(Arc::new(MemoryStorage::new(1000))).with_channel(channel.clone())
}

fn attendance_options(debounce_ms: u64) -> SyncOptions {
    SyncOptions::new("dashboard")
        .with_realtime(true)
        .with_debounce(Duration::from_millis(debounce_ms))
        .with_filter("attendance", Some("warehouse_id=eq.{key}"))
        .with_filter("leave_applications", Some("warehouse_id=eq.{key}"))
}

fn attendance(warehouse: &str) -> ChangeEvent {
    ChangeEvent::insert("attendance", json!({"warehouse_id": warehouse, "worker": "w"}))
}

#[tokio::test(start_paused = true)]
async fn test_burst_within_debounce_yields_one_refresh() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(500),
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();
    assert!(sync.is_subscribed().await);
    assert_eq!(source.calls(), 1);

    for _ in 0..3 {
        channel.send(attendance("w-1"));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    // 最后一个事件之后还没安静满 500ms
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(source.calls(), 1);

    // 失效绕过仍然有效的缓存
    source.wait_for_calls(2).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(source.calls(), 2);
    assert_eq!(sync.value().unwrap().version, 2);
}

#[tokio::test(start_paused = true)]
async fn test_events_for_other_keys_are_ignored() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let _sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(0),
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();

    channel.send(attendance("w-2"));
    channel.send(ChangeEvent::insert("vehicles", json!({"warehouse_id": "w-1"})));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unordered_duplicates_coalesce() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let _sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(200),
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();

    let mut events = vec![
        attendance("w-1"),
        attendance("w-1"),
        ChangeEvent::update(
            "attendance",
            json!({"warehouse_id": "w-1"}),
            json!({"warehouse_id": "w-1", "status": "late"}),
        ),
        ChangeEvent::delete("leave_applications", json!({"warehouse_id": "w-1"})),
        attendance("w-2"),
        attendance("w-3"),
        ChangeEvent::insert("vehicles", json!({})),
    ];
    events.shuffle(&mut rand::thread_rng());
    for event in events {
        channel.send(event);
    }

    source.wait_for_calls(2).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_delete_matches_on_old_row() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let _sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(0),
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();

    channel.send(ChangeEvent::delete(
        "leave_applications",
        json!({"warehouse_id": "w-1"}),
    ));
    source.wait_for_calls(2).await;
}

#[tokio::test(start_paused = true)]
async fn test_key_change_moves_subscription() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(0),
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();

    sync.set_key(key("w-2")).await;
    assert_eq!(channel.active_subscriptions(), 1);
    assert_eq!(source.calls(), 2);

    channel.send(attendance("w-1"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 2);

    channel.send(attendance("w-2"));
    source.wait_for_calls(3).await;
    assert_eq!(sync.value().unwrap().key, "w-2");
}

#[tokio::test(start_paused = true)]
async fn test_dashboard_preset_refreshes_immediately() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let options = SyncOptions::from_config(
        presets::DASHBOARD,
        &presets::dashboard(),
        &Default::default(),
    );
    let _sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        options,
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();

    channel.send(ChangeEvent::insert(
        "piece_work_records",
        json!({"warehouse_id": "w-1", "pieces": 12}),
    ));
    source.wait_for_calls(2).await;
}

#[tokio::test(start_paused = true)]
async fn test_detach_closes_subscription() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(0),
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();

    sync.detach().await;
    assert!(!sync.is_subscribed().await);
    assert_eq!(channel.active_subscriptions(), 0);

    channel.send(attendance("w-1"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_drop_releases_subscription() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(64));
    let source = TestSource::new();
    let sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(0),
        source.clone(),
        deps(&channel),
    )
    .await
    .unwrap();
    assert_eq!(channel.active_subscriptions(), 1);

    drop(sync);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(channel.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_realtime_without_channel_is_disabled() {
    setup_logging();

    let source = TestSource::new();
    let sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        attendance_options(0),
        source.clone(),
        SyncDeps::new(Arc::new(MemoryStorage::new(100))),
    )
    .await
    .unwrap();

    assert!(!sync.realtime_enabled());
    assert!(!sync.is_subscribed().await);
    assert!(sync.value().is_some());
}

#[tokio::test]
async fn test_realtime_requires_filters() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(8));
    let source = TestSource::new();
    let err = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        SyncOptions::new("dashboard").with_realtime(true),
        source.clone(),
        deps(&channel),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, SyncError::ConfigError(_)));

    let err = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        SyncOptions::new("dashboard")
            .with_realtime(true)
            .with_filter("attendance", Some("warehouse_id>3")),
        source.clone(),
        deps(&channel),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, SyncError::ConfigError(_)));
    assert_eq!(source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_oversized_debounce_is_capped() {
    setup_logging();

    let channel = Arc::new(LocalChannel::new(8));
    let source = TestSource::new();
    let options = attendance_options(0).with_debounce(Duration::MAX);
    assert_eq!(options.debounce, MAX_DEBOUNCE_DELAY);

    let sync =
        ResourceSynchronizer::<Stats>::attach(key("w-1"), options, source.clone(), deps(&channel))
            .await
            .unwrap();

    channel.send(attendance("w-1"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);
    assert!(sync.is_subscribed().await);
    assert_eq!(channel.active_subscriptions(), 1);
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! Redis存储和推送通道集成测试，Redis不可用时跳过

#[path = "../common/mod.rs"]
mod common;

use common::{key, redis_url, setup_logging, Stats, TestSource};
use oxsync::backend::{KeyValueStorage, RedisStorage};
use oxsync::client::{ResourceSynchronizer, SyncDeps, SyncOptions};
use oxsync::sync::channel::{EventHandler, PushChannel, RedisChannel, SubscriptionDescriptor};
use oxsync::sync::event::EventFilter;
use oxsync::ChangeEvent;
use secrecy::SecretString;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn prefix() -> String {
    format!("oxsync:test:{}", uuid::Uuid::new_v4().simple())
}

#[tokio::test]
async fn test_redis_storage_operations() {
    setup_logging();

    if !common::is_redis_available().await {
        println!("Skipping test_redis_storage_operations because Redis is not available");
        return;
    }

    let url: SecretString = redis_url().into();
    let storage = RedisStorage::connect(&url, 2000).await.unwrap();
    let slot = format!("{}:slot", prefix());

    storage.set(&slot, b"payload".to_vec()).await.unwrap();
    assert_eq!(storage.get(&slot).await.unwrap(), Some(b"payload".to_vec()));
    storage.remove(&slot).await.unwrap();
    storage.remove(&slot).await.unwrap();
    assert_eq!(storage.get(&slot).await.unwrap(), None);
}

#[tokio::test]
async fn test_redis_channel_delivers_events() {
    setup_logging();

    if !common::is_redis_available().await {
        println!("Skipping test_redis_channel_delivers_events because Redis is not available");
        return;
    }

    let url: SecretString = redis_url().into();
    let channel = RedisChannel::connect(&url, 2000, &prefix()).await.unwrap();
    let descriptor = SubscriptionDescriptor::new(
        "dashboard",
        &key("w-1"),
        vec![EventFilter::table("attendance")],
        0,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handler: EventHandler = Arc::new(move |event| {
        let _ = tx.send(event);
    });
    let handle = channel.subscribe(&descriptor, handler).await.unwrap();

    let event = ChangeEvent::insert("attendance", json!({"warehouse_id": "w-1"}));
    channel.publish(&event).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, event);

    channel.unsubscribe(&handle).await.unwrap();
    assert_eq!(channel.active_subscriptions(), 0);
}

#[tokio::test]
async fn test_synchronizer_over_redis() {
    setup_logging();

    if !common::is_redis_available().await {
        println!("Skipping test_synchronizer_over_redis because Redis is not available");
        return;
    }

    let url: SecretString = redis_url().into();
    let prefix = prefix();
    let storage = Arc::new(RedisStorage::connect(&url, 2000).await.unwrap());
    let channel = Arc::new(RedisChannel::connect(&url, 2000, &prefix).await.unwrap());
    let kind = format!("dashboard_{}", uuid::Uuid::new_v4().simple());

    let source = TestSource::new();
    let sync = ResourceSynchronizer::<Stats>::attach(
        key("w-1"),
        SyncOptions::new(kind.as_str())
            .with_realtime(true)
            .with_filter("attendance", Some("warehouse_id=eq.{key}")),
        source.clone(),
        SyncDeps::new(storage.clone()).with_channel(channel.clone()),
    )
    .await
    .unwrap();
    assert_eq!(source.calls(), 1);

    // 订阅连接建立后再发布
    tokio::time::sleep(Duration::from_millis(100)).await;
    channel
        .publish(&ChangeEvent::insert("attendance", json!({"warehouse_id": "w-1"})))
        .await
        .unwrap();
    source.wait_for_calls(2).await;

    sync.clear_cache().await;
    sync.detach().await;
}

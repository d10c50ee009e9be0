//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use oxsync::backend::KeyValueStorage;
use oxsync::client::{RemoteSource, ResourceKey};
use oxsync::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::sync::Once;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 测试用的聚合值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub key: String,
    /// 第几次拉取得到的值
    pub version: usize,
}

/// 记录调用次数的远程数据源
///
/// `gated` 中的键会阻塞在闸门上直到 `release` 被调用；`fail` 打开时所有拉取失败。
pub struct TestSource {
    calls: AtomicUsize,
    fail: AtomicBool,
    gate_all: AtomicBool,
    gated: Mutex<HashSet<String>>,
    gate: Semaphore,
}

impl TestSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            gate_all: AtomicBool::new(false),
            gated: Mutex::new(HashSet::new()),
            gate: Semaphore::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// 之后所有键的拉取都等待闸门
    pub fn gate_all(&self, on: bool) {
        self.gate_all.store(on, Ordering::SeqCst);
    }

    pub fn gate_key(&self, key: &str) {
        self.gated.lock().unwrap().insert(key.to_string());
    }

    /// 放行 `n` 个被阻塞的拉取
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// 等待拉取次数达到 `n`
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..1000 {
            if self.calls() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {} calls, got {}", n, self.calls());
    }
}

#[async_trait]
impl RemoteSource<Stats> for TestSource {
    async fn fetch(&self, key: &ResourceKey) -> Result<Stats> {
        let version = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gated =
            self.gate_all.load(Ordering::SeqCst) || self.gated.lock().unwrap().contains(key.as_str());
        if gated {
            self.gate.acquire().await.unwrap().forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SyncError::Fetch(format!("remote rejected {}", key)));
        }
        Ok(Stats {
            key: key.to_string(),
            version,
        })
    }
}

/// 统计访问次数的存储包装
pub struct CountingStorage {
    inner: Arc<dyn KeyValueStorage>,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
    pub removes: AtomicUsize,
}

impl CountingStorage {
    pub fn new(inner: Arc<dyn KeyValueStorage>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            removes: AtomicUsize::new(0),
        })
    }

    pub fn total(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
            + self.sets.load(Ordering::SeqCst)
            + self.removes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStorage for CountingStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(key).await
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// 所有操作都失败的存储
pub struct FailingStorage;

#[async_trait]
impl KeyValueStorage for FailingStorage {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(SyncError::Storage("disk unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<()> {
        Err(SyncError::Storage("disk unavailable".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<()> {
        Err(SyncError::Storage("disk unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

pub fn key(s: &str) -> ResourceKey {
    ResourceKey::new(s).unwrap()
}

pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// 检查Redis是否可用
pub async fn is_redis_available() -> bool {
    let url: secrecy::SecretString = redis_url().into();
    oxsync::backend::redis_store::connect(&url, 1000).await.is_ok()
}

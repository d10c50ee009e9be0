//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于内存的存储后端。

use super::KeyValueStorage;
use crate::error::Result;
use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, instrument};

/// 内存存储后端
///
/// 基于Moka，进程退出后数据丢失。过期由缓存层按条目时间戳惰性判断，
/// 这里只负责按容量淘汰。
#[derive(Clone)]
pub struct MemoryStorage {
    cache: Cache<String, Vec<u8>>,
}

impl MemoryStorage {
    /// 创建新的内存存储
    ///
    /// # 参数
    ///
    /// * `max_entries` - 最大条目数
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_entries).build(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(10000)
    }
}

#[async_trait]
impl KeyValueStorage for MemoryStorage {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.cache.get(key).await;
        debug!("memory get: key={}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        debug!("memory set: key={}, value_len={}", key, value.len());
        self.cache.insert(key.to_string(), value).await;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, key: &str) -> Result<()> {
        self.cache.remove(key).await;
        debug!("memory remove: key={}", key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

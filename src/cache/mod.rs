//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了带有效期和身份标记的缓存存储。

pub mod clock;

use crate::backend::KeyValueStorage;
use crate::client::ResourceKey;
use crate::metrics::GLOBAL_METRICS;
use crate::serialization::{Serializer, SerializerEnum};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub use clock::{Clock, ManualClock, SystemClock};

/// 默认存储槽模板
pub const DEFAULT_KEY_TEMPLATE: &str = "{kind}_cache_{key}";

/// 缓存条目
///
/// 有效当且仅当 `now - stored_at < ttl` 且 `identity` 等于当前请求的资源键。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// 缓存的值
    pub value: T,
    /// 写入时间，Unix 毫秒
    pub stored_at: i64,
    /// 拉取该值时使用的资源键
    pub identity: String,
}

impl<T> CacheEntry<T> {
    /// 条目年龄（毫秒）
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.stored_at)
    }

    /// 判断条目对给定键是否有效
    pub fn is_valid_for(&self, key: &str, ttl: Duration, now_millis: i64) -> bool {
        self.identity == key && self.age_millis(now_millis) < duration_millis(ttl)
    }
}

fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// 缓存存储
///
/// 每个消费者配置持有一个句柄（携带自己的TTL和存储槽模板），底层存储在进程内共享。
/// 存储层的任何错误和损坏数据都在这里被吞掉：读变成未命中，写和删变成空操作。
pub struct CacheStore<T> {
    kind: String,
    storage: Arc<dyn KeyValueStorage>,
    key_template: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    serializer: SerializerEnum,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheStore<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            storage: self.storage.clone(),
            key_template: self.key_template.clone(),
            ttl: self.ttl,
            clock: self.clock.clone(),
            serializer: self.serializer.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for CacheStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("kind", &self.kind)
            .field("storage", &self.storage.name())
            .field("key_template", &self.key_template)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl<T> CacheStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// 创建新的缓存存储
    ///
    /// # 参数
    ///
    /// * `kind` - 资源类型名称
    /// * `storage` - 共享的底层存储
    /// * `ttl` - 条目有效期
    pub fn new(kind: impl Into<String>, storage: Arc<dyn KeyValueStorage>, ttl: Duration) -> Self {
        Self {
            kind: kind.into(),
            storage,
            key_template: DEFAULT_KEY_TEMPLATE.to_string(),
            ttl,
            clock: Arc::new(SystemClock),
            serializer: SerializerEnum::default(),
            _marker: PhantomData,
        }
    }

    /// 设置存储槽模板
    ///
    /// 模板中没有 `{key}` 时，同一类型的所有键共用一个槽，依靠身份校验区分。
    pub fn with_key_template(mut self, template: impl Into<String>) -> Self {
        self.key_template = template.into();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// 计算资源键对应的存储槽
    pub fn storage_key(&self, key: &ResourceKey) -> String {
        self.key_template
            .replace("{kind}", &self.kind)
            .replace("{key}", key.as_str())
    }

    /// 读取不做任何校验的原始条目，不会触发淘汰
    pub async fn peek(&self, key: &ResourceKey) -> Option<CacheEntry<T>> {
        let storage_key = self.storage_key(key);
        match self.storage.get(&storage_key).await {
            Ok(Some(bytes)) => self.serializer.deserialize(&bytes).ok(),
            Ok(None) => None,
            Err(e) => {
                warn!("读取缓存失败: key={}, error={}", storage_key, e);
                None
            }
        }
    }

    /// 读取有效的缓存值
    ///
    /// 过期条目会被删除；身份不匹配的条目视为未命中，但保留原样。
    #[instrument(skip(self), level = "debug", fields(kind = %self.kind))]
    pub async fn read(&self, key: &ResourceKey) -> Option<T> {
        let storage_key = self.storage_key(key);

        let bytes = match self.storage.get(&storage_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                GLOBAL_METRICS.record_cache(&self.kind, "miss");
                return None;
            }
            Err(e) => {
                warn!("读取缓存失败: key={}, error={}", storage_key, e);
                GLOBAL_METRICS.record_cache(&self.kind, "storage_error");
                return None;
            }
        };

        let entry: CacheEntry<T> = match self.serializer.deserialize(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("缓存条目损坏，按未命中处理: key={}, error={}", storage_key, e);
                GLOBAL_METRICS.record_cache(&self.kind, "corrupt");
                return None;
            }
        };

        if entry.identity != key.as_str() {
            debug!(
                "cache identity mismatch: slot={}, stored_for={}, requested={}",
                storage_key, entry.identity, key
            );
            GLOBAL_METRICS.record_cache(&self.kind, "identity_mismatch");
            return None;
        }

        let now = self.clock.now_millis();
        if !entry.is_valid_for(key.as_str(), self.ttl, now) {
            debug!(
                "cache expired: key={}, age_ms={}",
                storage_key,
                entry.age_millis(now)
            );
            if let Err(e) = self.storage.remove(&storage_key).await {
                warn!("删除过期缓存失败: key={}, error={}", storage_key, e);
            }
            GLOBAL_METRICS.record_cache(&self.kind, "expired");
            return None;
        }

        GLOBAL_METRICS.record_cache(&self.kind, "hit");
        Some(entry.value)
    }

    /// 写入缓存值，无条件覆盖旧条目
    #[instrument(skip(self, value), level = "debug", fields(kind = %self.kind))]
    pub async fn write(&self, key: &ResourceKey, value: &T) {
        let storage_key = self.storage_key(key);
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now_millis(),
            identity: key.as_str().to_string(),
        };

        let bytes = match self.serializer.serialize(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("序列化缓存条目失败: key={}, error={}", storage_key, e);
                return;
            }
        };

        match self.storage.set(&storage_key, bytes).await {
            Ok(()) => GLOBAL_METRICS.record_cache(&self.kind, "write"),
            Err(e) => {
                warn!("保存缓存失败: key={}, error={}", storage_key, e);
                GLOBAL_METRICS.record_cache(&self.kind, "write_error");
            }
        }
    }

    /// 删除缓存条目，条目不存在时为空操作
    #[instrument(skip(self), level = "debug", fields(kind = %self.kind))]
    pub async fn remove(&self, key: &ResourceKey) {
        let storage_key = self.storage_key(key);
        if let Err(e) = self.storage.remove(&storage_key).await {
            warn!("清除缓存失败: key={}, error={}", storage_key, e);
        }
    }
}

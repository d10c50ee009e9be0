//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存条目的持久化后端，包括内存、文件和Redis三种实现。

pub mod file;
pub mod memory;
pub mod redis_store;

use crate::config::{StorageBackendType, StorageConfig};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use redis_store::RedisStorage;

/// 键值存储特征
///
/// 缓存层唯一依赖的持久化接口。后端在构造时选定一次，调用方不关心具体实现。
#[async_trait]
pub trait KeyValueStorage: Send + Sync {
    /// 读取原始字节，不存在时返回None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 写入原始字节，覆盖已有值
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// 删除键，键不存在时不报错
    async fn remove(&self, key: &str) -> Result<()>;

    /// 后端名称，用于日志
    fn name(&self) -> &'static str;
}

/// 根据配置构建存储后端
#[instrument(skip(config), level = "info", fields(backend = ?config.backend))]
pub async fn build_storage(config: &StorageConfig) -> Result<Arc<dyn KeyValueStorage>> {
    let storage: Arc<dyn KeyValueStorage> = match config.backend {
        StorageBackendType::Memory => Arc::new(MemoryStorage::new(config.max_entries)),
        StorageBackendType::File => {
            let path = config.path.as_ref().ok_or_else(|| {
                SyncError::ConfigError("File storage requires storage.path".to_string())
            })?;
            Arc::new(FileStorage::new(path).await?)
        }
        StorageBackendType::Redis => Arc::new(
            RedisStorage::connect(&config.connection_string, config.connection_timeout_ms).await?,
        ),
    };
    info!("Storage backend initialized: {}", storage.name());
    Ok(storage)
}

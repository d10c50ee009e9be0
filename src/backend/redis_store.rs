//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的共享存储后端，以及Redis连接的建立逻辑。

use super::KeyValueStorage;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument};

/// 打开Redis客户端并建立连接管理器
///
/// 连接建立受 `timeout_ms` 限制，超时返回 `SyncError::Timeout`。
pub async fn connect(
    connection_string: &SecretString,
    timeout_ms: u64,
) -> Result<(Client, ConnectionManager)> {
    let client = Client::open(connection_string.expose_secret())?;
    let manager = match timeout(
        Duration::from_millis(timeout_ms),
        client.get_connection_manager(),
    )
    .await
    {
        Ok(res) => res?,
        Err(_) => {
            return Err(SyncError::Timeout(format!(
                "Redis connection timed out after {}ms",
                timeout_ms
            )))
        }
    };
    Ok((client, manager))
}

/// Redis存储后端
///
/// 多个进程可以共享同一份缓存条目；同一个键的并发写入以最后一次为准。
#[derive(Clone)]
pub struct RedisStorage {
    manager: ConnectionManager,
}

impl std::fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RedisStorage")
    }
}

impl RedisStorage {
    /// 连接Redis并创建存储后端
    #[instrument(skip(connection_string), level = "info", name = "init_redis_storage")]
    pub async fn connect(connection_string: &SecretString, timeout_ms: u64) -> Result<Self> {
        let (_, manager) = connect(connection_string, timeout_ms).await?;
        Ok(Self { manager })
    }

    /// 使用已有连接管理器创建存储后端
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl KeyValueStorage for RedisStorage {
    #[instrument(skip(self), level = "debug")]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        debug!("redis get: key={}, found={}", key, value.is_some());
        Ok(value)
    }

    #[instrument(skip(self, value), level = "debug")]
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

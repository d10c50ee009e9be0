//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了消费者使用的资源同步器，以及它依赖的远程数据源接口。

pub mod synchronizer;

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use std::future::Future;
use std::str::FromStr;

pub use synchronizer::{
    LoadStatus, ResourceState, ResourceSynchronizer, SyncDeps, SyncOptions, WeakSynchronizer,
};

/// 资源键的最大长度
pub const MAX_KEY_LENGTH: usize = 256;

/// 资源键
///
/// 标识被缓存和同步的远程聚合，例如仓库ID或管理员ID。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// 创建资源键，空白、过长或包含控制字符的键会被拒绝
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(SyncError::InvalidKey("resource key cannot be empty".to_string()));
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(SyncError::InvalidKey(format!(
                "resource key exceeds {} bytes",
                MAX_KEY_LENGTH
            )));
        }
        if key.chars().any(char::is_control) {
            return Err(SyncError::InvalidKey(
                "resource key contains control characters".to_string(),
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for ResourceKey {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ResourceKey {
    type Error = SyncError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

/// 远程数据源
///
/// 对同步层是不透明的异步拉取函数。拒绝和超时都以错误返回，同步层对二者一视同仁。
#[async_trait]
pub trait RemoteSource<T>: Send + Sync {
    /// 拉取资源键对应的聚合
    async fn fetch(&self, key: &ResourceKey) -> Result<T>;
}

/// 由闭包实现的远程数据源
pub struct FnSource<F> {
    f: F,
}

impl<F> FnSource<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F, Fut> RemoteSource<T> for FnSource<F>
where
    T: Send + 'static,
    F: Fn(ResourceKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T>> + Send,
{
    async fn fetch(&self, key: &ResourceKey) -> Result<T> {
        (self.f)(key.clone()).await
    }
}

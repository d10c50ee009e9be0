//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步层的错误类型和处理机制。

use thiserror::Error;

/// 同步层错误类型枚举
///
/// 只有 `Fetch` 类错误会暴露给消费者（作为 `last_error`），
/// 存储和订阅错误在各自边界处被记录并吞掉。
#[derive(Error, Debug)]
pub enum SyncError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 本地存储操作失败
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// 远程数据源拉取失败（包括超时）
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// 推送通道订阅失败
    #[error("Subscription failed: {0}")]
    Subscription(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 资源键非法
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    /// 操作不支持
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),
}

/// 同步层操作结果类型别名
pub type Result<T> = std::result::Result<T, SyncError>;

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了JSON序列化器的实现。

use super::Serializer;
use crate::error::{Result, SyncError};
use serde::{de::DeserializeOwned, Serialize};

/// JSON序列化器
///
/// 基于serde_json。存储在本地的缓存条目和Redis通道上的变更事件都使用这种格式，
/// 便于不同运行环境的客户端共享同一份数据。
#[derive(Clone, Debug, Default)]
pub struct JsonSerializer {
    /// 是否输出带缩进的JSON（仅用于调试输出）
    pretty: bool,
}

impl JsonSerializer {
    /// 创建新的JSON序列化器
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// 创建输出带缩进JSON的序列化器
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Serializer for JsonSerializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        bytes.map_err(|e| SyncError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        serde_json::from_slice(data).map_err(|e| SyncError::Serialization(e.to_string()))
    }
}

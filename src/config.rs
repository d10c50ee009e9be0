//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步层的配置结构和解析逻辑。

use crate::error::{Result, SyncError};
use crate::sync::event::RowFilter;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_VERSION: u32 = 1;
pub const CONFIG_VERSION_FIELD: &str = "config_version";

/// TTL 上限：30 天
const MAX_TTL_SECS: u64 = 86400 * 30;
/// 防抖窗口上限：60 秒
const MAX_DEBOUNCE_MS: u64 = 60_000;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub resources: HashMap<String, ResourceConfig>,
}

/// 全局配置
///
/// 资源未显式设置时使用的默认值
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认的缓存有效期（秒）
    pub default_ttl_secs: u64,
    /// 默认的防抖窗口（毫秒）
    pub default_debounce_ms: u64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            default_debounce_ms: 0,
        }
    }
}

/// 本地存储后端类型
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// 进程内内存存储
    #[default]
    Memory,
    /// 设备本地文件存储
    File,
    /// Redis 共享存储
    Redis,
}

/// 本地存储配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct StorageConfig {
    /// 后端类型
    pub backend: StorageBackendType,
    /// 内存后端最大条目数
    pub max_entries: u64,
    /// 文件后端目录
    pub path: Option<PathBuf>,
    /// Redis 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendType::Memory,
            max_entries: 10000,
            path: None,
            connection_string: SecretString::new("redis://127.0.0.1:6379".to_string().into()),
            connection_timeout_ms: 5000,
        }
    }
}

/// 推送通道后端类型
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RealtimeBackendType {
    /// 进程内广播通道
    #[default]
    Local,
    /// Redis Pub/Sub
    Redis,
    /// 不启用推送，所有资源的实时同步都被关闭
    None,
}

/// 推送通道配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RealtimeConfig {
    pub backend: RealtimeBackendType,
    pub connection_string: SecretString,
    pub connection_timeout_ms: u64,
    /// Redis 频道前缀，实际频道为 `{prefix}:{table}`
    pub channel_prefix: String,
    /// 进程内广播通道的缓冲容量
    pub broadcast_capacity: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            backend: RealtimeBackendType::Local,
            connection_string: SecretString::new("redis://127.0.0.1:6379".to_string().into()),
            connection_timeout_ms: 5000,
            channel_prefix: "oxsync:changes".to_string(),
            broadcast_capacity: 1024,
        }
    }
}

/// 单个资源类型的配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ResourceConfig {
    /// 缓存有效期（秒），覆盖全局配置
    pub ttl_secs: Option<u64>,
    /// 是否启用缓存
    pub cache_enabled: bool,
    /// 是否启用实时同步
    pub realtime_enabled: bool,
    /// 防抖窗口（毫秒），覆盖全局配置
    pub debounce_ms: Option<u64>,
    /// 存储槽模板，`{key}` 会被替换为资源键；为空时使用 `{kind}_cache_{key}`
    pub cache_key: Option<String>,
    /// 关心的变更事件
    pub filters: Vec<FilterConfig>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            cache_enabled: true,
            realtime_enabled: true,
            debounce_ms: None,
            cache_key: None,
            filters: Vec::new(),
        }
    }
}

impl ResourceConfig {
    /// 计算生效的缓存有效期
    pub fn effective_ttl(&self, global: &GlobalConfig) -> Duration {
        Duration::from_secs(self.ttl_secs.unwrap_or(global.default_ttl_secs))
    }

    /// 计算生效的防抖窗口
    pub fn effective_debounce(&self, global: &GlobalConfig) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(global.default_debounce_ms))
    }
}

/// 事件过滤配置
///
/// `row_filter` 使用 `column=eq.value` 语法，`value` 中可以包含 `{key}` 占位符
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct FilterConfig {
    pub table: String,
    #[serde(default)]
    pub row_filter: Option<String>,
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| SyncError::ConfigError(e.to_string()))
    }

    /// 从TOML文件加载并验证配置
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::ConfigError(format!("无法读取配置文件 {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        config.validate().map_err(SyncError::ConfigError)?;
        Ok(config)
    }

    /// 获取资源配置
    pub fn resource(&self, kind: &str) -> Option<&ResourceConfig> {
        self.resources.get(kind)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.default_ttl_secs == 0 {
            return Err("Global default_ttl_secs cannot be zero".to_string());
        }
        if self.global.default_ttl_secs > MAX_TTL_SECS {
            return Err("Global default_ttl_secs cannot exceed 30 days".to_string());
        }
        if self.global.default_debounce_ms > MAX_DEBOUNCE_MS {
            return Err("Global default_debounce_ms cannot exceed 60000".to_string());
        }

        if self.storage.backend == StorageBackendType::File && self.storage.path.is_none() {
            return Err("File storage requires storage.path".to_string());
        }
        if self.storage.backend == StorageBackendType::Memory && self.storage.max_entries == 0 {
            return Err("Memory storage max_entries cannot be zero".to_string());
        }

        for (name, resource) in &self.resources {
            if name.is_empty() {
                return Err("Resource name cannot be empty".to_string());
            }
            if name.len() > 64 {
                return Err(format!(
                    "Resource name '{}' exceeds maximum length of 64 characters",
                    name
                ));
            }

            let ttl = resource.ttl_secs.unwrap_or(self.global.default_ttl_secs);
            if ttl == 0 {
                return Err(format!("Resource '{}' TTL cannot be zero", name));
            }
            if ttl > MAX_TTL_SECS {
                return Err(format!("Resource '{}' TTL cannot exceed 30 days", name));
            }

            let debounce = resource
                .debounce_ms
                .unwrap_or(self.global.default_debounce_ms);
            if debounce > MAX_DEBOUNCE_MS {
                return Err(format!(
                    "Resource '{}' debounce_ms cannot exceed {}",
                    name, MAX_DEBOUNCE_MS
                ));
            }

            if let Some(template) = &resource.cache_key {
                if template.trim().is_empty() {
                    return Err(format!("Resource '{}' cache_key cannot be blank", name));
                }
            }

            if resource.realtime_enabled && resource.filters.is_empty() {
                return Err(format!(
                    "Resource '{}' enables realtime but declares no filters",
                    name
                ));
            }

            for filter in &resource.filters {
                if filter.table.trim().is_empty() {
                    return Err(format!("Resource '{}' has a filter without table", name));
                }
                if let Some(expr) = &filter.row_filter {
                    RowFilter::parse(expr).map_err(|e| format!("Resource '{}': {}", name, e))?;
                }
            }
        }

        Ok(())
    }
}

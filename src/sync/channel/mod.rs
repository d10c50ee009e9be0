//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了推送通道接口、订阅描述符以及通道后端的构建逻辑。

pub mod local;
pub mod redis_channel;

use crate::client::ResourceKey;
use crate::config::{RealtimeBackendType, RealtimeConfig};
use crate::error::{Result, SyncError};
use crate::sync::event::{ChangeEvent, EventFilter};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub use local::LocalChannel;
pub use redis_channel::RedisChannel;

/// 事件处理回调
pub type EventHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// 订阅描述符
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionDescriptor {
    /// 由资源类型和键确定性派生的通道ID
    pub channel_id: String,
    /// 关心的事件
    pub event_filters: Vec<EventFilter>,
    /// 防抖窗口（毫秒）
    pub debounce_ms: u64,
}

impl SubscriptionDescriptor {
    pub fn new(
        kind: &str,
        key: &ResourceKey,
        event_filters: Vec<EventFilter>,
        debounce_ms: u64,
    ) -> Self {
        Self {
            channel_id: Self::channel_id_for(kind, key),
            event_filters,
            debounce_ms,
        }
    }

    /// 通道ID：同一类型同一键总是得到同一个ID
    pub fn channel_id_for(kind: &str, key: &ResourceKey) -> String {
        format!("{}_{}", kind, key)
    }

    /// 事件是否与任一过滤器匹配
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.event_filters.iter().any(|f| f.matches(event))
    }

    /// 去重后的表名列表
    pub fn tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = self.event_filters.iter().map(|f| f.table.clone()).collect();
        tables.sort();
        tables.dedup();
        tables
    }
}

/// 订阅句柄
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub channel_id: String,
}

impl SubscriptionHandle {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel_id: channel_id.into(),
        }
    }
}

/// 推送通道
///
/// 投递至少一次且无序。通道可以按表粗粒度投递，行级过滤由订阅管理器在客户端再做一次。
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// 建立订阅
    async fn subscribe(
        &self,
        descriptor: &SubscriptionDescriptor,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle>;

    /// 取消订阅，句柄未知时不报错
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()>;

    /// 发布变更事件（供写入方和命令行使用）
    async fn publish(&self, _event: &ChangeEvent) -> Result<()> {
        Err(SyncError::NotSupported(format!(
            "{} channel does not support publish",
            self.name()
        )))
    }

    /// 通道名称，用于日志
    fn name(&self) -> &'static str;
}

/// 根据配置构建推送通道，`none` 时返回None
#[instrument(skip(config), level = "info", fields(backend = ?config.backend))]
pub async fn build_channel(config: &RealtimeConfig) -> Result<Option<Arc<dyn PushChannel>>> {
    let channel: Arc<dyn PushChannel> = match config.backend {
        RealtimeBackendType::None => {
            info!("Realtime channel disabled");
            return Ok(None);
        }
        RealtimeBackendType::Local => Arc::new(LocalChannel::new(config.broadcast_capacity)),
        RealtimeBackendType::Redis => Arc::new(
            RedisChannel::connect(
                &config.connection_string,
                config.connection_timeout_ms,
                &config.channel_prefix,
            )
            .await?,
        ),
    };
    info!("Realtime channel initialized: {}", channel.name());
    Ok(Some(channel))
}

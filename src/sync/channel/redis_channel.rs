//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis Pub/Sub的推送通道，用于跨进程传播变更事件。

use super::{EventHandler, PushChannel, SubscriptionDescriptor, SubscriptionHandle};
use crate::backend::redis_store;
use crate::error::{Result, SyncError};
use crate::sync::event::ChangeEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::StreamExt;
use redis::aio::ConnectionManager;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Redis推送通道
///
/// 每张表对应一个频道 `{prefix}:{table}`，消息体为JSON编码的 `ChangeEvent`。
/// 每个订阅持有一条独立的Pub/Sub连接。
pub struct RedisChannel {
    /// Redis客户端，用于建立Pub/Sub连接
    client: redis::Client,
    /// 发布用的连接管理器
    publisher: ConnectionManager,
    /// 频道前缀
    prefix: String,
    subscriptions: DashMap<Uuid, CancellationToken>,
}

impl RedisChannel {
    /// 连接Redis并创建推送通道
    #[instrument(skip(connection_string), level = "info", name = "init_redis_channel")]
    pub async fn connect(
        connection_string: &SecretString,
        timeout_ms: u64,
        prefix: &str,
    ) -> Result<Self> {
        let (client, publisher) = redis_store::connect(connection_string, timeout_ms).await?;
        Ok(Self::new(client, publisher, prefix))
    }

    pub fn new(client: redis::Client, publisher: ConnectionManager, prefix: &str) -> Self {
        Self {
            client,
            publisher,
            prefix: prefix.to_string(),
            subscriptions: DashMap::new(),
        }
    }

    /// 表对应的频道名
    pub fn topic(&self, table: &str) -> String {
        format!("{}:{}", self.prefix, table)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Drop for RedisChannel {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().cancel();
        }
    }
}

#[async_trait]
impl PushChannel for RedisChannel {
    #[instrument(skip(self, descriptor, handler), level = "debug", fields(channel = %descriptor.channel_id))]
    async fn subscribe(
        &self,
        descriptor: &SubscriptionDescriptor,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| SyncError::Subscription(e.to_string()))?;
        for table in descriptor.tables() {
            let topic = self.topic(&table);
            pubsub
                .subscribe(&topic)
                .await
                .map_err(|e| SyncError::Subscription(e.to_string()))?;
            debug!("RedisChannel: 已订阅频道 {}", topic);
        }

        let handle = SubscriptionHandle::new(descriptor.channel_id.clone());
        let token = CancellationToken::new();
        let task_token = token.clone();
        let channel_id = descriptor.channel_id.clone();

        tokio::spawn(async move {
            let mut stream = pubsub.into_on_message();
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    msg = stream.next() => {
                        let Some(msg) = msg else {
                            warn!("RedisChannel: 订阅 {} 的连接已断开", channel_id);
                            break;
                        };
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                debug!("RedisChannel: 解析消息失败: {}", e);
                                continue;
                            }
                        };
                        match serde_json::from_str::<ChangeEvent>(&payload) {
                            Ok(event) => handler(event),
                            Err(e) => warn!("RedisChannel: 丢弃无法解码的事件: {}", e),
                        }
                    }
                }
            }
            debug!("RedisChannel: 订阅 {} 已停止", channel_id);
        });

        self.subscriptions.insert(handle.id, token);
        Ok(handle)
    }

    #[instrument(skip(self), level = "debug")]
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        if let Some((_, token)) = self.subscriptions.remove(&handle.id) {
            token.cancel();
        }
        Ok(())
    }

    #[instrument(skip(self, event), level = "debug", fields(table = %event.table))]
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        let payload =
            serde_json::to_string(event).map_err(|e| SyncError::Serialization(e.to_string()))?;
        let mut conn = self.publisher.clone();
        let receivers: i32 = redis::cmd("PUBLISH")
            .arg(self.topic(&event.table))
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        debug!("RedisChannel: 事件已发布，receivers={}", receivers);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

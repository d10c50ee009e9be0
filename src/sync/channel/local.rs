//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的推送通道，基于广播队列。

use super::{EventHandler, PushChannel, SubscriptionDescriptor, SubscriptionHandle};
use crate::error::Result;
use crate::sync::event::ChangeEvent;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// 进程内推送通道
///
/// 同一进程内的写入方调用 `publish`，所有订阅了对应表的订阅者收到事件。
pub struct LocalChannel {
    tx: broadcast::Sender<ChangeEvent>,
    subscriptions: DashMap<Uuid, CancellationToken>,
}

impl LocalChannel {
    /// 创建新的进程内通道
    ///
    /// # 参数
    ///
    /// * `capacity` - 广播缓冲容量，慢订阅者落后超过该值会丢事件
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            subscriptions: DashMap::new(),
        }
    }

    /// 发布事件，返回收到事件的订阅者数量
    pub fn send(&self, event: ChangeEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// 当前存活的订阅数量
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        for entry in self.subscriptions.iter() {
            entry.value().cancel();
        }
    }
}

#[async_trait]
impl PushChannel for LocalChannel {
    #[instrument(skip(self, descriptor, handler), level = "debug", fields(channel = %descriptor.channel_id))]
    async fn subscribe(
        &self,
        descriptor: &SubscriptionDescriptor,
        handler: EventHandler,
    ) -> Result<SubscriptionHandle> {
        let handle = SubscriptionHandle::new(descriptor.channel_id.clone());
        let tables: HashSet<String> = descriptor.tables().into_iter().collect();
        let token = CancellationToken::new();
        let mut rx = self.tx.subscribe();

        let task_token = token.clone();
        let channel_id = descriptor.channel_id.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(event) => {
                            if tables.contains(&event.table) {
                                handler(event);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("LocalChannel: 订阅 {} 落后，丢失 {} 条事件", channel_id, skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!("LocalChannel: 订阅 {} 已停止", channel_id);
        });

        self.subscriptions.insert(handle.id, token);
        debug!("LocalChannel: 订阅已建立 id={}", handle.id);
        Ok(handle)
    }

    #[instrument(skip(self), level = "debug")]
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        if let Some((_, token)) = self.subscriptions.remove(&handle.id) {
            token.cancel();
            debug!("LocalChannel: 订阅已取消 id={}", handle.id);
        }
        Ok(())
    }

    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        let receivers = self.send(event.clone());
        debug!(
            "LocalChannel: 事件已发布 table={}, receivers={}",
            event.table, receivers
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

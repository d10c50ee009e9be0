//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了订阅管理器，负责一个资源键的推送订阅生命周期。

use crate::error::{Result, SyncError};
use crate::metrics::GLOBAL_METRICS;
use crate::sync::channel::{EventHandler, PushChannel, SubscriptionDescriptor, SubscriptionHandle};
use crate::sync::debounce::{spawn_debounced, Debouncer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// 失效回调
pub type InvalidateCallback = Arc<dyn Fn() + Send + Sync>;

struct ActiveSubscription {
    handle: SubscriptionHandle,
    token: CancellationToken,
}

/// 订阅管理器
///
/// 任何时刻最多持有一个订阅。匹配的事件经过后沿防抖后变成一次 `on_invalidate` 调用，
/// 失效从不查询缓存。
pub struct SubscriptionManager {
    resource: String,
    channel: Arc<dyn PushChannel>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl SubscriptionManager {
    pub fn new(resource: impl Into<String>, channel: Arc<dyn PushChannel>) -> Self {
        Self {
            resource: resource.into(),
            channel,
            active: Mutex::new(None),
        }
    }

    /// 打开订阅，先关闭已有的订阅
    #[instrument(skip(self, descriptor, on_invalidate), level = "debug", fields(resource = %self.resource, channel = %descriptor.channel_id))]
    pub async fn open(
        &self,
        descriptor: SubscriptionDescriptor,
        on_invalidate: InvalidateCallback,
    ) -> Result<()> {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            self.release(previous).await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let filter = descriptor.clone();
        let handler: EventHandler = Arc::new(move |event| {
            if filter.matches(&event) {
                let _ = tx.send(());
            }
        });

        let handle = match self.channel.subscribe(&descriptor, handler).await {
            Ok(handle) => handle,
            Err(e) => {
                GLOBAL_METRICS.record_subscription(&self.resource, "failed");
                return Err(SyncError::Subscription(format!(
                    "{} on {}: {}",
                    descriptor.channel_id,
                    self.channel.name(),
                    e
                )));
            }
        };

        let token = CancellationToken::new();
        let resource = self.resource.clone();
        spawn_debounced(
            Debouncer::trailing(Duration::from_millis(descriptor.debounce_ms)),
            rx,
            token.clone(),
            move || {
                GLOBAL_METRICS.record_invalidation(&resource);
                on_invalidate();
            },
        );

        GLOBAL_METRICS.record_subscription(&self.resource, "opened");
        debug!("subscription opened: id={}", handle.id);
        *active = Some(ActiveSubscription { handle, token });
        Ok(())
    }

    /// 关闭订阅，没有订阅时为空操作
    #[instrument(skip(self), level = "debug", fields(resource = %self.resource))]
    pub async fn close(&self) {
        let previous = self.active.lock().await.take();
        if let Some(previous) = previous {
            self.release(previous).await;
        }
    }

    async fn release(&self, subscription: ActiveSubscription) {
        subscription.token.cancel();
        if let Err(e) = self.channel.unsubscribe(&subscription.handle).await {
            warn!(
                "取消订阅失败: channel={}, error={}",
                subscription.handle.channel_id, e
            );
        }
        GLOBAL_METRICS.record_subscription(&self.resource, "closed");
    }

    pub async fn is_open(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// 当前订阅的通道ID
    pub async fn channel_id(&self) -> Option<String> {
        self.active
            .lock()
            .await
            .as_ref()
            .map(|s| s.handle.channel_id.clone())
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        let Some(subscription) = self.active.get_mut().take() else {
            return;
        };
        subscription.token.cancel();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let channel = self.channel.clone();
                runtime.spawn(async move {
                    if let Err(e) = channel.unsubscribe(&subscription.handle).await {
                        warn!("后台取消订阅失败: {}", e);
                    }
                });
            }
            Err(_) => debug!("no runtime available, subscription released without unsubscribe"),
        }
    }
}

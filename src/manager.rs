//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步管理器，负责构建共享设施并管理所有挂载的同步器。

use crate::backend::{build_storage, KeyValueStorage};
use crate::cache::Clock;
use crate::client::synchronizer::Resource;
use crate::client::{RemoteSource, ResourceKey, ResourceSynchronizer, SyncDeps, SyncOptions};
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::sync::channel::{build_channel, PushChannel};
use dashmap::DashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use tracing::{debug, info, instrument};
use uuid::Uuid;

type DetachFn = Box<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Registration {
    kind: String,
    key: ResourceKey,
    detach: DetachFn,
}

type Registry = DashMap<Uuid, Registration>;

/// 已挂载的同步器句柄
///
/// 登记随句柄存在：句柄被丢弃时从管理器注销，最后一个强句柄释放后订阅随之关闭。
pub struct Attached<T> {
    pub id: Uuid,
    pub sync: ResourceSynchronizer<T>,
    registry: Weak<Registry>,
}

impl<T> Drop for Attached<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.remove(&self.id).is_some() {
                debug!(id = %self.id, "attached synchronizer dropped, unregistered");
            }
        }
    }
}

impl<T> std::ops::Deref for Attached<T> {
    type Target = ResourceSynchronizer<T>;

    fn deref(&self) -> &Self::Target {
        &self.sync
    }
}

/// 同步管理器
///
/// 根据配置一次性构建共享存储和推送通道，再按资源名挂载同步器。
pub struct SyncManager {
    config: Config,
    deps: SyncDeps,
    registry: Arc<Registry>,
}

impl SyncManager {
    /// 从配置初始化
    ///
    /// 验证配置，构建存储后端和推送通道
    #[instrument(skip(config), level = "info", fields(resource_count = config.resources.len()))]
    pub async fn from_config(config: Config) -> Result<Self> {
        config.validate().map_err(SyncError::ConfigError)?;

        let storage = build_storage(&config.storage).await?;
        let channel = build_channel(&config.realtime).await?;
        let mut deps = SyncDeps::new(storage);
        if let Some(channel) = channel {
            deps = deps.with_channel(channel);
        }

        info!(
            "SyncManager initialized with {} resources",
            config.resources.len()
        );
        Ok(Self::new(config, deps))
    }

    /// 使用已构建的依赖创建管理器
    pub fn new(config: Config, deps: SyncDeps) -> Self {
        Self {
            config,
            deps,
            registry: Arc::new(DashMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.deps = self.deps.with_clock(clock);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn KeyValueStorage> {
        self.deps.storage.clone()
    }

    pub fn channel(&self) -> Option<Arc<dyn PushChannel>> {
        self.deps.channel.clone()
    }

    /// 资源的同步器选项
    pub fn options(&self, kind: &str) -> Result<SyncOptions> {
        let resource = self
            .config
            .resource(kind)
            .ok_or_else(|| SyncError::ConfigError(format!("unknown resource '{}'", kind)))?;
        Ok(SyncOptions::from_config(kind, resource, &self.config.global))
    }

    /// 挂载一个同步器并登记
    #[instrument(skip(self, source), level = "info")]
    pub async fn attach<T: Resource>(
        &self,
        kind: &str,
        key: &str,
        source: Arc<dyn RemoteSource<T>>,
    ) -> Result<Attached<T>> {
        let options = self.options(kind)?;
        let key = ResourceKey::new(key)?;
        let sync =
            ResourceSynchronizer::attach(key.clone(), options, source, self.deps.clone()).await?;

        let id = Uuid::new_v4();
        let handle = sync.downgrade();
        self.registry.insert(
            id,
            Registration {
                kind: kind.to_string(),
                key,
                detach: Box::new(move || {
                    let handle = handle.upgrade();
                    Box::pin(async move {
                        if let Some(handle) = handle {
                            handle.detach().await;
                        }
                    })
                }),
            },
        );
        Ok(Attached {
            id,
            sync,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// 分离并注销同步器，未知句柄时为空操作
    pub async fn detach<T: Resource>(&self, attached: &Attached<T>) {
        self.registry.remove(&attached.id);
        attached.sync.detach().await;
    }

    /// 所有已挂载的 (资源类型, 资源键)
    pub fn attached(&self) -> Vec<(String, ResourceKey)> {
        let mut list: Vec<(String, ResourceKey)> = self
            .registry
            .iter()
            .map(|entry| (entry.kind.clone(), entry.key.clone()))
            .collect();
        list.sort();
        list
    }

    /// 分离所有同步器
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.registry.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, registration)) = self.registry.remove(&id) {
                (registration.detach)().await;
            }
        }
        info!("SyncManager shut down");
    }
}

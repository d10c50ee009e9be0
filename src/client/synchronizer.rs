//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了资源同步器：组合缓存存储、加载协调器和订阅管理器，
//! 对外暴露当前值、加载标记、错误标记、刷新和清除缓存。

use super::{RemoteSource, ResourceKey};
use crate::backend::KeyValueStorage;
use crate::cache::{CacheStore, Clock, SystemClock};
use crate::config::{FilterConfig, GlobalConfig, ResourceConfig};
use crate::error::{Result, SyncError};
use crate::metrics::GLOBAL_METRICS;
use crate::sync::channel::{PushChannel, SubscriptionDescriptor};
use crate::sync::coordinator::{LoadCoordinator, LoadOutcome};
use crate::sync::debounce::MAX_DEBOUNCE_DELAY;
use crate::sync::event::EventFilter;
use crate::sync::subscription::{InvalidateCallback, SubscriptionManager};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// 可以被同步的资源值
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Resource for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// 同步器选项
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// 资源类型名称，用于存储槽、通道ID和指标
    pub kind: String,
    pub cache_enabled: bool,
    pub realtime_enabled: bool,
    pub ttl: Duration,
    pub debounce: Duration,
    /// 存储槽模板，None 时使用 `{kind}_cache_{key}`
    pub cache_key: Option<String>,
    pub filters: Vec<FilterConfig>,
}

impl SyncOptions {
    pub fn new(kind: impl Into<String>) -> Self {
        let global = GlobalConfig::default();
        Self {
            kind: kind.into(),
            cache_enabled: true,
            realtime_enabled: false,
            ttl: Duration::from_secs(global.default_ttl_secs),
            debounce: Duration::from_millis(global.default_debounce_ms),
            cache_key: None,
            filters: Vec::new(),
        }
    }

    /// 由资源配置和全局默认值构建
    pub fn from_config(kind: &str, config: &ResourceConfig, global: &GlobalConfig) -> Self {
        Self {
            kind: kind.to_string(),
            cache_enabled: config.cache_enabled,
            realtime_enabled: config.realtime_enabled,
            ttl: config.effective_ttl(global),
            debounce: config.effective_debounce(global),
            cache_key: config.cache_key.clone(),
            filters: config.filters.clone(),
        }
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_realtime(mut self, enabled: bool) -> Self {
        self.realtime_enabled = enabled;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// 防抖窗口，超过上限时截断
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce.min(MAX_DEBOUNCE_DELAY);
        self
    }

    pub fn with_cache_key(mut self, template: impl Into<String>) -> Self {
        self.cache_key = Some(template.into());
        self
    }

    /// 追加一个事件过滤器，`row_filter` 使用 `column=eq.value` 语法
    pub fn with_filter(mut self, table: impl Into<String>, row_filter: Option<&str>) -> Self {
        self.filters.push(FilterConfig {
            table: table.into(),
            row_filter: row_filter.map(str::to_string),
        });
        self
    }

    pub fn debounce_ms(&self) -> u64 {
        u64::try_from(self.debounce.as_millis()).unwrap_or(u64::MAX)
    }

    fn event_filters(&self, key: &ResourceKey) -> Result<Vec<EventFilter>> {
        self.filters
            .iter()
            .map(|f| EventFilter::from_config(f, key.as_str()))
            .collect()
    }
}

/// 同步器依赖的共享设施
#[derive(Clone)]
pub struct SyncDeps {
    pub storage: Arc<dyn KeyValueStorage>,
    pub channel: Option<Arc<dyn PushChannel>>,
    pub clock: Arc<dyn Clock>,
}

impl SyncDeps {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            channel: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn PushChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// 消费者可见的状态快照
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub key: ResourceKey,
    /// 最近一次成功加载的值，首次加载成功前为 None
    pub value: Option<T>,
    /// 本实例为当前键发起的拉取正在进行
    pub is_loading: bool,
    /// 最近一次加载失败的原因
    pub last_error: Option<String>,
}

impl<T> ResourceState<T> {
    fn empty(key: ResourceKey) -> Self {
        Self {
            key,
            value: None,
            is_loading: false,
            last_error: None,
        }
    }
}

/// 一次加载的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// 命中缓存，没有网络请求
    CacheHit,
    /// 拉取成功
    Fetched,
    /// 拉取失败，错误记录在 `last_error`
    Failed,
    /// 已有拉取在进行，本次请求被抑制
    Suppressed,
    /// 拉取完成时键已改变，结果被丢弃
    Discarded,
    /// 实例已分离
    Detached,
    /// 键没有变化
    Unchanged,
}

struct Control {
    key: ResourceKey,
    generation: u64,
    coordinator: Arc<LoadCoordinator>,
    detached: bool,
}

struct Inner<T> {
    options: SyncOptions,
    source: Arc<dyn RemoteSource<T>>,
    cache: Option<CacheStore<T>>,
    subscriptions: Option<SubscriptionManager>,
    state: watch::Sender<ResourceState<T>>,
    control: Mutex<Control>,
    /// 串行化订阅的开关，保证同一消费者不会同时有两个订阅
    lifecycle: tokio::sync::Mutex<()>,
}

/// 资源同步器
///
/// 为一个资源键维护本地读模型：先读缓存，未命中时经加载协调器拉取远程数据源并写回缓存；
/// 启用实时同步时订阅推送通道，每一串相关变更在防抖后触发一次绕过缓存的刷新。
///
/// 克隆得到的是同一个实例的句柄。
pub struct ResourceSynchronizer<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ResourceSynchronizer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> ResourceSynchronizer<T> {
    /// 不延长实例生命周期的弱句柄
    pub fn downgrade(&self) -> WeakSynchronizer<T> {
        WeakSynchronizer {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// 同步器的弱句柄
///
/// 所有强句柄被丢弃后实例随之释放，`upgrade` 返回 `None`。
pub struct WeakSynchronizer<T> {
    inner: Weak<Inner<T>>,
}

impl<T> Clone for WeakSynchronizer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> WeakSynchronizer<T> {
    pub fn upgrade(&self) -> Option<ResourceSynchronizer<T>> {
        self.inner
            .upgrade()
            .map(|inner| ResourceSynchronizer { inner })
    }
}

impl<T: Resource> ResourceSynchronizer<T> {
    /// 挂载同步器
    ///
    /// 完成首次加载（按正常缓存规则）后，若启用实时同步则为该键打开订阅。
    /// 启用实时同步却没有可用通道时，实时同步被关闭并记录警告。
    #[instrument(skip(options, source, deps), level = "info", fields(kind = %options.kind, key = %key))]
    pub async fn attach(
        key: ResourceKey,
        mut options: SyncOptions,
        source: Arc<dyn RemoteSource<T>>,
        deps: SyncDeps,
    ) -> Result<Self> {
        let channel = match (options.realtime_enabled, deps.channel) {
            (true, Some(channel)) => {
                if options.filters.is_empty() {
                    return Err(SyncError::ConfigError(format!(
                        "resource '{}' enables realtime but declares no filters",
                        options.kind
                    )));
                }
                options.event_filters(&key)?;
                Some(channel)
            }
            (true, None) => {
                warn!(
                    "resource '{}' enables realtime but no push channel is configured, realtime disabled",
                    options.kind
                );
                options.realtime_enabled = false;
                None
            }
            (false, _) => None,
        };

        let cache = options.cache_enabled.then(|| {
            let store = CacheStore::new(options.kind.clone(), deps.storage.clone(), options.ttl)
                .with_clock(deps.clock.clone());
            match &options.cache_key {
                Some(template) => store.with_key_template(template.clone()),
                None => store,
            }
        });
        let subscriptions =
            channel.map(|channel| SubscriptionManager::new(options.kind.clone(), channel));

        let (state, _) = watch::channel(ResourceState::empty(key.clone()));
        let inner = Arc::new(Inner {
            options,
            source,
            cache,
            subscriptions,
            state,
            control: Mutex::new(Control {
                key,
                generation: 0,
                coordinator: Arc::new(LoadCoordinator::new()),
                detached: false,
            }),
            lifecycle: tokio::sync::Mutex::new(()),
        });

        inner.load(false).await;
        inner.open_subscription(0).await;
        info!("ResourceSynchronizer attached");
        Ok(Self { inner })
    }

    /// 当前资源键
    pub fn key(&self) -> ResourceKey {
        self.inner.control().key.clone()
    }

    pub fn value(&self) -> Option<T> {
        self.inner.state.borrow().value.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state.borrow().last_error.clone()
    }

    /// 一致的状态快照
    pub fn state(&self) -> ResourceState<T> {
        self.inner.state.borrow().clone()
    }

    /// 订阅状态变化
    pub fn watch(&self) -> watch::Receiver<ResourceState<T>> {
        self.inner.state.subscribe()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.inner.options
    }

    pub fn cache_enabled(&self) -> bool {
        self.inner.options.cache_enabled
    }

    /// 实时同步是否生效（没有可用通道时为 false）
    pub fn realtime_enabled(&self) -> bool {
        self.inner.options.realtime_enabled
    }

    pub fn ttl(&self) -> Duration {
        self.inner.options.ttl
    }

    pub fn debounce_ms(&self) -> u64 {
        self.inner.options.debounce_ms()
    }

    /// 加载当前键
    ///
    /// 不强制时先读缓存；未命中或强制时经加载协调器拉取。拉取进行中时请求被抑制。
    pub async fn load(&self, force_refresh: bool) -> LoadStatus {
        self.inner.load(force_refresh).await
    }

    /// 清除缓存并强制拉取
    pub async fn refresh(&self) -> LoadStatus {
        self.inner.refresh().await
    }

    /// 删除当前键的缓存条目，内存中的值保持不变
    pub async fn clear_cache(&self) {
        self.inner.clear_cache().await;
    }

    /// 切换资源键
    ///
    /// 依次：关闭旧订阅，换上新的加载协调器，按正常缓存规则加载新键，为新键打开订阅。
    /// 旧键仍在进行的拉取不会阻塞新键，它的结果也会被丢弃。
    #[instrument(skip(self), level = "debug", fields(kind = %self.inner.options.kind))]
    pub async fn set_key(&self, key: ResourceKey) -> LoadStatus {
        let generation = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let generation = {
                let mut control = self.inner.control();
                if control.detached {
                    return LoadStatus::Detached;
                }
                if control.key == key {
                    return LoadStatus::Unchanged;
                }
                debug!("resource key changed: {} -> {}", control.key, key);
                control.key = key.clone();
                control.generation += 1;
                control.coordinator = Arc::new(LoadCoordinator::new());
                self.inner.state.send_replace(ResourceState::empty(key));
                control.generation
            };
            if let Some(subscriptions) = &self.inner.subscriptions {
                subscriptions.close().await;
            }
            generation
        };

        let status = self.inner.load(false).await;
        self.inner.open_subscription(generation).await;
        status
    }

    /// 分离同步器
    ///
    /// 关闭订阅；之后的加载都是空操作，进行中的拉取结果被丢弃。
    #[instrument(skip(self), level = "debug", fields(kind = %self.inner.options.kind))]
    pub async fn detach(&self) {
        let _lifecycle = self.inner.lifecycle.lock().await;
        {
            let mut control = self.inner.control();
            if control.detached {
                return;
            }
            control.detached = true;
            self.inner.state.send_modify(|s| s.is_loading = false);
        }
        if let Some(subscriptions) = &self.inner.subscriptions {
            subscriptions.close().await;
        }
        info!("ResourceSynchronizer detached");
    }

    pub fn is_detached(&self) -> bool {
        self.inner.control().detached
    }

    /// 当前是否持有推送订阅
    pub async fn is_subscribed(&self) -> bool {
        match &self.inner.subscriptions {
            Some(subscriptions) => subscriptions.is_open().await,
            None => false,
        }
    }
}

impl<T: Resource> Inner<T> {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 当前键、键代和加载协调器；已分离时返回 None
    fn snapshot(&self) -> Option<(ResourceKey, u64, Arc<LoadCoordinator>)> {
        let control = self.control();
        if control.detached {
            return None;
        }
        Some((
            control.key.clone(),
            control.generation,
            control.coordinator.clone(),
        ))
    }

    /// 仅当键代仍是当前键代时修改状态
    fn update_if_current(&self, generation: u64, f: impl FnOnce(&mut ResourceState<T>)) -> bool {
        let control = self.control();
        if control.detached || control.generation != generation {
            return false;
        }
        self.state.send_modify(f);
        true
    }

    async fn load(self: &Arc<Self>, force_refresh: bool) -> LoadStatus {
        let Some((key, generation, coordinator)) = self.snapshot() else {
            return LoadStatus::Detached;
        };

        if !force_refresh {
            if let Some(cache) = &self.cache {
                if let Some(value) = cache.read(&key).await {
                    let applied = self.update_if_current(generation, |s| {
                        s.value = Some(value);
                        s.last_error = None;
                    });
                    return if applied {
                        LoadStatus::CacheHit
                    } else {
                        LoadStatus::Discarded
                    };
                }
            }
        }

        // 拉取放在独立任务里，调用方被丢弃时拉取仍会完成并清除在途标记
        let inner = self.clone();
        let task = tokio::spawn(async move { inner.fetch(key, generation, coordinator).await });
        match task.await {
            Ok(status) => status,
            Err(e) => {
                error!("fetch task for '{}' panicked: {}", self.options.kind, e);
                GLOBAL_METRICS.record_fetch(&self.options.kind, "failure");
                let message = format!("fetch task failed: {}", e);
                self.update_if_current(generation, |s| {
                    s.is_loading = false;
                    s.last_error = Some(message);
                });
                LoadStatus::Failed
            }
        }
    }

    async fn fetch(
        &self,
        key: ResourceKey,
        generation: u64,
        coordinator: Arc<LoadCoordinator>,
    ) -> LoadStatus {
        let kind = &self.options.kind;
        let outcome = coordinator
            .run_exclusive(|| async {
                if !self.update_if_current(generation, |s| {
                    s.is_loading = true;
                    s.last_error = None;
                }) {
                    return LoadStatus::Discarded;
                }

                let started = Instant::now();
                let result = self.source.fetch(&key).await;
                GLOBAL_METRICS.record_duration(kind, "fetch", started.elapsed().as_secs_f64());

                match result {
                    Ok(value) => {
                        if !self.is_current(generation) {
                            debug!("discarding fetch result for stale key {}", key);
                            GLOBAL_METRICS.record_fetch(kind, "discarded");
                            return LoadStatus::Discarded;
                        }
                        if let Some(cache) = &self.cache {
                            cache.write(&key, &value).await;
                        }
                        let applied = self.update_if_current(generation, |s| {
                            s.value = Some(value);
                            s.is_loading = false;
                            s.last_error = None;
                        });
                        if applied {
                            GLOBAL_METRICS.record_fetch(kind, "success");
                            LoadStatus::Fetched
                        } else {
                            GLOBAL_METRICS.record_fetch(kind, "discarded");
                            LoadStatus::Discarded
                        }
                    }
                    Err(e) => {
                        warn!("fetch failed for {}: {}", key, e);
                        let message = e.to_string();
                        let applied = self.update_if_current(generation, |s| {
                            s.is_loading = false;
                            s.last_error = Some(message);
                        });
                        if applied {
                            GLOBAL_METRICS.record_fetch(kind, "failure");
                            LoadStatus::Failed
                        } else {
                            GLOBAL_METRICS.record_fetch(kind, "discarded");
                            LoadStatus::Discarded
                        }
                    }
                }
            })
            .await;

        match outcome {
            LoadOutcome::Completed(status) => status,
            LoadOutcome::Suppressed => {
                GLOBAL_METRICS.record_fetch(kind, "suppressed");
                LoadStatus::Suppressed
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let control = self.control();
        !control.detached && control.generation == generation
    }

    async fn refresh(self: &Arc<Self>) -> LoadStatus {
        self.clear_cache().await;
        self.load(true).await
    }

    async fn clear_cache(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let Some((key, _, _)) = self.snapshot() else {
            return;
        };
        cache.remove(&key).await;
    }

    /// 为给定键代打开订阅；键代已过期或未启用实时同步时什么也不做
    async fn open_subscription(self: &Arc<Self>, generation: u64) {
        let Some(subscriptions) = &self.subscriptions else {
            return;
        };
        let _lifecycle = self.lifecycle.lock().await;
        let key = {
            let control = self.control();
            if control.detached || control.generation != generation {
                return;
            }
            control.key.clone()
        };

        let filters = match self.options.event_filters(&key) {
            Ok(filters) => filters,
            Err(e) => {
                warn!("无法构建事件过滤器: {}", e);
                return;
            }
        };
        let descriptor =
            SubscriptionDescriptor::new(&self.options.kind, &key, filters, self.options.debounce_ms());

        let weak: Weak<Self> = Arc::downgrade(self);
        let on_invalidate: InvalidateCallback = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                tokio::spawn(async move {
                    let status = inner.refresh().await;
                    debug!("push invalidation refresh finished: {:?}", status);
                });
            }
        });

        if let Err(e) = subscriptions.open(descriptor, on_invalidate).await {
            warn!("订阅失败，实时同步不可用: {}", e);
        }
    }
}

//! oxsync - 缓存加实时同步的资源访问层
//!
//! 为远程聚合（例如仪表盘统计、管理员负责的仓库列表）维护本地读模型：
//! 带有效期和身份标记的缓存、单飞加载，以及经过防抖的推送失效。

#![doc(html_root_url = "https://docs.rs/oxsync/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod presets;
pub mod serialization;
pub mod sync;
pub mod telemetry;

// Re-export commonly used items
pub use backend::{FileStorage, KeyValueStorage, MemoryStorage, RedisStorage};
pub use cache::{CacheEntry, CacheStore, Clock, ManualClock, SystemClock};
pub use client::synchronizer::{LoadStatus, Resource};
pub use client::{
    FnSource, RemoteSource, ResourceKey, ResourceState, ResourceSynchronizer, SyncDeps,
    SyncOptions,
};
pub use config::Config;
pub use error::{Result, SyncError};
pub use manager::{Attached, SyncManager};
pub use sync::channel::{LocalChannel, PushChannel, RedisChannel, SubscriptionDescriptor};
pub use sync::{ChangeEvent, ChangeKind, DebounceEdge, Debouncer, EventFilter, RowFilter};

/// oxsync 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步机制：加载协调、变更事件、推送通道、防抖和订阅管理。

pub mod channel;
pub mod coordinator;
pub mod debounce;
pub mod event;
pub mod subscription;

pub use coordinator::{LoadCoordinator, LoadOutcome};
pub use debounce::{spawn_debounced, DebounceEdge, Debouncer};
pub use event::{ChangeEvent, ChangeKind, EventFilter, RowFilter};
pub use subscription::{InvalidateCallback, SubscriptionManager};

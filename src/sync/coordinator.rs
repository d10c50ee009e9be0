//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了加载协调器，保证同一时刻最多只有一个拉取在进行。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// 一次加载请求的结果
#[derive(Debug)]
pub enum LoadOutcome<R> {
    /// 拉取已执行完成
    Completed(R),
    /// 已有拉取在进行，本次请求被抑制，没有任何副作用
    Suppressed,
}

impl<R> LoadOutcome<R> {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, LoadOutcome::Suppressed)
    }

    pub fn completed(self) -> Option<R> {
        match self {
            LoadOutcome::Completed(r) => Some(r),
            LoadOutcome::Suppressed => None,
        }
    }
}

/// 加载协调器
///
/// 每个同步器实例（每个键代）持有一个，互不阻塞。重叠的请求不排队、不重试，
/// 直接被抑制：连续三次手动刷新只会产生一次拉取。
#[derive(Debug, Default)]
pub struct LoadCoordinator {
    in_flight: AtomicBool,
}

/// 离开作用域时清除在途标记，拉取 future 被丢弃时也一样
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl LoadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前是否有拉取在进行
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// 独占执行拉取
    ///
    /// 已有拉取在进行时立即返回 `Suppressed`，不调用 `fetch_fn`。
    pub async fn run_exclusive<F, Fut, R>(&self, fetch_fn: F) -> LoadOutcome<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
    {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("fetch already in flight, request suppressed");
            return LoadOutcome::Suppressed;
        }

        let _guard = InFlightGuard(&self.in_flight);
        LoadOutcome::Completed(fetch_fn().await)
    }
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了防抖合并原语，把一串密集事件合并成一次动作。

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// 防抖窗口上限，更长的延迟按此截断
pub const MAX_DEBOUNCE_DELAY: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// 触发沿
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebounceEdge {
    /// 一串事件的第一个立即触发，随后的安静期内不再触发
    Leading,
    /// 最后一个事件之后安静 `delay` 才触发
    #[default]
    Trailing,
}

/// 防抖状态机
///
/// 纯状态机，时间由调用方传入，便于验证边界行为。
/// 窗口是半开区间：距上一个事件恰好 `delay` 到达的事件属于新的一串。
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    edge: DebounceEdge,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration, edge: DebounceEdge) -> Self {
        Self {
            delay: delay.min(MAX_DEBOUNCE_DELAY),
            edge,
            deadline: None,
        }
    }

    pub fn trailing(delay: Duration) -> Self {
        Self::new(delay, DebounceEdge::Trailing)
    }

    pub fn leading(delay: Duration) -> Self {
        Self::new(delay, DebounceEdge::Leading)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn edge(&self) -> DebounceEdge {
        self.edge
    }

    /// 当前窗口的截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 是否有一次后沿触发在等待
    pub fn is_pending(&self) -> bool {
        self.edge == DebounceEdge::Trailing && self.deadline.is_some()
    }

    /// 处理一个事件，返回是否应当立即触发
    ///
    /// 后沿模式下，事件到达时若上一串的截止时间已过，先为上一串返回一次触发，
    /// 再开始新的一串。
    pub fn on_event(&mut self, now: Instant) -> bool {
        let window_elapsed = self.deadline.is_some_and(|deadline| now >= deadline);
        let fire = match self.edge {
            DebounceEdge::Trailing => window_elapsed,
            DebounceEdge::Leading => self.deadline.is_none() || window_elapsed,
        };
        self.deadline = Some(now + self.delay);
        fire
    }

    /// 推进时间，返回是否应当触发
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                self.edge == DebounceEdge::Trailing
            }
            _ => false,
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// 启动防抖驱动任务
///
/// 从 `rx` 接收事件信号，经 `debouncer` 合并后调用 `action`。
/// `token` 被取消或所有发送端被丢弃时任务退出，尚未触发的后沿动作随之丢弃。
pub fn spawn_debounced<F>(
    mut debouncer: Debouncer,
    mut rx: mpsc::UnboundedReceiver<()>,
    token: CancellationToken,
    mut action: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let deadline = debouncer.deadline();
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                signal = rx.recv() => match signal {
                    Some(()) => {
                        if debouncer.on_event(Instant::now()) {
                            action();
                        }
                    }
                    None => break,
                },
                _ = sleep_until_deadline(deadline) => {
                    if debouncer.poll(Instant::now()) {
                        action();
                    }
                }
            }
        }
        trace!("debounce driver stopped");
    })
}

//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了同步层的指标收集和监控功能。

use dashmap::DashMap;
use lazy_static::lazy_static;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{span, Level};

/// 指标收集器
///
/// 用于收集和存储同步层的各种运行时指标
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    /// 事件计数
    /// key: "resource:category:result"，category 为 cache/fetch/invalidation/subscription
    pub events_total: Arc<DashMap<String, u64>>,
    /// 操作耗时
    /// key: "resource:op" -> (total_duration_secs, count)
    pub operation_duration: Arc<DashMap<String, (f64, u64)>>,
}

lazy_static! {
    /// 全局指标实例
    pub static ref GLOBAL_METRICS: Metrics = Metrics::default();
}

impl Metrics {
    fn record(&self, resource: &str, category: &str, result: &str) {
        let span = span!(Level::TRACE, "sync_event", resource, category, result);
        let _enter = span.enter();
        let key = format!("{}:{}:{}", resource, category, result);
        *self.events_total.entry(key).or_insert(0) += 1;
    }

    /// 记录缓存读写结果（hit/miss/expired/corrupt/identity_mismatch/storage_error/write/write_error）
    pub fn record_cache(&self, resource: &str, result: &str) {
        self.record(resource, "cache", result);
    }

    /// 记录拉取结果（success/failure/suppressed/discarded）
    pub fn record_fetch(&self, resource: &str, result: &str) {
        self.record(resource, "fetch", result);
    }

    /// 记录一次经过防抖后触发的失效
    pub fn record_invalidation(&self, resource: &str) {
        self.record(resource, "invalidation", "fired");
    }

    /// 记录订阅结果（opened/closed/failed）
    pub fn record_subscription(&self, resource: &str, result: &str) {
        self.record(resource, "subscription", result);
    }

    /// 记录操作耗时
    pub fn record_duration(&self, resource: &str, op: &str, duration_secs: f64) {
        let key = format!("{}:{}", resource, op);
        let mut entry = self.operation_duration.entry(key).or_insert((0.0, 0));
        entry.0 += duration_secs;
        entry.1 += 1;
    }

    /// 读取某个计数
    pub fn count(&self, resource: &str, category: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", resource, category, result);
        self.events_total.get(&key).map(|v| *v).unwrap_or(0)
    }

    /// 清空所有指标（仅用于测试）
    #[doc(hidden)]
    pub fn reset(&self) {
        self.events_total.clear();
        self.operation_duration.clear();
    }
}

/// 获取指标字符串
///
/// 将所有指标格式化为 Prometheus 文本格式
pub fn get_metrics_string() -> String {
    render(&GLOBAL_METRICS)
}

fn render(metrics: &Metrics) -> String {
    let mut lines: Vec<String> = Vec::new();
    for entry in metrics.events_total.iter() {
        let parts: Vec<&str> = entry.key().splitn(3, ':').collect();
        if parts.len() == 3 {
            lines.push(format!(
                "oxsync_events_total{{resource=\"{}\", category=\"{}\", result=\"{}\"}} {}",
                parts[0],
                parts[1],
                parts[2],
                entry.value()
            ));
        }
    }
    for entry in metrics.operation_duration.iter() {
        if let Some((resource, op)) = entry.key().split_once(':') {
            let (total, count) = *entry.value();
            lines.push(format!(
                "oxsync_operation_duration_seconds_sum{{resource=\"{}\", operation=\"{}\"}} {}",
                resource, op, total
            ));
            lines.push(format!(
                "oxsync_operation_duration_seconds_count{{resource=\"{}\", operation=\"{}\"}} {}",
                resource, op, count
            ));
        }
    }
    lines.sort();

    let mut output = String::new();
    for line in lines {
        let _ = writeln!(output, "{}", line);
    }
    output
}

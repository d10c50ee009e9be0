//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了内置的资源配置：仪表盘统计和管理员仓库列表。

use crate::config::{Config, FilterConfig, ResourceConfig};

/// 仪表盘统计
pub const DASHBOARD: &str = "dashboard";
/// 管理员负责的仓库列表
pub const MANAGER_WAREHOUSES: &str = "manager_warehouses";

fn filter(table: &str, row_filter: &str) -> FilterConfig {
    FilterConfig {
        table: table.to_string(),
        row_filter: Some(row_filter.to_string()),
    }
}

/// 仪表盘统计：按仓库缓存 5 分钟，计件、考勤和请假记录变化时立即刷新
pub fn dashboard() -> ResourceConfig {
    ResourceConfig {
        ttl_secs: Some(5 * 60),
        cache_enabled: true,
        realtime_enabled: true,
        debounce_ms: Some(0),
        cache_key: Some("dashboard_cache_{key}".to_string()),
        filters: vec![
            filter("piece_work_records", "warehouse_id=eq.{key}"),
            filter("attendance", "warehouse_id=eq.{key}"),
            filter("leave_applications", "warehouse_id=eq.{key}"),
        ],
    }
}

/// 管理员仓库列表：缓存 10 分钟，所有管理员共用一个存储槽
///
/// 默认不开启实时同步；开启后分配变化在 500ms 防抖后刷新。
pub fn manager_warehouses() -> ResourceConfig {
    ResourceConfig {
        ttl_secs: Some(10 * 60),
        cache_enabled: true,
        realtime_enabled: false,
        debounce_ms: Some(500),
        cache_key: Some("manager_warehouses_cache".to_string()),
        filters: vec![filter("manager_warehouses", "manager_id=eq.{key}")],
    }
}

impl Config {
    /// 包含全部内置资源的默认配置
    pub fn with_presets() -> Self {
        let mut config = Config::default();
        config.resources.insert(DASHBOARD.to_string(), dashboard());
        config
            .resources
            .insert(MANAGER_WAREHOUSES.to_string(), manager_warehouses());
        config
    }
}

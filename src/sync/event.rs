//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了推送通道上的变更事件以及事件过滤规则。

use crate::config::FilterConfig;
use crate::error::{Result, SyncError};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

lazy_static! {
    static ref ROW_FILTER_RE: Regex =
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*eq\.(.+?)\s*$").expect("valid regex");
}

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// 推送通道上的一条变更通知
///
/// 投递语义为至少一次且无序，消费方必须容忍重复和乱序。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// 发生变更的表/实体
    pub table: String,
    /// 变更类型
    pub kind: ChangeKind,
    /// 变更后的行
    #[serde(default)]
    pub new_row: Option<Value>,
    /// 变更前的行
    #[serde(default)]
    pub old_row: Option<Value>,
}

impl ChangeEvent {
    pub fn insert(table: impl Into<String>, row: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Insert,
            new_row: Some(row),
            old_row: None,
        }
    }

    pub fn update(table: impl Into<String>, old: Value, new: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Update,
            new_row: Some(new),
            old_row: Some(old),
        }
    }

    pub fn delete(table: impl Into<String>, row: Value) -> Self {
        Self {
            table: table.into(),
            kind: ChangeKind::Delete,
            new_row: None,
            old_row: Some(row),
        }
    }

    /// 用于行过滤的那一行：优先变更后的行，删除事件退回到变更前的行
    fn filter_row(&self) -> Option<&Value> {
        match &self.new_row {
            Some(Value::Object(map)) if !map.is_empty() => self.new_row.as_ref(),
            _ => self.old_row.as_ref(),
        }
    }
}

/// 行过滤条件，语法为 `column=eq.value`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowFilter {
    pub column: String,
    pub value: String,
}

impl RowFilter {
    /// 解析 `column=eq.value` 表达式
    pub fn parse(expr: &str) -> Result<Self> {
        let caps = ROW_FILTER_RE.captures(expr).ok_or_else(|| {
            SyncError::ConfigError(format!(
                "invalid row filter '{}', expected column=eq.value",
                expr
            ))
        })?;
        Ok(Self {
            column: caps[1].to_string(),
            value: caps[2].to_string(),
        })
    }

    /// 将值中的 `{key}` 占位符替换为资源键
    pub fn bind(&self, key: &str) -> Self {
        Self {
            column: self.column.clone(),
            value: self.value.replace("{key}", key),
        }
    }

    /// 判断一行数据是否满足条件
    pub fn matches(&self, row: &Value) -> bool {
        match row.get(&self.column) {
            Some(Value::String(s)) => *s == self.value,
            Some(Value::Number(n)) => n.to_string() == self.value,
            Some(Value::Bool(b)) => b.to_string() == self.value,
            _ => false,
        }
    }
}

impl std::fmt::Display for RowFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

/// 事件过滤器：表名加可选的行条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub table: String,
    pub row_filter: Option<RowFilter>,
}

impl EventFilter {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row_filter: None,
        }
    }

    pub fn with_row_filter(mut self, filter: RowFilter) -> Self {
        self.row_filter = Some(filter);
        self
    }

    /// 根据配置和资源键构建过滤器
    pub fn from_config(config: &FilterConfig, key: &str) -> Result<Self> {
        let row_filter = match &config.row_filter {
            Some(expr) => Some(RowFilter::parse(expr)?.bind(key)),
            None => None,
        };
        Ok(Self {
            table: config.table.clone(),
            row_filter,
        })
    }

    /// 判断事件是否与过滤器匹配
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.row_filter {
            None => true,
            Some(filter) => event.filter_row().is_some_and(|row| filter.matches(row)),
        }
    }
}

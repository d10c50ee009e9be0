//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了变更事件发布命令的实现。

use crate::cli::PublishArgs;
use crate::config::{Config, RealtimeBackendType};
use crate::sync::channel::build_channel;
use crate::sync::event::{ChangeEvent, ChangeKind};
use anyhow::{bail, Context, Result};
use serde_json::Value;

fn parse_row(raw: Option<&str>) -> Result<Option<Value>> {
    raw.map(|s| serde_json::from_str(s).with_context(|| format!("Invalid row JSON: {}", s)))
        .transpose()
}

pub async fn execute(config: &Config, args: &PublishArgs) -> Result<()> {
    let kind = match args.kind.as_str() {
        "insert" => ChangeKind::Insert,
        "delete" => ChangeKind::Delete,
        _ => ChangeKind::Update,
    };
    let event = ChangeEvent {
        table: args.table.clone(),
        kind,
        new_row: parse_row(args.new_row.as_deref())?,
        old_row: parse_row(args.old_row.as_deref())?,
    };

    if config.realtime.backend == RealtimeBackendType::Local {
        println!("⚠️  Local channel only reaches subscribers inside this process.");
    }
    let Some(channel) = build_channel(&config.realtime).await? else {
        bail!("Realtime channel is disabled in config");
    };

    channel.publish(&event).await?;
    println!("✅ Published {:?} on {} via {}", event.kind, event.table, channel.name());

    Ok(())
}

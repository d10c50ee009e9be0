//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了订阅观察命令的实现。

use crate::cli::EntryArgs;
use crate::client::{ResourceKey, SyncOptions};
use crate::config::Config;
use crate::sync::channel::{build_channel, SubscriptionDescriptor};
use crate::sync::event::EventFilter;
use crate::sync::subscription::{InvalidateCallback, SubscriptionManager};
use anyhow::{bail, Context, Result};
use std::sync::Arc;

pub async fn execute(config: &Config, args: &EntryArgs) -> Result<()> {
    let resource = config
        .resource(&args.kind)
        .with_context(|| format!("Resource '{}' not found in config", args.kind))?;
    let options = SyncOptions::from_config(&args.kind, resource, &config.global);
    let key = ResourceKey::new(args.key.as_str())?;

    let Some(channel) = build_channel(&config.realtime).await? else {
        bail!("Realtime channel is disabled in config");
    };
    let filters = options
        .filters
        .iter()
        .map(|f| EventFilter::from_config(f, key.as_str()))
        .collect::<crate::error::Result<Vec<_>>>()?;
    if filters.is_empty() {
        bail!("Resource '{}' declares no filters", args.kind);
    }

    let descriptor = SubscriptionDescriptor::new(&args.kind, &key, filters, options.debounce_ms());
    println!("Watching {} (debounce {}ms)", descriptor.channel_id, descriptor.debounce_ms);
    for table in descriptor.tables() {
        println!("  - {}", table);
    }

    let manager = SubscriptionManager::new(args.kind.clone(), channel);
    let channel_id = descriptor.channel_id.clone();
    let on_invalidate: InvalidateCallback = Arc::new(move || {
        println!(
            "[{}] invalidate {}",
            chrono::Utc::now().format("%H:%M:%S%.3f"),
            channel_id
        );
    });
    manager.open(descriptor, on_invalidate).await?;

    tokio::signal::ctrl_c().await?;
    manager.close().await;
    println!("\nStopped.");

    Ok(())
}

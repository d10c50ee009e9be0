//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存条目查看命令的实现。

use crate::cache::{Clock, SystemClock};
use crate::cli::{open_store, EntryArgs};
use crate::client::ResourceKey;
use crate::config::Config;
use anyhow::Result;

pub async fn execute(config: &Config, args: &EntryArgs) -> Result<()> {
    let store = open_store(config, &args.kind).await?;
    let key = ResourceKey::new(args.key.as_str())?;

    println!("=== Cache Entry ===\n");
    println!("Resource: {}", args.kind);
    println!("Slot:     {}", store.storage_key(&key));

    let Some(entry) = store.peek(&key).await else {
        println!("\nNo entry.");
        return Ok(());
    };

    let now = SystemClock.now_millis();
    let valid = entry.is_valid_for(key.as_str(), store.ttl(), now);
    println!("Identity: {}", entry.identity);
    println!("Age:      {:.1}s", entry.age_millis(now) as f64 / 1000.0);
    println!("TTL:      {}s", store.ttl().as_secs());
    println!("Valid:    {}", if valid { "✅ yes" } else { "❌ no" });
    println!("\n{}", serde_json::to_string_pretty(&entry.value)?);

    Ok(())
}

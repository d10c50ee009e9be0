//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存条目清除命令的实现。

use crate::cli::{open_store, EntryArgs};
use crate::client::ResourceKey;
use crate::config::Config;
use anyhow::Result;

pub async fn execute(config: &Config, args: &EntryArgs) -> Result<()> {
    let store = open_store(config, &args.kind).await?;
    let key = ResourceKey::new(args.key.as_str())?;

    println!("Clearing {} ...", store.storage_key(&key));
    store.remove(&key).await;
    println!("\n✅ Cache entry cleared for {} {}", args.kind, key);

    Ok(())
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::Config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "oxsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "inspect", about = "Show the cache entry of a resource key")]
    Inspect(EntryArgs),

    #[command(name = "clear", about = "Remove the cache entry of a resource key")]
    Clear(EntryArgs),

    #[command(name = "publish", about = "Publish a change event to the push channel")]
    Publish(PublishArgs),

    #[command(name = "watch", about = "Subscribe to a resource key and print invalidations")]
    Watch(EntryArgs),

    #[command(name = "metrics", about = "Print sync metrics")]
    Metrics(MetricsArgs),
}

#[derive(Parser, Debug)]
pub struct EntryArgs {
    #[arg(help = "Resource kind, e.g. dashboard")]
    pub kind: String,

    #[arg(help = "Resource key, e.g. a warehouse id")]
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct PublishArgs {
    #[arg(short, long, help = "Changed table")]
    pub table: String,

    #[arg(short, long, default_value = "update", value_parser = ["insert", "update", "delete"])]
    pub kind: String,

    #[arg(long, help = "New row as JSON")]
    pub new_row: Option<String>,

    #[arg(long, help = "Old row as JSON")]
    pub old_row: Option<String>,
}

#[derive(Parser, Debug)]
pub struct MetricsArgs {
    #[arg(short, long, help = "Only show lines for this resource")]
    pub resource: Option<String>,
}

mod clear;
mod inspect;
mod metrics;
mod publish;
mod watch;

/// 读取配置文件；未指定时使用内置资源配置
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::with_presets()),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Inspect(args) => inspect::execute(&config, args).await,
        Commands::Clear(args) => clear::execute(&config, args).await,
        Commands::Publish(args) => publish::execute(&config, args).await,
        Commands::Watch(args) => watch::execute(&config, args).await,
        Commands::Metrics(args) => metrics::execute(args).await,
    }
}

/// 按资源配置构建一个值类型不透明的缓存句柄
pub(crate) async fn open_store(
    config: &Config,
    kind: &str,
) -> Result<crate::cache::CacheStore<serde_json::Value>> {
    let resource = config
        .resource(kind)
        .with_context(|| format!("Resource '{}' not found in config", kind))?;
    let storage = crate::backend::build_storage(&config.storage).await?;
    let store = crate::cache::CacheStore::new(kind, storage, resource.effective_ttl(&config.global));
    Ok(match &resource.cache_key {
        Some(template) => store.with_key_template(template.clone()),
        None => store,
    })
}

//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了指标查询命令的实现。

use crate::cli::MetricsArgs;
use crate::metrics::get_metrics_string;
use anyhow::Result;

pub async fn execute(args: &MetricsArgs) -> Result<()> {
    let output = get_metrics_string();

    if output.is_empty() {
        println!("No metrics recorded in this process.");
        return Ok(());
    }

    match &args.resource {
        Some(resource) => {
            let label = format!("resource=\"{}\"", resource);
            for line in output.lines().filter(|line| line.contains(&label)) {
                println!("{}", line);
            }
        }
        None => print!("{}", output),
    }

    Ok(())
}

//! Evaluation cache commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use super::build_client;
use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::Config;
use crate::services::{CacheStats, MetricsSnapshot};

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheCommands {
    /// Show cache size and policy
    Stats,
    /// Remove every cached evaluation
    Clear,
}

#[derive(Debug, Serialize)]
pub struct CacheStatsOutput {
    pub persistence_path: Option<String>,
    #[serde(flatten)]
    pub stats: CacheStats,
    pub metrics: MetricsSnapshot,
}

impl CommandOutput for CacheStatsOutput {
    fn to_human(&self) -> String {
        let mut t = table(&["SETTING", "VALUE"]);
        t.add_row(vec!["Entries".to_string(), format!("{} / {}", self.stats.size, self.stats.max_size)]);
        t.add_row(vec!["Flag TTL".to_string(), format!("{}s", self.stats.ttl.as_secs())]);
        t.add_row(vec!["Gate TTL".to_string(), format!("{}s", self.stats.gate_ttl.as_secs())]);
        t.add_row(vec![
            "Persistence".to_string(),
            self.persistence_path
                .clone()
                .filter(|_| self.stats.persistent)
                .unwrap_or_else(|| "disabled".to_string()),
        ]);
        t.add_row(vec![
            "Hit rate".to_string(),
            format!("{:.1}%", self.metrics.cache_hit_rate),
        ]);

        format!("Cache Statistics:\n{t}")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct CacheClearOutput {
    pub success: bool,
    pub removed: usize,
    pub message: String,
}

impl CommandOutput for CacheClearOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: CacheArgs, config: Config, json_mode: bool) -> Result<()> {
    let persistence_path = config
        .cache
        .persistence_path
        .as_ref()
        .map(|p| p.display().to_string());
    let client = build_client(config)?;

    match args.command {
        CacheCommands::Stats => {
            let out = CacheStatsOutput {
                persistence_path,
                stats: client.cache_stats(),
                metrics: client.metrics(),
            };
            client.close().await;
            output(&out, json_mode);
        }

        CacheCommands::Clear => {
            let removed = client.cache_stats().size;
            client.clear_cache();
            client.close().await;

            let out = CacheClearOutput {
                success: true,
                removed,
                message: format!(
                    "Cleared {removed} cached evaluation{}",
                    if removed == 1 { "" } else { "s" }
                ),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

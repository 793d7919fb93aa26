//! Configuration inspection commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{output, table, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration with the API key redacted
    Show,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: Config,
}

impl From<Config> for ConfigOutput {
    fn from(mut config: Config) -> Self {
        config.api_key = config.redacted_api_key();
        Self { config }
    }
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        let c = &self.config;
        let mut t = table(&["SETTING", "VALUE"]);
        let rows = [
            ("api_key", c.api_key.clone()),
            ("base_url", c.base_url.clone()),
            ("environment", c.environment.clone()),
            ("timeout_ms", c.timeout_ms.to_string()),
            ("enable_analytics", c.enable_analytics.to_string()),
            ("retry.max_retries", c.retry.max_retries.to_string()),
            ("retry.initial_backoff_ms", c.retry.initial_backoff_ms.to_string()),
            ("retry.max_backoff_ms", c.retry.max_backoff_ms.to_string()),
            ("retry.jitter", c.retry.jitter.to_string()),
            ("cache.max_size", c.cache.max_size.to_string()),
            ("cache.ttl_secs", c.cache.ttl_secs.to_string()),
            ("cache.gate_ttl_secs", c.cache.gate_ttl().as_secs().to_string()),
            ("cache.eviction_policy", c.cache.eviction_policy.clone()),
            ("cache.enable_persistence", c.cache.enable_persistence.to_string()),
            (
                "cache.persistence_path",
                c.cache
                    .persistence_path
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            ),
            ("cache.sweep_interval_secs", c.cache.sweep_interval_secs.to_string()),
            ("logging.level", c.logging.level.clone()),
            ("logging.format", c.logging.format.clone()),
            ("logging.rotation", c.logging.rotation.clone()),
        ];
        for (name, value) in rows {
            t.add_row(vec![name.to_string(), value]);
        }
        format!("Effective configuration:\n{t}")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn execute(args: ConfigArgs, config: Config, json_mode: bool) -> Result<()> {
    match args.command {
        ConfigCommands::Show => output(&ConfigOutput::from(config), json_mode),
    }
    Ok(())
}

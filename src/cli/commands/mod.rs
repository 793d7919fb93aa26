//! CLI command implementations.

pub mod cache;
pub mod config;
pub mod evaluate;
pub mod track;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::domain::models::{Config, UserContext};
use crate::infrastructure::config::ConfigLoader;
use crate::services::FlagClient;

/// User targeting options shared by the evaluation commands
#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    /// User id to evaluate for
    #[arg(short, long)]
    pub user: String,

    /// Targeting attribute as key=value; values are parsed as JSON when possible
    #[arg(short, long = "attr")]
    pub attr: Vec<String>,
}

impl UserArgs {
    pub fn to_context(&self) -> Result<UserContext> {
        let mut context = UserContext::new(self.user.clone());
        context.attributes = parse_pairs(&self.attr, "attribute")?;
        Ok(context)
    }
}

/// Parse `key=value` arguments; values go through [`parse_value`].
pub fn parse_pairs(pairs: &[String], what: &str) -> Result<HashMap<String, Value>> {
    let mut parsed = HashMap::with_capacity(pairs.len());
    for pair in pairs {
        let Some((name, raw)) = pair.split_once('=') else {
            bail!("Invalid {what} '{pair}', expected key=value");
        };
        if name.is_empty() {
            bail!("Invalid {what} '{pair}', key is empty");
        }
        parsed.insert(name.to_string(), parse_value(raw));
    }
    Ok(parsed)
}

/// Parse a CLI value as JSON, falling back to a plain string.
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Load configuration from `path`, or the project files and environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

pub fn build_client(config: Config) -> Result<FlagClient> {
    FlagClient::new(config).context("Failed to create flag client")
}

//! Analytics event command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use super::{build_client, parse_pairs};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Event};

#[derive(Args, Debug)]
pub struct TrackArgs {
    /// Event name
    pub event: String,

    /// User the event belongs to
    #[arg(short, long)]
    pub user: String,

    /// Event property as key=value; values are parsed as JSON when possible
    #[arg(short, long = "prop")]
    pub prop: Vec<String>,
}

impl TrackArgs {
    pub fn to_event(&self) -> Result<Event> {
        let mut event = Event::new(self.event.clone(), self.user.clone());
        event.properties = parse_pairs(&self.prop, "property")?;
        Ok(event)
    }
}

#[derive(Debug, Serialize)]
pub struct TrackOutput {
    pub event: String,
    pub user_id: String,
    /// False when analytics are disabled in the configuration
    pub sent: bool,
}

impl CommandOutput for TrackOutput {
    fn to_human(&self) -> String {
        if self.sent {
            format!("Tracked '{}' for user {}", self.event, self.user_id)
        } else {
            format!("Analytics disabled, '{}' was not sent", self.event)
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: TrackArgs, config: Config, json_mode: bool) -> Result<()> {
    let event = args.to_event()?;
    let sent = config.enable_analytics;

    let client = build_client(config)?;
    let outcome = client.track(event).await;
    client.close().await;
    outcome.with_context(|| format!("Failed to track event '{}'", args.event))?;

    let out = TrackOutput {
        event: args.event,
        user_id: args.user,
        sent,
    };
    output(&out, json_mode);
    Ok(())
}

//! Flag and gate evaluation commands.

use anyhow::Result;
use clap::Args;
use comfy_table::Cell;
use serde::Serialize;
use std::collections::BTreeMap;

use super::{build_client, parse_value, UserArgs};
use crate::cli::output::{output, table, truncate, CommandOutput};
use crate::domain::models::{Config, EvaluationResult};

#[derive(Args, Debug)]
pub struct FlagArgs {
    /// Flag key
    pub key: String,

    #[command(flatten)]
    pub user: UserArgs,

    /// Default value as JSON (plain strings accepted)
    #[arg(short, long)]
    pub default: Option<String>,
}

#[derive(Args, Debug)]
pub struct FlagsArgs {
    /// Flag keys
    #[arg(required = true)]
    pub keys: Vec<String>,

    #[command(flatten)]
    pub user: UserArgs,

    /// Default value used for every key
    #[arg(short, long)]
    pub default: Option<String>,
}

#[derive(Args, Debug)]
pub struct GateArgs {
    /// Gate key
    pub key: String,

    #[command(flatten)]
    pub user: UserArgs,
}

#[derive(Args, Debug)]
pub struct GatesArgs {
    /// Gate keys
    #[arg(required = true)]
    pub keys: Vec<String>,

    #[command(flatten)]
    pub user: UserArgs,
}

#[derive(Debug, Serialize)]
pub struct EvaluationOutput {
    pub user_id: String,
    pub results: Vec<EvaluationResult>,
}

impl EvaluationOutput {
    fn new(user_id: &str, mut results: Vec<EvaluationResult>) -> Self {
        results.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            user_id: user_id.to_string(),
            results,
        }
    }
}

impl CommandOutput for EvaluationOutput {
    fn to_human(&self) -> String {
        if self.results.is_empty() {
            return "No evaluations.".to_string();
        }

        let mut t = table(&["KEY", "VALUE", "REASON", "CACHED", "ERROR"]);
        for result in &self.results {
            let error = result
                .error
                .as_ref()
                .map(|e| format!("{}: {}", e.kind.code(), truncate(&e.message, 48)))
                .unwrap_or_default();
            t.add_row(vec![
                Cell::new(&result.key),
                Cell::new(truncate(&result.value.to_string(), 40)),
                Cell::new(result.reason),
                Cell::new(if result.cache_hit { "yes" } else { "no" }),
                Cell::new(error),
            ]);
        }

        format!("Evaluations for user {}:\n{t}", self.user_id)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct GateDecisionsOutput {
    pub user_id: String,
    pub gates: BTreeMap<String, bool>,
}

impl CommandOutput for GateDecisionsOutput {
    fn to_human(&self) -> String {
        let mut t = table(&["GATE", "ACCESS"]);
        for (gate, allowed) in &self.gates {
            t.add_row(vec![gate.as_str(), if *allowed { "granted" } else { "denied" }]);
        }
        format!("Gates for user {}:\n{t}", self.user_id)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute_flag(args: FlagArgs, config: Config, json_mode: bool) -> Result<()> {
    let user = args.user.to_context()?;
    let default = args.default.as_deref().map_or(serde_json::Value::Null, parse_value);

    let client = build_client(config)?;
    let result = client.evaluate_flag(&args.key, default, &user).await;
    client.close().await;

    output(&EvaluationOutput::new(&user.user_id, vec![result]), json_mode);
    Ok(())
}

pub async fn execute_flags(args: FlagsArgs, config: Config, json_mode: bool) -> Result<()> {
    let user = args.user.to_context()?;
    let default = args.default.as_deref().map_or(serde_json::Value::Null, parse_value);
    let requests: Vec<_> = args
        .keys
        .into_iter()
        .map(|key| (key, default.clone()))
        .collect();

    let client = build_client(config)?;
    let results = client.evaluate_flags(&requests, &user).await;
    client.close().await;

    output(
        &EvaluationOutput::new(&user.user_id, results.into_values().collect()),
        json_mode,
    );
    Ok(())
}

pub async fn execute_gate(args: GateArgs, config: Config, json_mode: bool) -> Result<()> {
    let user = args.user.to_context()?;

    let client = build_client(config)?;
    let result = client.evaluate_gate(&args.key, &user).await;
    client.close().await;

    output(&EvaluationOutput::new(&user.user_id, vec![result]), json_mode);
    Ok(())
}

pub async fn execute_gates(args: GatesArgs, config: Config, json_mode: bool) -> Result<()> {
    let user = args.user.to_context()?;

    let client = build_client(config)?;
    let gates = client.gates(&args.keys, &user).await;
    client.close().await;

    let out = GateDecisionsOutput {
        user_id: user.user_id,
        gates: gates.into_iter().collect(),
    };
    output(&out, json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::SdkError;
    use serde_json::json;

    #[test]
    fn test_evaluation_output_sorted_and_rendered() {
        let err = SdkError::Timeout {
            message: "timed out".to_string(),
        };
        let out = EvaluationOutput::new(
            "u-1",
            vec![
                EvaluationResult::error_fallback("zeta", json!(false), &err),
                EvaluationResult::not_found("alpha", json!(1)),
            ],
        );
        assert_eq!(out.results[0].key, "alpha");

        let human = out.to_human();
        assert!(human.contains("u-1"));
        assert!(human.contains("not_found"));
        assert!(human.contains("TIMEOUT_ERROR"));

        let json = out.to_json();
        assert_eq!(json["results"][1]["reason"], "error_fallback");
    }

    #[test]
    fn test_gate_output() {
        let out = GateDecisionsOutput {
            user_id: "u-1".to_string(),
            gates: BTreeMap::from([("admin".to_string(), true), ("beta".to_string(), false)]),
        };
        let human = out.to_human();
        assert!(human.contains("granted"));
        assert!(human.contains("denied"));
        assert_eq!(out.to_json()["gates"]["admin"], true);
    }
}

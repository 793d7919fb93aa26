//! Operator CLI over the flag client.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use crate::domain::errors::SdkError;

/// Print `err` for the operator and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    let code = err
        .downcast_ref::<SdkError>()
        .map_or("ERROR", SdkError::code);

    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": {
                "code": code,
                "message": format!("{err:#}"),
            }
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

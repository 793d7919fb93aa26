//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

use flagcache::domain::models::{Config, RetryConfig};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const TEST_API_KEY: &str = "test-api-key";

/// Create a temporary directory for test isolation
///
/// Returns a TempDir that will be cleaned up when dropped.
#[allow(dead_code)]
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Client configuration pointed at `base_url` with fast, jitter-free retries
#[allow(dead_code)]
pub fn test_config(base_url: &str) -> Config {
    Config {
        api_key: TEST_API_KEY.to_string(),
        base_url: base_url.to_string(),
        environment: "test".to_string(),
        timeout_ms: 2_000,
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 200,
            jitter: 0.0,
        },
        ..Default::default()
    }
}

/// Body of a successful single flag evaluation
#[allow(dead_code)]
pub fn flag_body(key: &str, value: Value) -> String {
    json!({
        "flag_key": key,
        "enabled": true,
        "value": value,
        "rule_id": "rule-1",
        "variation": "on"
    })
    .to_string()
}

/// Bind a listener that accepts connections and never answers them
#[allow(dead_code)]
pub async fn silent_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to read local addr");

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    addr
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

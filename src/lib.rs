//! Flagcache - feature flag evaluation cache and resilient transport
//!
//! Flagcache is the client-side core of a feature-flag SDK: it resolves flags
//! and gates for a user through a bounded LRU+TTL cache and falls through to
//! the flag service over an HTTP transport with classified retries. A
//! transport failure never escapes to a typed accessor. Analytics events go
//! out over the same transport.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Models, the error taxonomy, and port traits
//! - **Adapter Layer** (`adapters`): In-memory and durable cache stores
//! - **Service Layer** (`services`): Cache coordination, evaluation, metrics, the client facade
//! - **Infrastructure Layer** (`infrastructure`): HTTP transport, configuration, logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use flagcache::{Config, FlagClient, UserContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), flagcache::SdkError> {
//!     let client = FlagClient::new(Config {
//!         api_key: "my-api-key".to_string(),
//!         ..Default::default()
//!     })?;
//!
//!     let user = UserContext::new("user-42");
//!     if client.bool_flag("new-checkout", false, &user).await {
//!         println!("new checkout enabled");
//!     }
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use adapters::cache::{BoundedCache, DurableCacheStore};
pub use domain::models::{
    CacheConfig, CacheKey, Config, EvaluationReason, EvaluationResult, Event, LoggingConfig,
    Namespace, RetryConfig, UserContext,
};
pub use domain::ports::{CacheStore, FlagApi};
pub use domain::{ErrorKind, SdkError, SdkResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::transport::{HttpFlagApi, ResilientTransport, RetryPolicy};
pub use services::{
    CacheCoordinator, CacheStats, Evaluator, FlagClient, MetricsCollector, MetricsSnapshot,
};

pub mod cache_key;
pub mod config;
pub mod evaluation;
pub mod event;
pub mod remote;
pub mod user_context;

pub use cache_key::{CacheKey, Namespace};
pub use config::{CacheConfig, Config, LoggingConfig, RetryConfig};
pub use evaluation::{EvaluationReason, EvaluationResult, ResultError};
pub use event::Event;
pub use remote::RemoteEvaluation;
pub use user_context::UserContext;

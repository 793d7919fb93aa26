pub mod cache_coordinator;
pub mod client;
pub mod evaluator;
pub mod metrics;

pub use cache_coordinator::{CacheCoordinator, CacheStats};
pub use client::FlagClient;
pub use evaluator::Evaluator;
pub use metrics::{MetricsCollector, MetricsSnapshot};

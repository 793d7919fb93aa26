//! Port trait definitions (Hexagonal Architecture)
//!
//! - `CacheStore`: storage backend for evaluation results
//! - `FlagApi`: remote flag and gate evaluation
//!
//! Services depend on these traits only, so backends and transports can be
//! swapped at construction time.

pub mod cache_store;
pub mod flag_api;

pub use cache_store::CacheStore;
pub use flag_api::FlagApi;

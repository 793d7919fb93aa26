//! Cache store adapters
//!
//! - `BoundedCache`: in-memory LRU with per-entry TTL
//! - `DurableCacheStore`: `BoundedCache` plus atomic snapshot persistence

pub mod bounded;
pub mod durable;

pub use bounded::{BoundedCache, StoredEntry};
pub use durable::{DurableCacheStore, PersistedItem, PersistedSnapshot};

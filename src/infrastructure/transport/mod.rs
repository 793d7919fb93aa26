//! HTTP transport to the flag service
//!
//! - `ResilientTransport`: pooled reqwest client with classified retries
//! - `RetryPolicy`: capped exponential backoff with jitter
//! - `HttpFlagApi`: the `FlagApi` port over the service's JSON endpoints

pub mod client;
pub mod flag_api;
pub mod retry;
pub mod types;

pub use client::{ResilientTransport, USER_AGENT};
pub use flag_api::HttpFlagApi;
pub use retry::RetryPolicy;

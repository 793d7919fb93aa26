//! Domain layer for the flag evaluation cache
//!
//! Core models, the error taxonomy, and the port traits the adapters and
//! infrastructure implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{ErrorKind, SdkError, SdkResult};

//! Infrastructure layer module
//!
//! External integrations behind the domain ports:
//! - HTTP transport and the `FlagApi` implementation
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;
pub mod transport;

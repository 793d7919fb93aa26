//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::cache::CacheArgs;
use crate::cli::commands::config::ConfigArgs;
use crate::cli::commands::evaluate::{FlagArgs, FlagsArgs, GateArgs, GatesArgs};
use crate::cli::commands::track::TrackArgs;

#[derive(Parser, Debug)]
#[command(name = "flagcache")]
#[command(about = "Evaluate feature flags and gates through the local evaluation cache", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to .flagcache/config.yaml)
    #[arg(short, long, global = true, env = "FLAGCACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate a single flag
    Flag(FlagArgs),

    /// Evaluate several flags in one request
    Flags(FlagsArgs),

    /// Evaluate a single gate
    Gate(GateArgs),

    /// Evaluate several gates in one request
    Gates(GatesArgs),

    /// Send an analytics event
    Track(TrackArgs),

    /// Inspect or clear the evaluation cache
    Cache(CacheArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),
}

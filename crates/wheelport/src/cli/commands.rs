//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Units command arguments.
#[derive(Debug, Args)]
pub struct UnitsCommand {
    /// Only show units that can be booked
    #[arg(short, long)]
    pub available: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Provision command arguments.
#[derive(Debug, Args)]
pub struct ProvisionCommand {
    /// Unit identifier (e.g. W-1)
    pub id: String,

    /// Where the unit is parked
    #[arg(short, long)]
    pub location: String,

    /// Distance from the facility entrance (e.g. "120m")
    #[arg(short, long)]
    pub distance: String,

    /// Battery level, 0 to 100
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub battery: u8,

    /// Estimated walking time (e.g. "2 min")
    #[arg(short, long)]
    pub eta: Option<String>,
}

/// Book command arguments.
#[derive(Debug, Args)]
pub struct BookCommand {
    /// The unit to book
    pub id: String,
}

/// History command arguments.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of trips to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

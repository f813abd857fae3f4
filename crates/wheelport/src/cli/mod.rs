//! Command-line interface for wheelport.
//!
//! This module provides the CLI structure and the interactive ride flow for
//! the `wheelport` binary.

mod commands;
pub mod ride;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BookCommand, ConfigCommand, HistoryCommand, ProvisionCommand, StatusCommand, UnitsCommand,
};

/// wheelport - Book a shared wheelchair
///
/// Browse the units at your facility, reserve one, scan its code to start
/// the trip and end it when you are done.
#[derive(Debug, Parser)]
#[command(name = "wheelport")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for info, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List units
    Units(UnitsCommand),

    /// Add a unit or refresh its details
    Provision(ProvisionCommand),

    /// Book a unit and ride it
    Book(BookCommand),

    /// Release holds that were never scanned
    ReleaseExpired,

    /// Show finished trips
    History(HistoryCommand),

    /// Show inventory statistics
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

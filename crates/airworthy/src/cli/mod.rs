//! Command-line interface for airworthy.
//!
//! This module provides the CLI structure for the `airworthy` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AddTaskArgs, AircraftCommand, CompleteArgs, ConfigCommand, FlightsCommand, LogFlightArgs,
    OutputFormat, StatusCommand, TasksCommand,
};

/// airworthy - Track maintenance compliance against the hour meter
///
/// Logs flights to advance airframe total time, shows how many hours each
/// recurring task has left, and records technician sign-offs.
#[derive(Debug, Parser)]
#[command(name = "airworthy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
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
    /// Show the hour meter and fleet health
    Status(StatusCommand),

    /// Manage maintenance tasks and sign-offs
    #[command(subcommand)]
    Tasks(TasksCommand),

    /// Log and list flights
    #[command(subcommand)]
    Flights(FlightsCommand),

    /// Inspect or correct the aircraft hour meter
    #[command(subcommand)]
    Aircraft(AircraftCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
    }
}

//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Subcommand, ValueEnum};
use rust_decimal::Decimal;

use crate::task::TaskId;

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Maintenance task commands.
#[derive(Debug, Subcommand)]
pub enum TasksCommand {
    /// List tasks with their remaining margin
    List {
        /// Only tasks whose number, description or equipment contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Include retired tasks
        #[arg(short, long)]
        all: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one task
    Show {
        /// Task ID
        id: TaskId,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add a recurring task
    Add(AddTaskArgs),

    /// Show a task's sign-off history
    History {
        /// Task ID
        id: TaskId,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Sign a task off at the current hour meter
    Complete(CompleteArgs),

    /// Retire a task (history is kept)
    Retire {
        /// Task ID
        id: TaskId,
    },

    /// Check a task's ledger digest chain
    Verify {
        /// Task ID
        id: TaskId,
    },
}

/// Arguments for adding a task.
#[derive(Debug, Args)]
pub struct AddTaskArgs {
    /// Task number, e.g. 05-20-01
    pub task_number: String,

    /// What the task covers
    #[arg(short, long)]
    pub description: String,

    /// Equipment category, e.g. Airframe or Engine
    #[arg(short, long, default_value = "Airframe")]
    pub equipment: String,

    /// Hour interval
    #[arg(long, value_name = "HOURS")]
    pub hours: Option<Decimal>,

    /// Calendar interval in months
    #[arg(long, value_name = "MONTHS")]
    pub months: Option<u32>,

    /// Hour meter reading the task is next due at (defaults to now + interval)
    #[arg(long, value_name = "HOURS")]
    pub next_due_hours: Option<Decimal>,

    /// Date the task is next due (defaults to today + interval)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub next_due_date: Option<NaiveDate>,
}

/// Arguments for signing off a task.
#[derive(Debug, Args)]
pub struct CompleteArgs {
    /// Task ID
    pub id: TaskId,

    /// Technician signing off
    #[arg(short, long)]
    pub technician: String,

    /// Work order reference
    #[arg(short, long)]
    pub work_order: Option<String>,

    /// Free-form notes
    #[arg(short, long)]
    pub notes: Option<String>,

    /// Fail if the task baseline has moved past this revision
    #[arg(long, value_name = "REVISION")]
    pub expect_revision: Option<u64>,
}

/// Flight log commands.
#[derive(Debug, Subcommand)]
pub enum FlightsCommand {
    /// List logged flights
    List {
        /// Only flights departing from or arriving at this airport
        #[arg(long)]
        icao: Option<String>,

        /// Only flights on or after this date
        #[arg(long, value_name = "YYYY-MM-DD")]
        since: Option<NaiveDate>,

        /// Only flights on or before this date
        #[arg(long, value_name = "YYYY-MM-DD")]
        until: Option<NaiveDate>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Log a flight and advance the hour meter
    Log(LogFlightArgs),
}

/// Arguments for logging a flight.
#[derive(Debug, Args)]
pub struct LogFlightArgs {
    /// Departure airport (ICAO)
    #[arg(long)]
    pub from: String,

    /// Arrival airport (ICAO)
    #[arg(long)]
    pub to: String,

    /// Flight time in hours
    #[arg(long, value_name = "HOURS", allow_negative_numbers = true)]
    pub time: Decimal,

    /// Pilot in command
    #[arg(long)]
    pub pic: String,

    /// Fuel burned, in pounds
    #[arg(long, default_value = "0")]
    pub fuel: u32,

    /// Flight date (defaults to today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,

    /// Defects noted during the flight
    #[arg(long)]
    pub squawks: Option<String>,
}

/// Aircraft commands.
#[derive(Debug, Subcommand)]
pub enum AircraftCommand {
    /// Show the hour meter and cycle count
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Apply an administrative hour meter correction
    Correct {
        /// Unique reference; replaying it is a no-op
        #[arg(short, long)]
        reference: String,

        /// Corrected airframe total time
        #[arg(long, value_name = "HOURS")]
        aftt: Decimal,

        /// Corrected cycle count
        #[arg(long)]
        cycles: Option<u64>,

        /// Why the meter is being corrected
        #[arg(long)]
        reason: String,
    },

    /// List applied corrections
    Corrections {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
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

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Formatted table
    #[default]
    Table,
    /// JSON output
    Json,
}

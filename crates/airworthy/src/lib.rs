//! `airworthy` - Maintenance compliance tracking for a single aircraft
//!
//! Tracks the airframe hour meter (AFTT) from an append-only flight log,
//! classifies recurring maintenance tasks by the hours left until they fall
//! due, and records technician sign-offs in a per-task ledger that advances
//! each task's baseline.
//!
//! The [`ComplianceEngine`] is the entry point; everything else is the data
//! it works with.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod aircraft;
pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod flight;
pub mod ledger;
pub mod logging;
pub mod status;
pub mod storage;
pub mod task;

pub use aircraft::{AircraftState, Correction, CorrectionRecord};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use engine::{ComplianceEngine, Dashboard};
pub use error::{Error, Result};
pub use flight::{FlightFilter, FlightLogEntry, NewFlight};
pub use ledger::{LedgerEntry, SignOffRequest};
pub use logging::init_logging;
pub use status::{DueTrigger, FleetSummary, HealthPolicy, Severity, TaskStatus};
pub use storage::{Storage, StorageStats};
pub use task::{ComplianceTask, Interval, NewTask, TaskId};

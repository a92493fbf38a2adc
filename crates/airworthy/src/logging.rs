//! Diagnostics for the compliance engine.
//!
//! Everything goes to stderr so that table and JSON output on stdout stays
//! pipeable. Only the `airworthy` target is enabled unless `RUST_LOG` says
//! otherwise.
//!
//! What is logged where:
//!
//! | Level   | Events                                                                    |
//! |---------|---------------------------------------------------------------------------|
//! | `error` | nothing; failures surface as [`crate::Error`] values                      |
//! | `warn`  | AFTT/cycle corrections, registration differing from config, orphan ledger rows |
//! | `info`  | database open, schema migrations, aircraft seeding, engine load summary, task added or retired, flight logged, sign-off recorded |
//! | `debug` | database path before open, row inserts, replayed corrections, retiring an already retired task |
//!
//! `-q` keeps only errors, `-v` adds `debug`, `-vv` adds `trace`.

use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// How much the CLI reports on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Mutations and startup (info and above).
    #[default]
    Normal,
    /// Adds row-level and replay detail.
    Verbose,
    /// Everything.
    Trace,
}

impl Verbosity {
    /// Map the `-v` count and `-q` flag to a verbosity. `-q` wins.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directive used when `RUST_LOG` is unset.
    #[must_use]
    pub fn directive(&self) -> String {
        format!("airworthy={}", self.to_level_filter())
    }
}

/// Install the stderr subscriber. `RUST_LOG` takes precedence over
/// `verbosity`. Later calls are no-ops.
///
/// ```no_run
/// use airworthy::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::from_flags(1, false));
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    let subscriber = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    );

    let _ = subscriber.try_init();
}

/// Test subscriber: warnings and errors only, captured per test.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

//! Flight logbook entries.
//!
//! The logbook is append-only: a correction is a new entry plus an
//! administrative meter correction, never an edit in place.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Three or four alphanumeric characters, after upper-casing.
fn icao_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z0-9]{3,4}$").expect("static ICAO pattern is valid"))
}

/// A recorded flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightLogEntry {
    /// Storage-assigned identifier; also the insertion order.
    pub id: i64,
    /// Date flown.
    pub date: NaiveDate,
    /// Departure airport.
    pub departure_icao: String,
    /// Arrival airport.
    pub arrival_icao: String,
    /// Block time in hours.
    pub flight_time: Decimal,
    /// Fuel burned in pounds.
    pub fuel_burn_lbs: u32,
    /// Pilot in command.
    pub pic_name: String,
    /// Defects reported after the flight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squawks: Option<String>,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
}

/// A flight submitted to the logbook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFlight {
    /// Date flown.
    pub date: NaiveDate,
    /// Departure airport.
    pub departure_icao: String,
    /// Arrival airport.
    pub arrival_icao: String,
    /// Block time in hours. Must be positive.
    pub flight_time: Decimal,
    /// Fuel burned in pounds.
    #[serde(default)]
    pub fuel_burn_lbs: u32,
    /// Pilot in command.
    pub pic_name: String,
    /// Defects reported after the flight.
    #[serde(default)]
    pub squawks: Option<String>,
}

impl NewFlight {
    /// Validate and normalize into an entry ready for storage.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a non-positive flight time, a malformed
    /// ICAO code or a blank pilot name.
    pub fn into_entry(self, recorded_at: DateTime<Utc>) -> Result<FlightLogEntry> {
        if self.flight_time <= Decimal::ZERO {
            return Err(Error::validation(
                "flight_time",
                format!("must be greater than zero, got {}", self.flight_time),
            ));
        }
        let departure_icao = normalize_icao("departure_icao", &self.departure_icao)?;
        let arrival_icao = normalize_icao("arrival_icao", &self.arrival_icao)?;
        let pic_name = self.pic_name.trim();
        if pic_name.is_empty() {
            return Err(Error::validation("pic_name", "must not be empty"));
        }

        Ok(FlightLogEntry {
            id: 0,
            date: self.date,
            departure_icao,
            arrival_icao,
            flight_time: self.flight_time,
            fuel_burn_lbs: self.fuel_burn_lbs,
            pic_name: pic_name.to_string(),
            squawks: self
                .squawks
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            recorded_at,
        })
    }
}

fn normalize_icao(field: &'static str, code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if !icao_pattern().is_match(&code) {
        return Err(Error::validation(
            field,
            format!("'{code}' is not a 3-4 character airport code"),
        ));
    }
    Ok(code)
}

/// Read-side filter over the logbook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlightFilter {
    /// Substring matched against either airport, case-insensitively.
    pub icao: Option<String>,
    /// Earliest flight date, inclusive.
    pub since: Option<NaiveDate>,
    /// Latest flight date, inclusive.
    pub until: Option<NaiveDate>,
}

impl FlightFilter {
    /// Whether `entry` passes the filter.
    #[must_use]
    pub fn matches(&self, entry: &FlightLogEntry) -> bool {
        if let Some(icao) = &self.icao {
            let needle = icao.to_uppercase();
            if !entry.departure_icao.contains(&needle) && !entry.arrival_icao.contains(&needle) {
                return false;
            }
        }
        if self.since.is_some_and(|since| entry.date < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.date > until) {
            return false;
        }
        true
    }
}

//! Aircraft hour meter and administrative corrections.
//!
//! [`AircraftState`] is the single time reference every hours-tracked task is
//! compared against. It only moves forward through flight-log appends, or
//! through an audited [`Correction`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current airframe total time and cycle count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AircraftState {
    /// Tail number.
    pub registration: String,
    /// Airframe total time in hours.
    pub current_aftt: Decimal,
    /// Completed flight cycles.
    pub total_cycles: u64,
}

impl AircraftState {
    /// Create a state from seed values.
    #[must_use]
    pub fn new(registration: impl Into<String>, current_aftt: Decimal, total_cycles: u64) -> Self {
        Self {
            registration: registration.into(),
            current_aftt,
            total_cycles,
        }
    }

    /// The state after one more flight of `flight_time` hours.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the flight time is not positive or the
    /// counters would overflow.
    pub fn after_flight(&self, flight_time: Decimal) -> Result<Self> {
        if flight_time <= Decimal::ZERO {
            return Err(Error::validation(
                "flight_time",
                format!("must be greater than zero, got {flight_time}"),
            ));
        }
        let current_aftt = self
            .current_aftt
            .checked_add(flight_time)
            .ok_or_else(|| Error::validation("flight_time", "airframe time overflow"))?;
        let total_cycles = self
            .total_cycles
            .checked_add(1)
            .ok_or_else(|| Error::validation("total_cycles", "cycle counter overflow"))?;
        Ok(Self {
            registration: self.registration.clone(),
            current_aftt,
            total_cycles,
        })
    }
}

/// An administrative override of the hour meter.
///
/// Corrections are keyed by a caller-supplied `reference`; applying the same
/// reference twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correction {
    /// Unique reference (e.g. a records-office ticket).
    pub reference: String,
    /// Corrected airframe total time.
    pub new_aftt: Decimal,
    /// Corrected cycle count. Unchanged when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_cycles: Option<u64>,
    /// Why the meter was corrected.
    pub reason: String,
}

impl Correction {
    /// Check the correction before anything is touched.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank reference or reason, or a
    /// negative airframe time.
    pub fn validate(&self) -> Result<()> {
        if self.reference.trim().is_empty() {
            return Err(Error::validation("reference", "must not be empty"));
        }
        if self.reason.trim().is_empty() {
            return Err(Error::validation("reason", "must not be empty"));
        }
        if self.new_aftt < Decimal::ZERO {
            return Err(Error::validation(
                "new_aftt",
                format!("must not be negative, got {}", self.new_aftt),
            ));
        }
        Ok(())
    }
}

/// Audit row for an applied [`Correction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// Storage-assigned identifier.
    pub id: i64,
    /// The correction's unique reference.
    pub reference: String,
    /// Airframe time before the correction.
    pub previous_aftt: Decimal,
    /// Airframe time after the correction.
    pub new_aftt: Decimal,
    /// Cycle count before the correction.
    pub previous_cycles: u64,
    /// Cycle count after the correction.
    pub new_cycles: u64,
    /// Why the meter was corrected.
    pub reason: String,
    /// When the correction was applied.
    pub recorded_at: DateTime<Utc>,
}

impl CorrectionRecord {
    /// Build the audit row for applying `correction` to `current`.
    #[must_use]
    pub fn new(correction: &Correction, current: &AircraftState, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            reference: correction.reference.trim().to_string(),
            previous_aftt: current.current_aftt,
            new_aftt: correction.new_aftt,
            previous_cycles: current.total_cycles,
            new_cycles: correction.new_cycles.unwrap_or(current.total_cycles),
            reason: correction.reason.trim().to_string(),
            recorded_at,
        }
    }

    /// The aircraft state this record produces.
    #[must_use]
    pub fn apply_to(&self, current: &AircraftState) -> AircraftState {
        AircraftState {
            registration: current.registration.clone(),
            current_aftt: self.new_aftt,
            total_cycles: self.new_cycles,
        }
    }

    /// Whether replaying `correction` would produce this record's values.
    /// Omitted cycles match only a record that left the cycle count alone.
    #[must_use]
    pub fn same_values(&self, correction: &Correction) -> bool {
        self.new_aftt == correction.new_aftt
            && correction
                .new_cycles
                .map_or(self.new_cycles == self.previous_cycles, |cycles| {
                    cycles == self.new_cycles
                })
    }
}

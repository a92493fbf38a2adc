//! Recurring compliance tasks.
//!
//! A task is tracked by hours, by calendar months, or by both. The due
//! baseline (`next_due_hours` / `next_due_date`) is a cursor derived from the
//! last sign-off; the ledger is the source of truth.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Storage-assigned task identifier.
pub type TaskId = i64;

/// The recurrence of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tracking", rename_all = "snake_case")]
pub enum Interval {
    /// Due every `hours` of airframe time.
    Hours {
        /// Interval length in hours.
        hours: Decimal,
    },
    /// Due every `months` calendar months.
    Calendar {
        /// Interval length in months.
        months: u32,
    },
    /// Due at whichever of the two triggers fires first.
    Dual {
        /// Interval length in hours.
        hours: Decimal,
        /// Interval length in months.
        months: u32,
    },
}

impl Interval {
    /// Build an interval from optional hour and month lengths.
    ///
    /// # Errors
    ///
    /// Returns a validation error if neither length is present or either is
    /// not positive.
    pub fn from_parts(hours: Option<Decimal>, months: Option<u32>) -> Result<Self> {
        if let Some(h) = hours {
            if h <= Decimal::ZERO {
                return Err(Error::validation(
                    "interval_hours",
                    format!("must be greater than zero, got {h}"),
                ));
            }
        }
        if months == Some(0) {
            return Err(Error::validation("interval_months", "must be greater than zero"));
        }
        match (hours, months) {
            (Some(hours), Some(months)) => Ok(Self::Dual { hours, months }),
            (Some(hours), None) => Ok(Self::Hours { hours }),
            (None, Some(months)) => Ok(Self::Calendar { months }),
            (None, None) => Err(Error::validation(
                "interval",
                "at least one of interval_hours or interval_months is required",
            )),
        }
    }

    /// Hour length, if hours-tracked.
    #[must_use]
    pub fn hours(&self) -> Option<Decimal> {
        match self {
            Self::Hours { hours } | Self::Dual { hours, .. } => Some(*hours),
            Self::Calendar { .. } => None,
        }
    }

    /// Month length, if calendar-tracked.
    #[must_use]
    pub fn months(&self) -> Option<u32> {
        match self {
            Self::Calendar { months } | Self::Dual { months, .. } => Some(*months),
            Self::Hours { .. } => None,
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hours { hours } => write!(f, "{hours} HRS"),
            Self::Calendar { months } => write!(f, "{months} MOS"),
            Self::Dual { hours, months } => write!(f, "{hours} HRS / {months} MOS"),
        }
    }
}

/// A recurring maintenance requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceTask {
    /// Storage-assigned identifier.
    pub id: TaskId,
    /// Human-readable unique task number (e.g. `05-20-01`).
    pub task_number: String,
    /// What the task requires.
    pub description: String,
    /// System or component the task applies to.
    pub equipment_type: String,
    /// Recurrence.
    pub interval: Interval,
    /// Airframe time at which the task next falls due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due_hours: Option<Decimal>,
    /// Date on which the task next falls due.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due_date: Option<NaiveDate>,
    /// Retired tasks stay on record but no longer count.
    pub active: bool,
    /// Baseline revision, bumped by every sign-off.
    pub revision: u64,
}

impl ComplianceTask {
    /// The task with its baseline advanced by one interval from a completion.
    ///
    /// Only the axes the task is tracked on move; the other is left as seeded.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the advanced values overflow.
    pub fn advanced(&self, completion_hours: Decimal, completion_date: NaiveDate) -> Result<Self> {
        let mut next = self.clone();
        if let Some(hours) = self.interval.hours() {
            next.next_due_hours = Some(
                completion_hours
                    .checked_add(hours)
                    .ok_or_else(|| Error::validation("next_due_hours", "overflow"))?,
            );
        }
        if let Some(months) = self.interval.months() {
            next.next_due_date = Some(add_months(completion_date, months)?);
        }
        next.revision += 1;
        Ok(next)
    }

    /// Case-insensitive substring match over task number, description and
    /// equipment type.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.task_number.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.equipment_type.to_lowercase().contains(&needle)
    }
}

/// A task to be created at fleet setup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    /// Unique task number.
    pub task_number: String,
    /// What the task requires.
    pub description: String,
    /// System or component the task applies to.
    pub equipment_type: String,
    /// Hour interval.
    #[serde(default)]
    pub interval_hours: Option<Decimal>,
    /// Month interval.
    #[serde(default)]
    pub interval_months: Option<u32>,
    /// Seeded hour due point. Defaults to current AFTT plus one interval.
    #[serde(default)]
    pub next_due_hours: Option<Decimal>,
    /// Seeded due date. Defaults to today plus one interval.
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
}

impl NewTask {
    /// Validate and build the task, seeding any missing baseline from the
    /// given reference point.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank text fields, a bad interval, or
    /// a seeded due point on an axis the interval does not track.
    pub fn into_task(self, current_aftt: Decimal, today: NaiveDate) -> Result<ComplianceTask> {
        let task_number = required("task_number", &self.task_number)?;
        let description = required("description", &self.description)?;
        let equipment_type = required("equipment_type", &self.equipment_type)?;
        let interval = Interval::from_parts(self.interval_hours, self.interval_months)?;

        let next_due_hours = match (self.next_due_hours, interval.hours()) {
            (Some(_), None) => {
                return Err(Error::validation(
                    "next_due_hours",
                    "task is not tracked by hours",
                ))
            }
            (Some(seeded), Some(_)) => Some(seeded),
            (None, Some(hours)) => Some(
                current_aftt
                    .checked_add(hours)
                    .ok_or_else(|| Error::validation("next_due_hours", "overflow"))?,
            ),
            (None, None) => None,
        };
        let next_due_date = match (self.next_due_date, interval.months()) {
            (Some(_), None) => {
                return Err(Error::validation(
                    "next_due_date",
                    "task is not tracked by calendar",
                ))
            }
            (Some(seeded), Some(_)) => Some(seeded),
            (None, Some(months)) => Some(add_months(today, months)?),
            (None, None) => None,
        };

        Ok(ComplianceTask {
            id: 0,
            task_number,
            description,
            equipment_type,
            interval,
            next_due_hours,
            next_due_date,
            active: true,
            revision: 0,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Calendar month arithmetic, clamping to the end of shorter months.
fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| Error::validation("next_due_date", "date out of range"))
}

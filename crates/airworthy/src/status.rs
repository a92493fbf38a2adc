//! Due status, remaining margin and fleet health.
//!
//! Everything here is a pure function of stored state and is recomputed on
//! every read. Severity breakpoints are absolute hours shared by every task,
//! regardless of the task's own interval length.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::aircraft::AircraftState;
use crate::task::ComplianceTask;

/// Upper bound (inclusive) of the critical band, in hours.
pub const CRITICAL_HOURS: Decimal = Decimal::from_parts(25, 0, 0, false, 0);

/// Upper bound (inclusive) of the advisory band, in hours.
pub const ADVISORY_HOURS: Decimal = Decimal::from_parts(75, 0, 0, false, 0);

/// Classification of a task's remaining hour margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No hours margin left.
    Overdue,
    /// 25 hours or less remaining.
    Critical,
    /// 75 hours or less remaining.
    Advisory,
    /// More than 75 hours remaining.
    Healthy,
    /// No hour reference to classify against.
    Unknown,
}

impl Severity {
    /// Classify an exact remaining margin.
    #[must_use]
    pub fn classify(remaining: Decimal) -> Self {
        if remaining <= Decimal::ZERO {
            Self::Overdue
        } else if remaining <= CRITICAL_HOURS {
            Self::Critical
        } else if remaining <= ADVISORY_HOURS {
            Self::Advisory
        } else {
            Self::Healthy
        }
    }

    /// Progress-bar fill for this band, in percent.
    #[must_use]
    pub fn fill_percent(self) -> u8 {
        match self {
            Self::Overdue => 100,
            Self::Critical => 85,
            Self::Advisory => 50,
            Self::Healthy => 25,
            Self::Unknown => 0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Overdue => write!(f, "overdue"),
            Self::Critical => write!(f, "critical"),
            Self::Advisory => write!(f, "advisory"),
            Self::Healthy => write!(f, "healthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which due trigger has fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueTrigger {
    /// Hour margin exhausted.
    Hours,
    /// Calendar due date reached.
    Calendar,
    /// Both.
    Both,
}

/// A task together with its computed margins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// The task as stored.
    pub task: ComplianceTask,
    /// `next_due_hours - current_aftt`, exact. `None` for calendar-only tasks.
    pub remaining_hours: Option<Decimal>,
    /// Classification of `remaining_hours`.
    pub severity: Severity,
    /// Progress-bar fill for the severity band.
    pub percent_used: u8,
    /// Days until `next_due_date`; negative once past.
    pub days_remaining: Option<i64>,
    /// Whether the calendar due date has been reached.
    pub calendar_overdue: bool,
}

impl TaskStatus {
    /// Whether the hour margin is exhausted.
    #[must_use]
    pub fn hours_overdue(&self) -> bool {
        self.severity == Severity::Overdue
    }

    /// Which trigger, if any, has fired. Dual-tracked tasks are due at
    /// whichever fires first.
    #[must_use]
    pub fn due_by(&self) -> Option<DueTrigger> {
        match (self.hours_overdue(), self.calendar_overdue) {
            (true, true) => Some(DueTrigger::Both),
            (true, false) => Some(DueTrigger::Hours),
            (false, true) => Some(DueTrigger::Calendar),
            (false, false) => None,
        }
    }

    /// Remaining hours rounded to one decimal place for display.
    #[must_use]
    pub fn remaining_display(&self) -> Option<String> {
        self.remaining_hours.map(format_hours)
    }

    /// Short human-readable margin, e.g. `7.5 HRS LEFT` or `calendar tracked`.
    #[must_use]
    pub fn margin_label(&self) -> String {
        match (self.remaining_display(), self.days_remaining) {
            (Some(hours), _) => format!("{hours} HRS LEFT"),
            (None, Some(days)) => format!("calendar tracked, {days} days left"),
            (None, None) => "calendar tracked".to_string(),
        }
    }
}

/// Compute a task's margins against the aircraft and today's date.
#[must_use]
pub fn compute_status(task: &ComplianceTask, aircraft: &AircraftState, today: NaiveDate) -> TaskStatus {
    let remaining_hours = task.next_due_hours.map(|due| due - aircraft.current_aftt);
    let severity = remaining_hours.map_or(Severity::Unknown, Severity::classify);
    let days_remaining = task
        .next_due_date
        .map(|due| due.signed_duration_since(today).num_days());

    TaskStatus {
        task: task.clone(),
        remaining_hours,
        severity,
        percent_used: severity.fill_percent(),
        days_remaining,
        calendar_overdue: days_remaining.is_some_and(|days| days <= 0),
    }
}

/// How overdue tasks are counted for fleet health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPolicy {
    /// Also count tasks whose calendar due date has passed.
    pub count_calendar_overdue: bool,
}

impl HealthPolicy {
    /// Whether a status counts as overdue under this policy.
    #[must_use]
    pub fn is_overdue(&self, status: &TaskStatus) -> bool {
        status.hours_overdue() || (self.count_calendar_overdue && status.calendar_overdue)
    }
}

/// Aggregate counts behind the health score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSummary {
    /// Tasks considered.
    pub total_tasks: usize,
    /// Tasks counted as overdue.
    pub overdue: usize,
    /// Tasks in the critical band.
    pub critical: usize,
    /// Tasks in the advisory band.
    pub advisory: usize,
    /// Percent of tasks not overdue.
    pub health_percent: u8,
}

/// Summarize a set of statuses.
#[must_use]
pub fn summarize(statuses: &[TaskStatus], policy: HealthPolicy) -> FleetSummary {
    let total_tasks = statuses.len();
    let overdue = statuses.iter().filter(|s| policy.is_overdue(s)).count();
    let critical = statuses
        .iter()
        .filter(|s| s.severity == Severity::Critical)
        .count();
    let advisory = statuses
        .iter()
        .filter(|s| s.severity == Severity::Advisory)
        .count();

    FleetSummary {
        total_tasks,
        overdue,
        critical,
        advisory,
        health_percent: health_percent(total_tasks, overdue),
    }
}

/// Percent of tasks that are not overdue, as an integer 0-100.
#[must_use]
pub fn fleet_health(
    tasks: &[ComplianceTask],
    aircraft: &AircraftState,
    today: NaiveDate,
    policy: HealthPolicy,
) -> u8 {
    let statuses: Vec<TaskStatus> = tasks
        .iter()
        .map(|task| compute_status(task, aircraft, today))
        .collect();
    summarize(&statuses, policy).health_percent
}

/// Hours to one decimal place, midpoints rounded away from zero.
#[must_use]
pub fn format_hours(hours: Decimal) -> String {
    format!(
        "{:.1}",
        hours.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
    )
}

/// `round(100 * (total - overdue) / total)`, half rounding up; 100 when empty.
fn health_percent(total: usize, overdue: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let compliant = total.saturating_sub(overdue);
    let rounded = (200 * compliant + total) / (2 * total);
    u8::try_from(rounded).unwrap_or(100)
}

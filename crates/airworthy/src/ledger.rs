//! Sign-off ledger entries.
//!
//! Entries are immutable. Each carries a BLAKE3 digest over its own fields
//! and the digest of the previous entry recorded for the same task, so a
//! task's history forms a tamper-evident chain in insertion order.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::task::TaskId;

/// A completed sign-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Storage-assigned identifier; also the insertion order.
    pub id: i64,
    /// Task that was signed off.
    pub task_id: TaskId,
    /// Date the work was completed.
    pub completion_date: NaiveDate,
    /// Airframe time at sign-off.
    pub completion_hours: Decimal,
    /// Who signed the task off.
    pub technician_name: String,
    /// Work order, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_order_ref: Option<String>,
    /// Free-text notes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// When the entry was written.
    pub recorded_at: DateTime<Utc>,
    /// Chained BLAKE3 digest (hex).
    pub digest: String,
}

impl LedgerEntry {
    /// Build an entry chained onto `previous_digest`.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        request: &SignOffRequest,
        completion_date: NaiveDate,
        completion_hours: Decimal,
        recorded_at: DateTime<Utc>,
        previous_digest: Option<&str>,
    ) -> Self {
        let mut entry = Self {
            id: 0,
            task_id,
            completion_date,
            completion_hours,
            technician_name: request.technician_name.trim().to_string(),
            work_order_ref: non_blank(request.work_order_ref.as_deref()),
            notes: non_blank(request.notes.as_deref()),
            recorded_at,
            digest: String::new(),
        };
        entry.digest = entry.compute_digest(previous_digest);
        entry
    }

    /// Compute this entry's digest given the previous one in the chain.
    #[must_use]
    pub fn compute_digest(&self, previous_digest: Option<&str>) -> String {
        let task_id = self.task_id.to_string();
        let completion_date = self.completion_date.to_string();
        let completion_hours = self.completion_hours.normalize().to_string();
        let recorded_at = self.recorded_at.to_rfc3339();
        let fields: [&str; 8] = [
            previous_digest.unwrap_or_default(),
            &task_id,
            &completion_date,
            &completion_hours,
            &self.technician_name,
            self.work_order_ref.as_deref().unwrap_or_default(),
            self.notes.as_deref().unwrap_or_default(),
            &recorded_at,
        ];

        let mut hasher = blake3::Hasher::new();
        for field in fields {
            hasher.update(field.as_bytes());
            // Field separator so adjacent fields cannot run together.
            hasher.update(&[0x1f]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

/// A technician's request to sign a task off.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignOffRequest {
    /// Who is signing the task off. Required.
    pub technician_name: String,
    /// Work order reference.
    #[serde(default)]
    pub work_order_ref: Option<String>,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Baseline revision the caller last saw. A mismatch is a conflict.
    #[serde(default)]
    pub expected_revision: Option<u64>,
}

impl SignOffRequest {
    /// Create a request with just a technician name.
    #[must_use]
    pub fn new(technician_name: impl Into<String>) -> Self {
        Self {
            technician_name: technician_name.into(),
            ..Self::default()
        }
    }

    /// Check the request, returning the completion date to record.
    ///
    /// Work is always signed off as of the server's `today`. A sign-off dated
    /// before the task's latest completion would move its baseline
    /// backwards, so that is rejected.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank technician name, or when
    /// `today` is earlier than `last_completion`.
    pub fn validate(&self, today: NaiveDate, last_completion: Option<NaiveDate>) -> Result<NaiveDate> {
        if self.technician_name.trim().is_empty() {
            return Err(Error::validation("technician_name", "must not be empty"));
        }
        if let Some(last) = last_completion {
            if today < last {
                return Err(Error::validation(
                    "completion_date",
                    format!("{today} is before the last recorded completion on {last}"),
                ));
            }
        }
        Ok(today)
    }
}

/// Chronological order: completion date, then insertion order.
pub fn sort_chronological(entries: &mut [LedgerEntry]) {
    entries.sort_by(|a, b| {
        a.completion_date
            .cmp(&b.completion_date)
            .then(a.id.cmp(&b.id))
    });
}

/// Check that every digest in a task's history matches its chain.
#[must_use]
pub fn verify_chain(entries: &[LedgerEntry]) -> bool {
    let mut by_insertion: Vec<&LedgerEntry> = entries.iter().collect();
    by_insertion.sort_by_key(|e| e.id);

    let mut previous: Option<&str> = None;
    for entry in by_insertion {
        if entry.compute_digest(previous) != entry.digest {
            return false;
        }
        previous = Some(&entry.digest);
    }
    true
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

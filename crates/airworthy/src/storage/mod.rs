//! Storage layer for airworthy.
//!
//! `SQLite` persistence for the four durable collections (aircraft, tasks,
//! ledger entries, flight log entries) plus the correction audit trail.
//! Every mutation that touches more than one row runs in a single
//! transaction; if it fails, nothing is written.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::aircraft::{AircraftState, CorrectionRecord};
use crate::error::{Error, Result};
use crate::flight::FlightLogEntry;
use crate::ledger::LedgerEntry;
use crate::task::{ComplianceTask, Interval, TaskId};

/// Storage engine for compliance records.
///
/// The connection is not shared between threads; callers wrap a `Storage`
/// in a mutex when they need to.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    // === Aircraft ===

    /// Load the aircraft singleton, if it has been seeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_aircraft(&self) -> Result<Option<AircraftState>> {
        let state = self
            .conn
            .query_row(
                "SELECT registration, current_aftt, total_cycles FROM aircraft WHERE id = 1",
                [],
                |row| {
                    Ok(AircraftState {
                        registration: row.get(0)?,
                        current_aftt: decimal_column(row, 1)?,
                        total_cycles: count_column(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Seed the aircraft singleton. Does nothing if it already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn seed_aircraft(&self, state: &AircraftState) -> Result<()> {
        let inserted = self.conn.execute(
            r"
            INSERT OR IGNORE INTO aircraft (id, registration, current_aftt, total_cycles)
            VALUES (1, ?1, ?2, ?3)
            ",
            params![
                state.registration,
                state.current_aftt.to_string(),
                to_sql_count(state.total_cycles),
            ],
        )?;
        if inserted > 0 {
            info!(
                "Seeded aircraft {} at {} hours",
                state.registration, state.current_aftt
            );
        }
        Ok(())
    }

    // === Tasks ===

    /// Insert a task, returning its assigned ID. The task's own `id` is ignored.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the task number is already taken, or an
    /// error if the database operation fails.
    pub fn insert_task(&self, task: &ComplianceTask) -> Result<TaskId> {
        let result = self.conn.execute(
            r"
            INSERT INTO tasks (
                task_number, description, equipment_type, interval_hours, interval_months,
                next_due_hours, next_due_date, active, revision
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                task.task_number,
                task.description,
                task.equipment_type,
                task.interval.hours().map(|h| h.to_string()),
                task.interval.months(),
                task.next_due_hours.map(|h| h.to_string()),
                task.next_due_date.map(|d| d.to_string()),
                task.active,
                to_sql_count(task.revision),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(Error::validation(
                    "task_number",
                    format!("task {} already exists", task.task_number),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        let id = self.conn.last_insert_rowid();
        debug!("Inserted task {} with id {}", task.task_number, id);
        Ok(id)
    }

    /// Load every task, retired ones included, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_tasks(&self) -> Result<Vec<ComplianceTask>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, task_number, description, equipment_type, interval_hours,
                   interval_months, next_due_hours, next_due_date, active, revision
            FROM tasks ORDER BY id
            ",
        )?;

        let tasks = stmt
            .query_map([], Self::row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(tasks)
    }

    /// Set a task's active flag.
    ///
    /// Returns `true` if the task exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn set_task_active(&self, id: TaskId, active: bool) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE tasks SET active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(affected > 0)
    }

    // === Ledger ===

    /// Record a sign-off: append the ledger entry and move the task to its
    /// advanced baseline, atomically.
    ///
    /// The update only applies if the stored revision still equals
    /// `expected_revision`; otherwise the transaction is rolled back and a
    /// conflict is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] if the baseline moved underneath us, or an
    /// error if the database operation fails.
    pub fn record_sign_off(
        &mut self,
        entry: &LedgerEntry,
        advanced: &ComplianceTask,
        expected_revision: u64,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;

        tx.execute(
            r"
            INSERT INTO ledger_entries (
                task_id, completion_date, completion_hours, technician_name,
                work_order_ref, notes, recorded_at, digest
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                entry.task_id,
                entry.completion_date.to_string(),
                entry.completion_hours.to_string(),
                entry.technician_name,
                entry.work_order_ref,
                entry.notes,
                entry.recorded_at.to_rfc3339(),
                entry.digest,
            ],
        )?;
        let entry_id = tx.last_insert_rowid();

        let updated = tx.execute(
            r"
            UPDATE tasks SET next_due_hours = ?1, next_due_date = ?2, revision = ?3
            WHERE id = ?4 AND revision = ?5
            ",
            params![
                advanced.next_due_hours.map(|h| h.to_string()),
                advanced.next_due_date.map(|d| d.to_string()),
                to_sql_count(advanced.revision),
                advanced.id,
                to_sql_count(expected_revision),
            ],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls back the ledger insert.
            return Err(Error::conflict(format!(
                "task {} baseline is no longer at revision {expected_revision}",
                advanced.id
            )));
        }

        tx.commit()?;
        debug!("Recorded ledger entry {} for task {}", entry_id, entry.task_id);
        Ok(entry_id)
    }

    /// Load every ledger entry in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_ledger(&self) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, task_id, completion_date, completion_hours, technician_name,
                   work_order_ref, notes, recorded_at, digest
            FROM ledger_entries ORDER BY id
            ",
        )?;

        let entries = stmt
            .query_map([], Self::row_to_ledger_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    // === Flights ===

    /// Append a flight and store the advanced aircraft state, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_flight(&mut self, flight: &FlightLogEntry, aircraft: &AircraftState) -> Result<i64> {
        let tx = self.conn.transaction()?;

        tx.execute(
            r"
            INSERT INTO flight_logs (
                date, departure_icao, arrival_icao, flight_time, fuel_burn_lbs,
                pic_name, squawks, recorded_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                flight.date.to_string(),
                flight.departure_icao,
                flight.arrival_icao,
                flight.flight_time.to_string(),
                flight.fuel_burn_lbs,
                flight.pic_name,
                flight.squawks,
                flight.recorded_at.to_rfc3339(),
            ],
        )?;
        let flight_id = tx.last_insert_rowid();

        Self::write_aircraft(&tx, aircraft)?;

        tx.commit()?;
        debug!("Recorded flight {}", flight_id);
        Ok(flight_id)
    }

    /// Load every flight in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_flights(&self) -> Result<Vec<FlightLogEntry>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, date, departure_icao, arrival_icao, flight_time, fuel_burn_lbs,
                   pic_name, squawks, recorded_at
            FROM flight_logs ORDER BY id
            ",
        )?;

        let flights = stmt
            .query_map([], Self::row_to_flight)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(flights)
    }

    // === Corrections ===

    /// Look up an applied correction by its reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn find_correction(&self, reference: &str) -> Result<Option<CorrectionRecord>> {
        let record = self
            .conn
            .query_row(
                r"
                SELECT id, reference, previous_aftt, new_aftt, previous_cycles, new_cycles,
                       reason, recorded_at
                FROM aircraft_corrections WHERE reference = ?1
                ",
                [reference],
                Self::row_to_correction,
            )
            .optional()?;
        Ok(record)
    }

    /// Store a correction and the corrected aircraft state, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn record_correction(
        &mut self,
        record: &CorrectionRecord,
        aircraft: &AircraftState,
    ) -> Result<i64> {
        let tx = self.conn.transaction()?;

        tx.execute(
            r"
            INSERT INTO aircraft_corrections (
                reference, previous_aftt, new_aftt, previous_cycles, new_cycles,
                reason, recorded_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                record.reference,
                record.previous_aftt.to_string(),
                record.new_aftt.to_string(),
                to_sql_count(record.previous_cycles),
                to_sql_count(record.new_cycles),
                record.reason,
                record.recorded_at.to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();

        Self::write_aircraft(&tx, aircraft)?;

        tx.commit()?;
        Ok(id)
    }

    /// Load every correction in the order applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_corrections(&self) -> Result<Vec<CorrectionRecord>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT id, reference, previous_aftt, new_aftt, previous_cycles, new_cycles,
                   reason, recorded_at
            FROM aircraft_corrections ORDER BY id
            ",
        )?;

        let records = stmt
            .query_map([], Self::row_to_correction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    // === Statistics ===

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let count = |table: &str| -> Result<i64> {
            let n: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n)
        };

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            tasks: count("tasks")?,
            ledger_entries: count("ledger_entries")?,
            flights: count("flight_logs")?,
            corrections: count("aircraft_corrections")?,
            db_size_bytes,
        })
    }

    // === Row mapping ===

    fn write_aircraft(conn: &Connection, aircraft: &AircraftState) -> Result<()> {
        conn.execute(
            r"
            UPDATE aircraft SET current_aftt = ?1, total_cycles = ?2, updated_at = datetime('now')
            WHERE id = 1
            ",
            params![
                aircraft.current_aftt.to_string(),
                to_sql_count(aircraft.total_cycles),
            ],
        )?;
        Ok(())
    }

    fn row_to_task(row: &Row) -> rusqlite::Result<ComplianceTask> {
        let interval_hours = optional_decimal_column(row, 4)?;
        let interval_months: Option<u32> = row.get(5)?;
        let interval = Interval::from_parts(interval_hours, interval_months)
            .map_err(|e| conversion_error(5, e.to_string()))?;

        Ok(ComplianceTask {
            id: row.get(0)?,
            task_number: row.get(1)?,
            description: row.get(2)?,
            equipment_type: row.get(3)?,
            interval,
            next_due_hours: optional_decimal_column(row, 6)?,
            next_due_date: optional_date_column(row, 7)?,
            active: row.get(8)?,
            revision: count_column(row, 9)?,
        })
    }

    fn row_to_ledger_entry(row: &Row) -> rusqlite::Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: row.get(0)?,
            task_id: row.get(1)?,
            completion_date: date_column(row, 2)?,
            completion_hours: decimal_column(row, 3)?,
            technician_name: row.get(4)?,
            work_order_ref: row.get(5)?,
            notes: row.get(6)?,
            recorded_at: timestamp_column(row, 7)?,
            digest: row.get(8)?,
        })
    }

    fn row_to_flight(row: &Row) -> rusqlite::Result<FlightLogEntry> {
        Ok(FlightLogEntry {
            id: row.get(0)?,
            date: date_column(row, 1)?,
            departure_icao: row.get(2)?,
            arrival_icao: row.get(3)?,
            flight_time: decimal_column(row, 4)?,
            fuel_burn_lbs: row.get(5)?,
            pic_name: row.get(6)?,
            squawks: row.get(7)?,
            recorded_at: timestamp_column(row, 8)?,
        })
    }

    fn row_to_correction(row: &Row) -> rusqlite::Result<CorrectionRecord> {
        Ok(CorrectionRecord {
            id: row.get(0)?,
            reference: row.get(1)?,
            previous_aftt: decimal_column(row, 2)?,
            new_aftt: decimal_column(row, 3)?,
            previous_cycles: count_column(row, 4)?,
            new_cycles: count_column(row, 5)?,
            reason: row.get(6)?,
            recorded_at: timestamp_column(row, 7)?,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Tasks stored, retired included.
    pub tasks: i64,
    /// Ledger entries stored.
    pub ledger_entries: i64,
    /// Flights stored.
    pub flights: i64,
    /// Corrections applied.
    pub corrections: i64,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn corrupt(idx: usize, column: &'static str, value: String) -> rusqlite::Error {
    conversion_error(idx, format!("corrupt {column} value: {value}"))
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn count_column(row: &Row, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|_| corrupt(idx, "count", raw.to_string()))
}

fn decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|_| corrupt(idx, "hours", raw))
}

fn optional_decimal_column(row: &Row, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| Decimal::from_str(&s).map_err(|_| corrupt(idx, "hours", s)))
        .transpose()
}

fn date_column(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::from_str(&raw).map_err(|_| corrupt(idx, "date", raw))
}

fn optional_date_column(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::from_str(&s).map_err(|_| corrupt(idx, "date", s)))
        .transpose()
}

fn timestamp_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt(idx, "timestamp", raw))
}

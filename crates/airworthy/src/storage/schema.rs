//! `SQLite` schema definitions for airworthy.
//!
//! Hours are stored as decimal TEXT so that no precision is lost to floating
//! point. Dates are ISO-8601 TEXT.

/// The aircraft singleton.
pub const CREATE_AIRCRAFT_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS aircraft (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    registration TEXT NOT NULL,
    current_aftt TEXT NOT NULL,
    total_cycles INTEGER NOT NULL CHECK (total_cycles >= 0),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// Recurring compliance tasks.
pub const CREATE_TASKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_number TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL,
    equipment_type TEXT NOT NULL,
    interval_hours TEXT,
    interval_months INTEGER,
    next_due_hours TEXT,
    next_due_date TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK (interval_hours IS NOT NULL OR interval_months IS NOT NULL)
)
";

/// Sign-off history.
pub const CREATE_LEDGER_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id),
    completion_date TEXT NOT NULL,
    completion_hours TEXT NOT NULL,
    technician_name TEXT NOT NULL,
    work_order_ref TEXT,
    notes TEXT,
    recorded_at TEXT NOT NULL,
    digest TEXT NOT NULL
)
";

/// Index for per-task chronological history.
pub const CREATE_LEDGER_TASK_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_ledger_task ON ledger_entries(task_id, completion_date)
";

/// Flight logbook.
pub const CREATE_FLIGHTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS flight_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    departure_icao TEXT NOT NULL,
    arrival_icao TEXT NOT NULL,
    flight_time TEXT NOT NULL,
    fuel_burn_lbs INTEGER NOT NULL DEFAULT 0,
    pic_name TEXT NOT NULL,
    squawks TEXT,
    recorded_at TEXT NOT NULL
)
";

/// Index on flight date for range filters.
pub const CREATE_FLIGHTS_DATE_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_flight_logs_date ON flight_logs(date)
";

/// Administrative hour meter corrections.
pub const CREATE_CORRECTIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS aircraft_corrections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    reference TEXT NOT NULL UNIQUE,
    previous_aftt TEXT NOT NULL,
    new_aftt TEXT NOT NULL,
    previous_cycles INTEGER NOT NULL,
    new_cycles INTEGER NOT NULL,
    reason TEXT NOT NULL,
    recorded_at TEXT NOT NULL
)
";

/// Key-value pairs such as the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_AIRCRAFT_TABLE,
    CREATE_TASKS_TABLE,
    CREATE_LEDGER_TABLE,
    CREATE_LEDGER_TASK_INDEX,
    CREATE_FLIGHTS_TABLE,
    CREATE_FLIGHTS_DATE_INDEX,
    CREATE_CORRECTIONS_TABLE,
    CREATE_METADATA_TABLE,
];

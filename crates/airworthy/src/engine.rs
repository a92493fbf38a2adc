//! The compliance engine.
//!
//! Owns the aircraft state, the task baselines with their ledgers, and the
//! flight log, and serializes mutations the way the records demand:
//!
//! - Flight appends and meter corrections hold the aircraft write lock for
//!   their whole read-modify-write, so no increment is lost.
//! - Sign-offs hold the write lock of the one task they touch, so two
//!   technicians closing the same task serialize while unrelated tasks
//!   proceed in parallel.
//! - Reads take short read locks and work on cloned snapshots.
//!
//! Every mutation is written to storage first and applied in memory only
//! after the transaction commits, so a failed write leaves prior state
//! untouched.
//!
//! Lock order is task map, then task, then aircraft, then flight log, then
//! storage. No path acquires them in a different order.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aircraft::{AircraftState, Correction, CorrectionRecord};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::flight::{FlightFilter, FlightLogEntry, NewFlight};
use crate::ledger::{self, LedgerEntry, SignOffRequest};
use crate::status::{self, FleetSummary, HealthPolicy, TaskStatus};
use crate::storage::{Storage, StorageStats};
use crate::task::{ComplianceTask, NewTask, TaskId};

/// A task's current baseline together with its sign-off history.
#[derive(Debug)]
struct TaskRecord {
    task: ComplianceTask,
    /// Chronological: completion date, then insertion order.
    history: Vec<LedgerEntry>,
}

impl TaskRecord {
    fn last_digest(&self) -> Option<&str> {
        self.history
            .iter()
            .max_by_key(|e| e.id)
            .map(|e| e.digest.as_str())
    }
}

type TaskSlot = Arc<RwLock<TaskRecord>>;

/// Aircraft state plus the fleet summary, as shown on a status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    /// Current hour meter.
    pub aircraft: AircraftState,
    /// Aggregate task status.
    pub summary: FleetSummary,
}

/// Maintenance compliance engine for a single aircraft.
#[derive(Debug)]
pub struct ComplianceEngine {
    storage: Mutex<Storage>,
    aircraft: RwLock<AircraftState>,
    tasks: RwLock<BTreeMap<TaskId, TaskSlot>>,
    flights: RwLock<Vec<FlightLogEntry>>,
    policy: HealthPolicy,
    clock: Box<dyn Clock>,
}

impl ComplianceEngine {
    /// Open the engine over `storage`, seeding the aircraft if the database is new.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored records cannot be loaded.
    pub fn open(storage: Storage, seed: &AircraftState, policy: HealthPolicy) -> Result<Self> {
        Self::open_with_clock(storage, seed, policy, SystemClock)
    }

    /// Open the engine using the database and settings from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Storage::open(config.database_path())?;
        Self::open(storage, &config.seed_aircraft(), config.health_policy())
    }

    /// Open the engine with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored records cannot be loaded.
    pub fn open_with_clock(
        storage: Storage,
        seed: &AircraftState,
        policy: HealthPolicy,
        clock: impl Clock + 'static,
    ) -> Result<Self> {
        storage.seed_aircraft(seed)?;
        let aircraft = storage
            .load_aircraft()?
            .ok_or_else(|| Error::internal("aircraft row missing after seeding"))?;
        if aircraft.registration != seed.registration {
            warn!(
                "Configured registration {} differs from stored {}; using stored",
                seed.registration, aircraft.registration
            );
        }

        let mut records: BTreeMap<TaskId, TaskRecord> = storage
            .load_tasks()?
            .into_iter()
            .map(|task| {
                (
                    task.id,
                    TaskRecord {
                        task,
                        history: Vec::new(),
                    },
                )
            })
            .collect();
        for entry in storage.load_ledger()? {
            match records.get_mut(&entry.task_id) {
                Some(record) => record.history.push(entry),
                None => warn!(
                    "Ledger entry {} references unknown task {}",
                    entry.id, entry.task_id
                ),
            }
        }
        for record in records.values_mut() {
            ledger::sort_chronological(&mut record.history);
        }

        let flights = storage.load_flights()?;
        info!(
            "Loaded {} at {} hours: {} tasks, {} flights",
            aircraft.registration,
            aircraft.current_aftt,
            records.len(),
            flights.len()
        );

        Ok(Self {
            storage: Mutex::new(storage),
            aircraft: RwLock::new(aircraft),
            tasks: RwLock::new(
                records
                    .into_iter()
                    .map(|(id, record)| (id, Arc::new(RwLock::new(record))))
                    .collect(),
            ),
            flights: RwLock::new(flights),
            policy,
            clock: Box::new(clock),
        })
    }

    // === Reads ===

    /// Current aircraft state.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn aircraft(&self) -> Result<AircraftState> {
        Ok(read(&self.aircraft)?.clone())
    }

    /// Status of one task, retired or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown task.
    pub fn task(&self, id: TaskId) -> Result<TaskStatus> {
        let slot = self.slot(id)?;
        let record = read(&slot)?;
        let aircraft = read(&self.aircraft)?;
        Ok(status::compute_status(
            &record.task,
            &aircraft,
            self.clock.today(),
        ))
    }

    /// Status of every active task, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn tasks(&self) -> Result<Vec<TaskStatus>> {
        self.collect_statuses(|task| task.active)
    }

    /// Status of every task, retired ones included.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn all_tasks(&self) -> Result<Vec<TaskStatus>> {
        self.collect_statuses(|_| true)
    }

    /// Active tasks whose number, description or equipment type contains
    /// `query`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn search_tasks(&self, query: &str) -> Result<Vec<TaskStatus>> {
        self.collect_statuses(|task| task.active && task.matches(query))
    }

    /// Percent of active tasks not overdue.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn fleet_health(&self) -> Result<u8> {
        Ok(self.dashboard()?.summary.health_percent)
    }

    /// Aircraft state with the fleet summary computed against it.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn dashboard(&self) -> Result<Dashboard> {
        let (aircraft, statuses) = self.snapshot(|task| task.active)?;
        Ok(Dashboard {
            summary: status::summarize(&statuses, self.policy),
            aircraft,
        })
    }

    /// A task's sign-off history, oldest first. Empty if never signed off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown task.
    pub fn history(&self, id: TaskId) -> Result<Vec<LedgerEntry>> {
        let slot = self.slot(id)?;
        let record = read(&slot)?;
        Ok(record.history.clone())
    }

    /// Whether a task's ledger digest chain is intact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown task.
    pub fn verify_history(&self, id: TaskId) -> Result<bool> {
        let slot = self.slot(id)?;
        let record = read(&slot)?;
        Ok(ledger::verify_chain(&record.history))
    }

    /// Flights passing `filter`, in the order they were logged.
    ///
    /// # Errors
    ///
    /// Returns an internal error if a lock is poisoned.
    pub fn flights(&self, filter: &FlightFilter) -> Result<Vec<FlightLogEntry>> {
        Ok(read(&self.flights)?
            .iter()
            .filter(|flight| filter.matches(flight))
            .cloned()
            .collect())
    }

    /// Applied meter corrections, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn corrections(&self) -> Result<Vec<CorrectionRecord>> {
        lock(&self.storage)?.load_corrections()
    }

    /// Row counts and file size of the backing database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn storage_stats(&self) -> Result<StorageStats> {
        lock(&self.storage)?.stats()
    }

    // === Writes ===

    /// Create a task. Missing baselines are seeded from the current hour
    /// meter and today's date.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad input or a duplicate task number.
    pub fn add_task(&self, new: NewTask) -> Result<ComplianceTask> {
        let mut tasks = write(&self.tasks)?;
        let current_aftt = read(&self.aircraft)?.current_aftt;
        let mut task = new.into_task(current_aftt, self.clock.today())?;

        for slot in tasks.values() {
            if read(slot)?.task.task_number == task.task_number {
                return Err(Error::validation(
                    "task_number",
                    format!("task {} already exists", task.task_number),
                ));
            }
        }

        task.id = lock(&self.storage)?.insert_task(&task)?;
        info!("Added task {} ({})", task.task_number, task.interval);
        tasks.insert(
            task.id,
            Arc::new(RwLock::new(TaskRecord {
                task: task.clone(),
                history: Vec::new(),
            })),
        );
        Ok(task)
    }

    /// Retire a task. Its history is kept; it no longer counts toward
    /// health and can no longer be signed off.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown task.
    pub fn retire_task(&self, id: TaskId) -> Result<ComplianceTask> {
        let slot = self.slot(id)?;
        let mut record = write(&slot)?;
        if !record.task.active {
            debug!("Task {} already retired", id);
            return Ok(record.task.clone());
        }

        if !lock(&self.storage)?.set_task_active(id, false)? {
            return Err(Error::not_found("task", id));
        }
        record.task.active = false;
        info!("Retired task {}", record.task.task_number);
        Ok(record.task.clone())
    }

    /// Sign a task off at the current hour meter and today's date.
    ///
    /// Appends a ledger entry and advances the task's baseline by one
    /// interval from the completion point, atomically.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] for a blank technician, a clock earlier than
    ///   the task's last completion, or a retired task.
    /// - [`Error::NotFound`] for an unknown task.
    /// - [`Error::Conflict`] if `expected_revision` no longer matches.
    pub fn sign_off(&self, id: TaskId, request: &SignOffRequest) -> Result<LedgerEntry> {
        let slot = self.slot(id)?;
        let mut record = write(&slot)?;
        let last_completion = record.history.last().map(|e| e.completion_date);
        let completion_date = request.validate(self.clock.today(), last_completion)?;

        if !record.task.active {
            return Err(Error::validation(
                "task",
                format!("task {} is retired", record.task.task_number),
            ));
        }
        let revision = record.task.revision;
        if let Some(expected) = request.expected_revision {
            if expected != revision {
                return Err(Error::conflict(format!(
                    "task {} baseline is at revision {revision}, not {expected}",
                    record.task.task_number
                )));
            }
        }

        let completion_hours = read(&self.aircraft)?.current_aftt;
        let advanced = record.task.advanced(completion_hours, completion_date)?;
        let mut entry = LedgerEntry::new(
            id,
            request,
            completion_date,
            completion_hours,
            self.clock.now(),
            record.last_digest(),
        );

        entry.id = lock(&self.storage)?.record_sign_off(&entry, &advanced, revision)?;

        info!(
            "Task {} signed off by {} at {} hours",
            advanced.task_number, entry.technician_name, completion_hours
        );
        record.task = advanced;
        record.history.push(entry.clone());
        ledger::sort_chronological(&mut record.history);
        Ok(entry)
    }

    /// Append a flight, advancing the hour meter and cycle count.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a non-positive flight time or other
    /// malformed fields; nothing is recorded in that case.
    pub fn log_flight(&self, new: NewFlight) -> Result<AircraftState> {
        let mut entry = new.into_entry(self.clock.now())?;

        let mut aircraft = write(&self.aircraft)?;
        let next = aircraft.after_flight(entry.flight_time)?;
        let mut flights = write(&self.flights)?;

        entry.id = lock(&self.storage)?.record_flight(&entry, &next)?;

        info!(
            "Logged flight {} -> {} ({} hrs); AFTT now {}",
            entry.departure_icao, entry.arrival_icao, entry.flight_time, next.current_aftt
        );
        flights.push(entry);
        *aircraft = next.clone();
        Ok(next)
    }

    /// Apply an administrative hour meter correction. Replaying a reference
    /// that was already applied returns the current state unchanged.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed correction, or a conflict
    /// when a known reference is replayed with different values.
    pub fn correct_aircraft(&self, correction: &Correction) -> Result<AircraftState> {
        correction.validate()?;

        let mut aircraft = write(&self.aircraft)?;
        let mut storage = lock(&self.storage)?;
        if let Some(applied) = storage.find_correction(correction.reference.trim())? {
            if !applied.same_values(correction) {
                return Err(Error::conflict(format!(
                    "correction {} was already applied with different values",
                    applied.reference
                )));
            }
            debug!("Correction {} already applied", applied.reference);
            return Ok(aircraft.clone());
        }

        let record = CorrectionRecord::new(correction, &aircraft, self.clock.now());
        let next = record.apply_to(&aircraft);
        storage.record_correction(&record, &next)?;

        warn!(
            "AFTT corrected from {} to {} ({}): {}",
            record.previous_aftt, record.new_aftt, record.reference, record.reason
        );
        *aircraft = next.clone();
        Ok(next)
    }

    // === Helpers ===

    fn slot(&self, id: TaskId) -> Result<TaskSlot> {
        read(&self.tasks)?
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("task", id))
    }

    /// Statuses of the kept tasks together with the aircraft state they were
    /// computed against.
    ///
    /// Every task read lock is held, in ID order, while the aircraft is read.
    /// A sign-off needs its task's write lock, so no baseline can move past
    /// the AFTT it is compared with.
    fn snapshot(
        &self,
        keep: impl Fn(&ComplianceTask) -> bool,
    ) -> Result<(AircraftState, Vec<TaskStatus>)> {
        let slots: Vec<TaskSlot> = read(&self.tasks)?.values().cloned().collect();
        let records = slots
            .iter()
            .map(|slot| read(slot))
            .collect::<Result<Vec<_>>>()?;
        let aircraft = self.aircraft()?;
        let today = self.clock.today();

        let statuses = records
            .iter()
            .filter(|record| keep(&record.task))
            .map(|record| status::compute_status(&record.task, &aircraft, today))
            .collect();
        Ok((aircraft, statuses))
    }

    fn collect_statuses(&self, keep: impl Fn(&ComplianceTask) -> bool) -> Result<Vec<TaskStatus>> {
        Ok(self.snapshot(keep)?.1)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| Error::internal("lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| Error::internal("lock poisoned"))
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| Error::internal("storage lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::logging::init_test_logging;
    use crate::status::Severity;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn hours(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::from_str(s).unwrap()
    }

    fn today() -> NaiveDate {
        date("2026-04-12")
    }

    fn create_test_engine() -> ComplianceEngine {
        init_test_logging();
        ComplianceEngine::open_with_clock(
            Storage::open_in_memory().unwrap(),
            &AircraftState::new("N528RR", hours("1000.0"), 0),
            HealthPolicy::default(),
            FixedClock::on(today()),
        )
        .unwrap()
    }

    fn hours_task(number: &str, next_due: &str) -> NewTask {
        NewTask {
            task_number: number.to_string(),
            description: "100 hour inspection".to_string(),
            equipment_type: "Airframe".to_string(),
            interval_hours: Some(hours("100")),
            next_due_hours: Some(hours(next_due)),
            ..NewTask::default()
        }
    }

    fn flight(time: &str) -> NewFlight {
        NewFlight {
            date: today(),
            departure_icao: "KOKC".to_string(),
            arrival_icao: "KPWA".to_string(),
            flight_time: hours(time),
            fuel_burn_lbs: 120,
            pic_name: "Xavier".to_string(),
            squawks: None,
        }
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ComplianceEngine>();
    }

    #[test]
    fn test_open_seeds_aircraft() {
        let engine = create_test_engine();
        let aircraft = engine.aircraft().unwrap();

        assert_eq!(aircraft.registration, "N528RR");
        assert_eq!(aircraft.current_aftt, hours("1000.0"));
        assert_eq!(aircraft.total_cycles, 0);
    }

    #[test]
    fn test_log_flight_advances_meter() {
        let engine = create_test_engine();
        let state = engine.log_flight(flight("2.5")).unwrap();

        assert_eq!(state.current_aftt, hours("1002.5"));
        assert_eq!(state.total_cycles, 1);
        assert_eq!(engine.aircraft().unwrap(), state);
        assert_eq!(engine.flights(&FlightFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_log_flight_rejects_non_positive_without_mutation() {
        let engine = create_test_engine();

        for bad in ["0", "-1"] {
            let err = engine.log_flight(flight(bad)).unwrap_err();
            assert!(err.is_validation());
        }

        let aircraft = engine.aircraft().unwrap();
        assert_eq!(aircraft.current_aftt, hours("1000.0"));
        assert_eq!(aircraft.total_cycles, 0);
        assert!(engine.flights(&FlightFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_tasks_report_margin() {
        let engine = create_test_engine();
        let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();
        engine.log_flight(flight("2.5")).unwrap();

        let status = engine.task(task.id).unwrap();
        assert_eq!(status.remaining_hours, Some(hours("7.5")));
        assert_eq!(status.severity, Severity::Critical);
    }

    #[test]
    fn test_add_task_rejects_duplicate_number() {
        let engine = create_test_engine();
        engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();

        let err = engine
            .add_task(hours_task("05-20-01", "1200.0"))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(engine.tasks().unwrap().len(), 1);
    }

    #[test]
    fn test_sign_off_appends_and_advances() {
        let engine = create_test_engine();
        let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();
        engine.log_flight(flight("2.5")).unwrap();

        let entry = engine
            .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
            .unwrap();

        assert_eq!(entry.completion_hours, hours("1002.5"));
        assert_eq!(entry.completion_date, today());
        let history = engine.history(task.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], entry);

        let status = engine.task(task.id).unwrap();
        assert_eq!(status.task.next_due_hours, Some(hours("1102.5")));
        assert_eq!(status.remaining_hours, Some(hours("100.0")));
        assert_eq!(status.severity, Severity::Healthy);
        assert_eq!(status.task.revision, 1);
    }

    #[test]
    fn test_sign_off_unknown_task() {
        let engine = create_test_engine();
        let err = engine
            .sign_off(99, &SignOffRequest::new("J. Alvarez"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_sign_off_validation_leaves_state() {
        let engine = create_test_engine();
        let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();

        let blank = engine.sign_off(task.id, &SignOffRequest::new(""));
        assert!(blank.unwrap_err().is_validation());

        assert!(engine.history(task.id).unwrap().is_empty());
        assert_eq!(engine.task(task.id).unwrap().task.revision, 0);
    }

    #[test]
    fn test_sign_off_calendar_task_advances_from_today() {
        let engine = create_test_engine();
        let task = engine
            .add_task(NewTask {
                interval_hours: None,
                next_due_hours: None,
                interval_months: Some(12),
                next_due_date: Some(date("2026-05-01")),
                ..hours_task("21-00-01", "0")
            })
            .unwrap();

        let entry = engine
            .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
            .unwrap();
        assert_eq!(entry.completion_date, today());

        let status = engine.task(task.id).unwrap();
        assert_eq!(status.task.next_due_date, Some(date("2027-04-12")));
        assert_eq!(status.task.next_due_hours, None);
        assert_eq!(status.severity, Severity::Unknown);
    }

    #[test]
    fn test_add_task_rejects_baseline_on_untracked_axis() {
        let engine = create_test_engine();

        let calendar_only = NewTask {
            interval_hours: None,
            interval_months: Some(12),
            ..hours_task("21-00-01", "1001.0")
        };
        let err = engine.add_task(calendar_only).unwrap_err();
        assert!(err.to_string().contains("next_due_hours"));

        let hours_only = NewTask {
            next_due_date: Some(date("2026-06-01")),
            ..hours_task("05-20-01", "1010.0")
        };
        let err = engine.add_task(hours_only).unwrap_err();
        assert!(err.to_string().contains("next_due_date"));

        assert!(engine.all_tasks().unwrap().is_empty());
    }

    #[test]
    fn test_calendar_task_recovers_after_sign_off() {
        let engine = create_test_engine();
        let task = engine
            .add_task(NewTask {
                interval_hours: None,
                next_due_hours: None,
                interval_months: Some(12),
                ..hours_task("21-00-01", "0")
            })
            .unwrap();
        engine.log_flight(flight("2.0")).unwrap();
        engine
            .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
            .unwrap();

        let status = engine.task(task.id).unwrap();
        assert_eq!(status.task.next_due_hours, None);
        assert_ne!(status.severity, Severity::Overdue);
        assert_eq!(engine.fleet_health().unwrap(), 100);
    }

    #[test]
    fn test_sign_off_stale_revision_conflicts() {
        let engine = create_test_engine();
        let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();
        engine
            .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
            .unwrap();

        let stale = SignOffRequest {
            expected_revision: Some(0),
            ..SignOffRequest::new("K. Osei")
        };
        let err = engine.sign_off(task.id, &stale).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(engine.history(task.id).unwrap().len(), 1);

        let fresh = SignOffRequest {
            expected_revision: Some(1),
            ..SignOffRequest::new("K. Osei")
        };
        engine.sign_off(task.id, &fresh).unwrap();
        assert_eq!(engine.history(task.id).unwrap().len(), 2);
    }

    #[test]
    fn test_history_same_day_keeps_insertion_order() {
        let engine = create_test_engine();
        let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();

        for tech in ["J. Alvarez", "K. Osei", "M. Brandt"] {
            engine.sign_off(task.id, &SignOffRequest::new(tech)).unwrap();
        }

        let history = engine.history(task.id).unwrap();
        let techs: Vec<&str> = history
            .iter()
            .map(|e| e.technician_name.as_str())
            .collect();
        assert_eq!(techs, vec!["J. Alvarez", "K. Osei", "M. Brandt"]);
        assert!(history.windows(2).all(|w| w[0].id < w[1].id));
        assert!(engine.verify_history(task.id).unwrap());
    }

    #[test]
    fn test_sign_off_never_moves_calendar_baseline_backwards() {
        let dir = std::env::temp_dir().join(format!("airworthy-backdate-{}", std::process::id()));
        let path = dir.join("compliance.db");
        let seed = AircraftState::new("N528RR", hours("1000.0"), 0);
        let open_on = |day: &str| {
            ComplianceEngine::open_with_clock(
                Storage::open(&path).unwrap(),
                &seed,
                HealthPolicy::default(),
                FixedClock::on(date(day)),
            )
            .unwrap()
        };

        let task_id = {
            let engine = open_on("2026-04-12");
            let task = engine
                .add_task(NewTask {
                    interval_hours: None,
                    next_due_hours: None,
                    interval_months: Some(1),
                    ..hours_task("21-00-01", "0")
                })
                .unwrap();
            engine
                .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
                .unwrap();
            task.id
        };

        {
            let engine = open_on("2026-04-01");
            let err = engine
                .sign_off(task_id, &SignOffRequest::new("K. Osei"))
                .unwrap_err();
            assert!(err.is_validation());
            assert_eq!(
                engine.task(task_id).unwrap().task.next_due_date,
                Some(date("2026-05-12"))
            );
        }

        let engine = open_on("2026-04-20");
        engine
            .sign_off(task_id, &SignOffRequest::new("K. Osei"))
            .unwrap();
        assert_eq!(
            engine.task(task_id).unwrap().task.next_due_date,
            Some(date("2026-05-20"))
        );
        let days: Vec<String> = engine
            .history(task_id)
            .unwrap()
            .iter()
            .map(|e| e.completion_date.to_string())
            .collect();
        assert_eq!(days, vec!["2026-04-12", "2026-04-20"]);
        assert!(engine.verify_history(task_id).unwrap());

        drop(engine);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_history_empty_and_missing() {
        let engine = create_test_engine();
        let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();

        assert!(engine.history(task.id).unwrap().is_empty());
        assert!(engine.history(404).unwrap_err().is_not_found());
    }

    #[test]
    fn test_retire_task() {
        let engine = create_test_engine();
        let task = engine.add_task(hours_task("05-20-01", "990.0")).unwrap();
        engine.add_task(hours_task("05-20-02", "1200.0")).unwrap();
        assert_eq!(engine.fleet_health().unwrap(), 50);

        let retired = engine.retire_task(task.id).unwrap();
        assert!(!retired.active);
        assert_eq!(engine.tasks().unwrap().len(), 1);
        assert_eq!(engine.all_tasks().unwrap().len(), 2);
        assert_eq!(engine.fleet_health().unwrap(), 100);

        let err = engine
            .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
            .unwrap_err();
        assert!(err.is_validation());

        // Retiring twice is harmless
        assert!(!engine.retire_task(task.id).unwrap().active);
    }

    #[test]
    fn test_fleet_health_snapshot() {
        let engine = create_test_engine();
        assert_eq!(engine.fleet_health().unwrap(), 100);

        engine.add_task(hours_task("A", "999")).unwrap();
        engine.add_task(hours_task("B", "1010")).unwrap();
        engine.add_task(hours_task("C", "1100")).unwrap();
        engine.add_task(hours_task("D", "1500")).unwrap();

        let dashboard = engine.dashboard().unwrap();
        assert_eq!(dashboard.summary.total_tasks, 4);
        assert_eq!(dashboard.summary.overdue, 1);
        assert_eq!(dashboard.summary.health_percent, 75);
    }

    #[test]
    fn test_search_tasks() {
        let engine = create_test_engine();
        engine.add_task(hours_task("05-20-01", "1100")).unwrap();
        engine
            .add_task(NewTask {
                description: "Pitot-static system check".to_string(),
                equipment_type: "Avionics".to_string(),
                ..hours_task("34-11-00", "1100")
            })
            .unwrap();

        assert_eq!(engine.search_tasks("avionics").unwrap().len(), 1);
        assert_eq!(engine.search_tasks("PITOT").unwrap().len(), 1);
        assert_eq!(engine.search_tasks("-").unwrap().len(), 2);
        assert!(engine.search_tasks("propeller").unwrap().is_empty());
    }

    #[test]
    fn test_reads_are_idempotent() {
        let engine = create_test_engine();
        engine.add_task(hours_task("05-20-01", "1010")).unwrap();
        engine.log_flight(flight("1.2")).unwrap();

        assert_eq!(engine.tasks().unwrap(), engine.tasks().unwrap());
        assert_eq!(engine.dashboard().unwrap(), engine.dashboard().unwrap());
    }

    #[test]
    fn test_correct_aircraft_is_idempotent() {
        let engine = create_test_engine();
        let correction = Correction {
            reference: "REC-1".to_string(),
            new_aftt: hours("1200.0"),
            new_cycles: Some(40),
            reason: "hour meter replaced".to_string(),
        };

        let first = engine.correct_aircraft(&correction).unwrap();
        assert_eq!(first.current_aftt, hours("1200.0"));
        assert_eq!(first.total_cycles, 40);

        engine.log_flight(flight("1.0")).unwrap();
        let replay = engine.correct_aircraft(&correction).unwrap();
        assert_eq!(replay.current_aftt, hours("1201.0"));
        assert_eq!(engine.corrections().unwrap().len(), 1);
    }

    #[test]
    fn test_correct_aircraft_replay_with_other_values_conflicts() {
        let engine = create_test_engine();
        let correction = Correction {
            reference: "REC-1".to_string(),
            new_aftt: hours("1200.0"),
            new_cycles: None,
            reason: "hour meter replaced".to_string(),
        };
        engine.correct_aircraft(&correction).unwrap();

        let changed = Correction {
            new_aftt: hours("1250.0"),
            ..correction.clone()
        };
        let err = engine.correct_aircraft(&changed).unwrap_err();
        assert!(err.is_conflict());

        let with_cycles = Correction {
            new_cycles: Some(99),
            ..correction
        };
        assert!(engine.correct_aircraft(&with_cycles).unwrap_err().is_conflict());

        assert_eq!(engine.aircraft().unwrap().current_aftt, hours("1200.0"));
        assert_eq!(engine.corrections().unwrap().len(), 1);
    }

    #[test]
    fn test_flight_filter() {
        let engine = create_test_engine();
        engine.log_flight(flight("1.0")).unwrap();
        engine
            .log_flight(NewFlight {
                departure_icao: "KPWA".to_string(),
                arrival_icao: "KDFW".to_string(),
                date: date("2026-04-01"),
                ..flight("1.5")
            })
            .unwrap();

        let dfw = FlightFilter {
            icao: Some("dfw".to_string()),
            ..FlightFilter::default()
        };
        assert_eq!(engine.flights(&dfw).unwrap().len(), 1);

        let recent = FlightFilter {
            since: Some(date("2026-04-05")),
            ..FlightFilter::default()
        };
        let flights = engine.flights(&recent).unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].arrival_icao, "KPWA");
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("airworthy-engine-{}", std::process::id()));
        let path = dir.join("compliance.db");
        let seed = AircraftState::new("N528RR", hours("1000.0"), 0);

        let task_id = {
            let engine = ComplianceEngine::open_with_clock(
                Storage::open(&path).unwrap(),
                &seed,
                HealthPolicy::default(),
                FixedClock::on(today()),
            )
            .unwrap();
            let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();
            engine.log_flight(flight("2.5")).unwrap();
            engine
                .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
                .unwrap();
            task.id
        };

        let engine = ComplianceEngine::open_with_clock(
            Storage::open(&path).unwrap(),
            &seed,
            HealthPolicy::default(),
            FixedClock::on(today()),
        )
        .unwrap();

        assert_eq!(engine.aircraft().unwrap().current_aftt, hours("1002.5"));
        assert_eq!(engine.history(task_id).unwrap().len(), 1);
        assert!(engine.verify_history(task_id).unwrap());
        assert_eq!(
            engine.task(task_id).unwrap().task.next_due_hours,
            Some(hours("1102.5"))
        );

        drop(engine);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_flights_lose_no_increment() {
        let engine = Arc::new(create_test_engine());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::task::spawn_blocking(move || engine.log_flight(flight("0.5")))
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let aircraft = engine.aircraft().unwrap();
        assert_eq!(aircraft.total_cycles, 16);
        assert_eq!(aircraft.current_aftt, hours("1008.0"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_sign_offs_on_one_task_serialize() {
        let engine = Arc::new(create_test_engine());
        let task = engine.add_task(hours_task("05-20-01", "1010.0")).unwrap();

        let handles: Vec<_> = ["J. Alvarez", "K. Osei"]
            .into_iter()
            .map(|tech| {
                let engine = Arc::clone(&engine);
                tokio::task::spawn_blocking(move || {
                    let request = SignOffRequest {
                        expected_revision: Some(0),
                        ..SignOffRequest::new(tech)
                    };
                    engine.sign_off(task.id, &request)
                })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert_eq!((ok, conflicts), (1, 1));
        assert_eq!(engine.history(task.id).unwrap().len(), 1);
        assert_eq!(engine.task(task.id).unwrap().task.revision, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sign_offs_across_tasks_and_flights_interleave() {
        let engine = Arc::new(create_test_engine());
        let ids: Vec<TaskId> = (0..4)
            .map(|i| {
                engine
                    .add_task(hours_task(&format!("T-{i}"), "1100"))
                    .unwrap()
                    .id
            })
            .collect();

        let mut handles = Vec::new();
        for id in ids.clone() {
            let sign_engine = Arc::clone(&engine);
            handles.push(tokio::task::spawn_blocking(move || {
                sign_engine
                    .sign_off(id, &SignOffRequest::new("J. Alvarez"))
                    .map(|_| ())
            }));
            let flight_engine = Arc::clone(&engine);
            handles.push(tokio::task::spawn_blocking(move || {
                flight_engine.log_flight(flight("1.0")).map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let aircraft = engine.aircraft().unwrap();
        assert_eq!(aircraft.total_cycles, 4);
        for id in ids {
            let history = engine.history(id).unwrap();
            assert_eq!(history.len(), 1);
            let entry = &history[0];
            assert!(entry.completion_hours <= aircraft.current_aftt);
            let task = engine.task(id).unwrap().task;
            assert_eq!(
                task.next_due_hours,
                Some(entry.completion_hours + hours("100"))
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reads_never_see_baseline_ahead_of_meter() {
        let engine = Arc::new(create_test_engine());
        let task = engine.add_task(hours_task("05-20-01", "1100.0")).unwrap();
        let interval = hours("100");

        let writer = {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || {
                for _ in 0..50 {
                    engine.log_flight(flight("0.7")).unwrap();
                    engine
                        .sign_off(task.id, &SignOffRequest::new("J. Alvarez"))
                        .unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::task::spawn_blocking(move || {
                    for _ in 0..200 {
                        let single = engine.task(task.id).unwrap();
                        assert!(single.remaining_hours.unwrap() <= interval);

                        let dashboard_tasks = engine.tasks().unwrap();
                        assert!(dashboard_tasks[0].remaining_hours.unwrap() <= interval);
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(engine.history(task.id).unwrap().len(), 50);
    }
}

//! `airworthy` - CLI for the maintenance compliance engine
//!
//! Opens the configured database, runs one command against it and prints
//! the result as a table or JSON.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::Parser;

use airworthy::cli::{
    AddTaskArgs, AircraftCommand, Cli, Command, CompleteArgs, ConfigCommand, FlightsCommand,
    LogFlightArgs, OutputFormat, TasksCommand,
};
use airworthy::status::format_hours;
use airworthy::{
    init_logging, Clock, ComplianceEngine, Config, Correction, FlightFilter, LedgerEntry,
    NewFlight, NewTask, SignOffRequest, SystemClock, TaskStatus,
};

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbosity());

    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Tasks(cmd) => handle_tasks(&open_engine(&config)?, cmd),
        Command::Flights(cmd) => handle_flights(&open_engine(&config)?, cmd),
        Command::Aircraft(cmd) => handle_aircraft(&open_engine(&config)?, cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_engine(config: &Config) -> Result<ComplianceEngine> {
    ComplianceEngine::from_config(config).with_context(|| {
        format!(
            "opening compliance database at {}",
            config.database_path().display()
        )
    })
}

fn handle_status(config: &Config, json: bool) -> Result<()> {
    let engine = open_engine(config)?;
    let dashboard = engine.dashboard()?;
    let stats = engine.storage_stats()?;

    if json {
        let status = serde_json::json!({
            "aircraft": dashboard.aircraft,
            "summary": dashboard.summary,
            "database_path": config.database_path(),
            "ledger_entries": stats.ledger_entries,
            "flights": stats.flights,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        let aircraft = &dashboard.aircraft;
        let summary = &dashboard.summary;
        println!("airworthy status");
        println!("----------------");
        println!("Aircraft:      {}", aircraft.registration);
        println!("AFTT:          {} hrs", format_hours(aircraft.current_aftt));
        println!("Cycles:        {}", aircraft.total_cycles);
        println!("Health:        {}%", summary.health_percent);
        println!(
            "Tasks:         {} active, {} overdue, {} critical, {} advisory",
            summary.total_tasks, summary.overdue, summary.critical, summary.advisory
        );
        println!("Sign-offs:     {}", stats.ledger_entries);
        println!("Flights:       {}", stats.flights);
        println!("Database:      {}", config.database_path().display());
    }
    Ok(())
}

fn handle_tasks(engine: &ComplianceEngine, cmd: TasksCommand) -> Result<()> {
    match cmd {
        TasksCommand::List {
            search,
            all,
            format,
        } => {
            let statuses = match (search, all) {
                (Some(query), _) => engine.search_tasks(&query)?,
                (None, true) => engine.all_tasks()?,
                (None, false) => engine.tasks()?,
            };
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&statuses)?),
                OutputFormat::Table => print_task_table(&statuses),
            }
        }
        TasksCommand::Show { id, json } => {
            let status = engine.task(id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_task(&status);
            }
        }
        TasksCommand::Add(args) => add_task(engine, args)?,
        TasksCommand::History { id, format } => {
            let history = engine.history(id)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
                OutputFormat::Table => print_history(&history),
            }
        }
        TasksCommand::Complete(args) => complete_task(engine, args)?,
        TasksCommand::Retire { id } => {
            let task = engine.retire_task(id)?;
            println!("Retired task {} ({})", task.task_number, task.description);
        }
        TasksCommand::Verify { id } => {
            let entries = engine.history(id)?.len();
            if !engine.verify_history(id)? {
                bail!("ledger for task {id} failed verification ({entries} entries)");
            }
            println!("Ledger for task {id} verified ({entries} entries)");
        }
    }
    Ok(())
}

fn add_task(engine: &ComplianceEngine, args: AddTaskArgs) -> Result<()> {
    let task = engine.add_task(NewTask {
        task_number: args.task_number,
        description: args.description,
        equipment_type: args.equipment,
        interval_hours: args.hours,
        interval_months: args.months,
        next_due_hours: args.next_due_hours,
        next_due_date: args.next_due_date,
    })?;
    println!(
        "Added task {} [{}] every {}",
        task.task_number, task.id, task.interval
    );
    Ok(())
}

fn complete_task(engine: &ComplianceEngine, args: CompleteArgs) -> Result<()> {
    let request = SignOffRequest {
        work_order_ref: args.work_order,
        notes: args.notes,
        expected_revision: args.expect_revision,
        ..SignOffRequest::new(args.technician)
    };
    let entry = engine.sign_off(args.id, &request)?;
    let status = engine.task(args.id)?;
    println!(
        "Signed off {} at {} hrs on {} by {}",
        status.task.task_number,
        format_hours(entry.completion_hours),
        entry.completion_date,
        entry.technician_name
    );
    println!("Next due: {}", next_due(&status));
    Ok(())
}

fn handle_flights(engine: &ComplianceEngine, cmd: FlightsCommand) -> Result<()> {
    match cmd {
        FlightsCommand::List {
            icao,
            since,
            until,
            format,
        } => {
            let flights = engine.flights(&FlightFilter { icao, since, until })?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&flights)?),
                OutputFormat::Table => {
                    println!(
                        "{:<10}  {:<5} {:<5} {:>6}  {:>6}  {}",
                        "DATE", "FROM", "TO", "HRS", "FUEL", "PIC"
                    );
                    for flight in &flights {
                        println!(
                            "{:<10}  {:<5} {:<5} {:>6}  {:>6}  {}",
                            flight.date,
                            flight.departure_icao,
                            flight.arrival_icao,
                            format_hours(flight.flight_time),
                            flight.fuel_burn_lbs,
                            flight.pic_name
                        );
                    }
                    println!("{} flights", flights.len());
                }
            }
        }
        FlightsCommand::Log(args) => log_flight(engine, args)?,
    }
    Ok(())
}

fn log_flight(engine: &ComplianceEngine, args: LogFlightArgs) -> Result<()> {
    let state = engine.log_flight(NewFlight {
        date: args.date.unwrap_or_else(|| SystemClock.today()),
        departure_icao: args.from,
        arrival_icao: args.to,
        flight_time: args.time,
        fuel_burn_lbs: args.fuel,
        pic_name: args.pic,
        squawks: args.squawks,
    })?;
    println!(
        "Logged {} hrs; {} now at {} hrs, {} cycles",
        format_hours(args.time),
        state.registration,
        format_hours(state.current_aftt),
        state.total_cycles
    );
    Ok(())
}

fn handle_aircraft(engine: &ComplianceEngine, cmd: AircraftCommand) -> Result<()> {
    match cmd {
        AircraftCommand::Show { json } => {
            let aircraft = engine.aircraft()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&aircraft)?);
            } else {
                println!("Aircraft:  {}", aircraft.registration);
                println!("AFTT:      {} hrs", format_hours(aircraft.current_aftt));
                println!("Cycles:    {}", aircraft.total_cycles);
            }
        }
        AircraftCommand::Correct {
            reference,
            aftt,
            cycles,
            reason,
        } => {
            let state = engine.correct_aircraft(&Correction {
                reference,
                new_aftt: aftt,
                new_cycles: cycles,
                reason,
            })?;
            println!(
                "{} at {} hrs, {} cycles",
                state.registration,
                format_hours(state.current_aftt),
                state.total_cycles
            );
        }
        AircraftCommand::Corrections { format } => {
            let corrections = engine.corrections()?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&corrections)?);
                }
                OutputFormat::Table => {
                    for c in &corrections {
                        println!(
                            "{}  {:<12} {} -> {} hrs  {}",
                            c.recorded_at.format("%Y-%m-%d"),
                            c.reference,
                            format_hours(c.previous_aftt),
                            format_hours(c.new_aftt),
                            c.reason
                        );
                    }
                    println!("{} corrections", corrections.len());
                }
            }
        }
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:          {}", config.database_path().display());
                println!();
                println!("[Aircraft]");
                println!("  Registration:           {}", config.aircraft.registration);
                println!("  Seed AFTT:              {}", config.aircraft.seed_aftt);
                println!("  Seed cycles:            {}", config.aircraft.seed_cycles);
                println!();
                println!("[Compliance]");
                println!(
                    "  Count calendar overdue: {}",
                    config.compliance.count_calendar_overdue
                );
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => bail!("configuration error: {e}"),
            }
        }
    }
    Ok(())
}

fn print_task_table(statuses: &[TaskStatus]) {
    println!(
        "{:>4}  {:<12} {:<10} {:<18} {:>22}  {}",
        "ID", "TASK", "STATUS", "INTERVAL", "MARGIN", "DESCRIPTION"
    );
    for status in statuses {
        let task = &status.task;
        let state = if task.active {
            status.severity.to_string()
        } else {
            "retired".to_string()
        };
        println!(
            "{:>4}  {:<12} {:<10} {:<18} {:>22}  {}",
            task.id,
            task.task_number,
            state,
            task.interval.to_string(),
            status.margin_label(),
            task.description
        );
    }
    println!("{} tasks", statuses.len());
}

fn print_task(status: &TaskStatus) {
    let task = &status.task;
    println!("Task:        {} [{}]", task.task_number, task.id);
    println!("Description: {}", task.description);
    println!("Equipment:   {}", task.equipment_type);
    println!("Interval:    {}", task.interval);
    println!("Next due:    {}", next_due(status));
    println!("Margin:      {}", status.margin_label());
    println!("Severity:    {} ({}%)", status.severity, status.percent_used);
    if let Some(trigger) = status.due_by() {
        println!("Due by:      {trigger:?}");
    }
    println!("Revision:    {}", task.revision);
    if !task.active {
        println!("Retired");
    }
}

fn print_history(history: &[LedgerEntry]) {
    println!(
        "{:<10}  {:>9}  {:<20} {:<12}  {}",
        "DATE", "HRS", "TECHNICIAN", "WORK ORDER", "NOTES"
    );
    for entry in history {
        println!(
            "{:<10}  {:>9}  {:<20} {:<12}  {}",
            entry.completion_date,
            format_hours(entry.completion_hours),
            entry.technician_name,
            entry.work_order_ref.as_deref().unwrap_or("-"),
            entry.notes.as_deref().unwrap_or("")
        );
    }
    println!("{} entries", history.len());
}

fn next_due(status: &TaskStatus) -> String {
    let task = &status.task;
    match (task.next_due_hours, task.next_due_date) {
        (Some(hours), Some(date)) => format!("{} hrs or {date}", format_hours(hours)),
        (Some(hours), None) => format!("{} hrs", format_hours(hours)),
        (None, Some(date)) => date.to_string(),
        (None, None) => "-".to_string(),
    }
}

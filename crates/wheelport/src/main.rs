//! `wheelport` - CLI for booking shared wheelchairs
//!
//! This binary manages the unit inventory and runs interactive bookings
//! against it.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;

use wheelport::cli::{
    ride, BookCommand, Cli, Command, ConfigCommand, HistoryCommand, ProvisionCommand,
    StatusCommand, UnitsCommand,
};
use wheelport::{
    format_elapsed, init_logging, BookingSession, Config, LineReader, LocalIssuer,
    SessionOptions, SqliteInventory, Unit,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    match cli.command {
        Command::Units(cmd) => handle_units(&config, &cmd),
        Command::Provision(cmd) => handle_provision(&config, cmd),
        Command::Book(cmd) => handle_book(&config, &cmd).await,
        Command::ReleaseExpired => handle_release_expired(&config),
        Command::History(cmd) => handle_history(&config, &cmd),
        Command::Status(cmd) => handle_status(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn open_inventory(config: &Config) -> anyhow::Result<SqliteInventory> {
    let path = config.database_path();
    SqliteInventory::open(&path)
        .with_context(|| format!("opening inventory at {}", path.display()))
}

fn handle_units(config: &Config, cmd: &UnitsCommand) -> anyhow::Result<()> {
    let inventory = open_inventory(config)?;
    let units: Vec<Unit> = inventory
        .units()?
        .into_iter()
        .filter(|u| !cmd.available || u.is_available())
        .collect();

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&units)?);
        return Ok(());
    }

    if units.is_empty() {
        println!("No units found.");
        return Ok(());
    }
    println!(
        "{:<8} {:<24} {:>8} {:>8} {:>8}  STATUS",
        "ID", "LOCATION", "DISTANCE", "ETA", "BATTERY"
    );
    for unit in &units {
        println!(
            "{:<8} {:<24} {:>8} {:>8} {:>7}%  {}",
            unit.id,
            unit.location,
            unit.distance,
            unit.estimated_time.as_deref().unwrap_or("-"),
            unit.battery,
            unit.status
        );
    }
    Ok(())
}

fn handle_provision(config: &Config, cmd: ProvisionCommand) -> anyhow::Result<()> {
    let mut unit = Unit::new(cmd.id, cmd.location, cmd.distance, cmd.battery)?;
    if let Some(eta) = cmd.eta {
        unit = unit.with_estimated_time(eta);
    }

    let inventory = open_inventory(config)?;
    inventory.provision(&unit)?;
    println!("Provisioned {}.", unit.id);
    Ok(())
}

async fn handle_book(config: &Config, cmd: &BookCommand) -> anyhow::Result<()> {
    let inventory = Arc::new(open_inventory(config)?);
    let mut session = BookingSession::new(
        inventory,
        Arc::new(LocalIssuer),
        SessionOptions::from(config),
    );
    let mut reader = LineReader::stdin();
    let mut out = std::io::stdout();

    let trip = ride::run(
        &mut session,
        &cmd.id,
        &mut reader,
        &mut out,
        &config.facility,
        config.tick_interval(),
    )
    .await
    .with_context(|| format!("booking {}", cmd.id))?;

    if trip.is_none() {
        tracing::info!("Booking of {} ended without a trip", cmd.id);
    }
    Ok(())
}

fn handle_release_expired(config: &Config) -> anyhow::Result<()> {
    let Some(timeout) = config.hold_timeout() else {
        println!("Hold expiry is disabled (booking.hold_timeout_secs = 0).");
        return Ok(());
    };

    let inventory = open_inventory(config)?;
    let cutoff = Utc::now() - chrono::Duration::from_std(timeout)?;
    let released = inventory.release_holds_before(cutoff)?;
    println!("Released {released} expired holds.");
    Ok(())
}

fn handle_history(config: &Config, cmd: &HistoryCommand) -> anyhow::Result<()> {
    let inventory = open_inventory(config)?;
    let trips = inventory.recent_trips(cmd.limit)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&trips)?);
        return Ok(());
    }

    if trips.is_empty() {
        println!("No trips yet.");
        return Ok(());
    }
    for trip in &trips {
        println!(
            "{}  {:<8} {:>8}",
            trip.ended_at.format("%Y-%m-%d %H:%M"),
            trip.unit_id,
            format_elapsed(trip.elapsed_secs)
        );
    }
    Ok(())
}

fn handle_status(config: &Config, cmd: &StatusCommand) -> anyhow::Result<()> {
    let inventory = open_inventory(config)?;
    let stats = inventory.stats()?;

    if cmd.json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("wheelport status");
        println!("----------------");
        println!("Database:      {}", config.database_path().display());
        println!("Units:         {}", stats.total_units);
        println!("  Available:   {}", stats.available);
        println!("  Reserved:    {}", stats.reserved);
        println!("  In use:      {}", stats.in_use);
        println!("Trips:         {}", stats.total_trips);
        println!("Ride time:     {}", format_elapsed(stats.total_ride_secs));
        println!("Size:          {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Booking]");
                println!("  Hold timeout (s):   {}", config.booking.hold_timeout_secs);
                println!("  Tick interval (ms): {}", config.booking.tick_interval_ms);
                println!();
                println!("[Facility]");
                println!("  Current location:   {}", config.facility.current_location);
                println!("  Support contact:    {}", config.facility.support_contact);
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
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}

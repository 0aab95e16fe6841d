// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/safefall-rs

//! SafeFall - Fall Detection and Emergency Escalation
//!
//! Command line front end:
//! - `demo` walks one fall from detection to hospital resolution
//! - `simulate` prints the simulated motion stream
//! - `serve` runs the feed with WebSocket fan-out until Ctrl+C

use anyhow::Result;
use clap::{Parser, Subcommand};
use rand::thread_rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use safefall::core::NoticeLevel;
use safefall::dashboard::{self, FallStats};
use safefall::lifecycle::{next_fall, FallOutcome};
use safefall::location::{best_available, GeolocationProvider, SimulatedLocationSource};
use safefall::models::{Coordinates, NotificationType, Role};
use safefall::sensors::MotionSimulator;
use safefall::{Config, Engine, StreamingManager, NAME, VERSION};

/// SafeFall - Fall Detection and Emergency Escalation
#[derive(Parser, Debug)]
#[command(name = "safefall")]
#[command(author = "SafeFall Project")]
#[command(version = VERSION)]
#[command(about = "Fall detection with countdown escalation and hospital alerting")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Database file (in-memory store when omitted)
    #[arg(long)]
    db: Option<PathBuf>,

    /// WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk one fall from detection to hospital resolution
    Demo {
        /// Countdown length in seconds
        #[arg(long, default_value = "30")]
        countdown_secs: u64,

        /// Refuse location permission to exercise the fallback
        #[arg(long)]
        deny_location: bool,
    },

    /// Print the simulated motion stream
    Simulate {
        /// Seconds to run
        #[arg(long, default_value = "10")]
        duration: u64,

        /// Replay a fall after this many seconds
        #[arg(long)]
        fall_after: Option<u64>,
    },

    /// Run the feed and WebSocket fan-out until Ctrl+C
    Serve,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over the flags
    let log_level = if args.trace {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{} v{} - Fall Detection and Emergency Escalation", NAME, VERSION);

    // Load or create configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;
    info!("{} configuration loaded from {:?}", config.app_name, config_path);

    // Override with command line args
    match args.db {
        Some(path) => {
            config.database.enabled = true;
            config.database.path = path;
        }
        None => config.database.enabled = false,
    }
    if let Some(port) = args.ws_port {
        config.streaming.websocket_enabled = true;
        config.streaming.websocket_port = port;
    }

    let rt = tokio::runtime::Runtime::new()?;
    match args.command {
        Command::Demo {
            countdown_secs,
            deny_location,
        } => {
            config.lifecycle.countdown_secs = countdown_secs;
            rt.block_on(run_demo(config, deny_location))
        }
        Command::Simulate {
            duration,
            fall_after,
        } => rt.block_on(run_simulate(config, duration, fall_after)),
        Command::Serve => rt.block_on(run_serve(config)),
    }
}

/// Detection, countdown, escalation and hospital resolution in one process
async fn run_demo(config: Config, deny_location: bool) -> Result<()> {
    let mut engine = Engine::new(config).await?;
    engine.start().await?;

    let auth = engine.auth().clone();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let patient = auth.sign_up(
        "Asha Patient",
        &format!("patient-{}@safefall.local", &suffix[..8]),
        "demo-password",
        "demo-password",
        Role::Patient,
    )?;
    let hospital = auth.sign_up(
        "City Hospital",
        &format!("hospital-{}@safefall.local", &suffix[..8]),
        "demo-password",
        "demo-password",
        Role::Hospital,
    )?;
    info!("Signed in {} and {}", patient.name, hospital.name);

    let home = Coordinates::new(19.0760, 72.8777)?;
    let source = Arc::new(if deny_location {
        SimulatedLocationSource::denied(home)
    } else {
        SimulatedLocationSource::new(home)
    });
    let geo = GeolocationProvider::new(source);
    if let Err(e) = geo.request_permission().await {
        warn!("{}", e.user_message());
    }

    let mut notices = engine.bus().subscribe_notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice.level {
                NoticeLevel::Error => warn!("[notice] {}", notice.message),
                _ => info!("[notice] {}", notice.message),
            }
        }
    });

    let db = engine.db().clone();
    let mut emergencies = dashboard::hospital_emergencies_view(&db, &hospital)?;
    let mut inbox = dashboard::notifications_view(&db, &patient);

    let sensor = MotionSimulator::new("phone-motion", &engine.config.sensors);
    let mut readings = engine.bus().subscribe_readings();
    let feed = engine.start_feed(Box::new(sensor)).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!("Simulating a fall");
    feed.simulate_fall();

    let Some(impact) = next_fall(&mut readings).await else {
        anyhow::bail!("motion feed stopped before the fall was seen");
    };
    let fix = best_available(&geo, &engine.config.location, &mut thread_rng());
    info!(
        "Fall seen at {:.1} g, location {} ({})",
        impact.g_force(),
        fix.coordinates(),
        if fix.is_live() { "live" } else { "fallback" }
    );

    let handle = engine
        .lifecycle()
        .trigger(&patient, &impact, fix.coordinates())
        .await?;
    let event_id = handle.event_id();
    info!("Waiting {}s for the patient to respond", engine.config.lifecycle.countdown_secs);

    let outcome = handle.outcome().await;
    match &outcome {
        FallOutcome::Emergency { reason, .. } => info!("Escalated: {:?}", reason),
        other => anyhow::bail!("countdown ended without an emergency: {:?}", other),
    }

    let refresher = engine.lifecycle().follow_location(
        &patient,
        event_id,
        geo.subscribe(),
        engine.config.location.refresh_interval(),
    );

    let active = emergencies.wait_until(|rows| !rows.is_empty()).await?;
    for emergency in &active {
        info!(
            "Hospital sees {} ({}) since {}",
            emergency.patient_name,
            emergency.patient_email,
            dashboard::time_since(emergency.timestamp, chrono::Utc::now())
        );
    }

    engine.lifecycle().resolve_emergency(&hospital, event_id)?;
    emergencies.wait_until(|rows| rows.is_empty()).await?;
    refresher.stop();

    let notes = inbox
        .wait_until(|rows| rows.iter().any(|n| n.kind == NotificationType::Resolved))
        .await?;
    info!("Patient inbox: {}", dashboard::unread_summary(&notes));
    for note in &notes {
        info!("  [{}] {}: {}", note.kind.as_str(), note.title, note.message);
    }

    let history = db.fall_events_for_user(&patient, patient.user_id)?;
    let stats = FallStats::from_events(&history);
    info!(
        "History: {} falls, {} emergencies, {} false alarms",
        stats.total, stats.emergencies, stats.false_alarms
    );

    emergencies.close().await;
    inbox.close().await;
    engine.stop().await?;
    Ok(())
}

async fn run_simulate(config: Config, duration: u64, fall_after: Option<u64>) -> Result<()> {
    let mut engine = Engine::in_memory(config)?;
    engine.start().await?;

    let mut readings = engine.bus().subscribe_readings();
    let sensor = MotionSimulator::new("phone-motion", &engine.config.sensors);
    let feed = engine.start_feed(Box::new(sensor)).await?;

    let printer = tokio::spawn(async move {
        while let Ok(r) = readings.recv().await {
            info!(
                "#{:<5} accel ({:>7.2}, {:>7.2}, {:>7.2})  gyro ({:>8.2}, {:>8.2}, {:>8.2}){}",
                r.sequence,
                r.accelerometer.x,
                r.accelerometer.y,
                r.accelerometer.z,
                r.gyroscope.x,
                r.gyroscope.y,
                r.gyroscope.z,
                if r.simulated_fall { "  FALL" } else { "" }
            );
        }
    });

    match fall_after {
        Some(secs) if secs < duration => {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            feed.simulate_fall();
            tokio::time::sleep(Duration::from_secs(duration - secs)).await;
        }
        _ => tokio::time::sleep(Duration::from_secs(duration)).await,
    }

    let state = engine.state().await;
    engine.stop().await?;
    printer.abort();
    info!("{} readings in {}s", state.total_readings, state.uptime_seconds);
    Ok(())
}

async fn run_serve(mut config: Config) -> Result<()> {
    config.streaming.websocket_enabled = true;
    let mut engine = Engine::new(config.clone()).await?;
    engine.start().await?;

    let sensor = MotionSimulator::new("phone-motion", &engine.config.sensors);
    engine.start_feed(Box::new(sensor)).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut streaming = StreamingManager::new(config.streaming.clone());
    if let Some(addr) = streaming
        .start(engine.bus().clone(), engine.changes(), &shutdown_tx)
        .await?
    {
        info!("Streaming on ws://{}", addr);
    }

    info!("SafeFall running. Press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");
    let _ = shutdown_tx.send(());
    drop(streaming);
    engine.stop().await?;

    let state = engine.state().await;
    info!(
        "Served {} readings, {} falls, {} emergencies",
        state.total_readings, state.fall_events, state.emergencies
    );
    info!("SafeFall shutdown complete");
    Ok(())
}

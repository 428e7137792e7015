//! Autolearn - unattended course playback controls.
//!
//! This binary is the control surface for Autolearn. It reads and edits the
//! persisted session state the agents share, and can run the complete
//! coordinator/agent protocol against the built-in course simulator.
//!
//! # Commands
//!
//! - `autolearn status`: Show run state, progress, and settings
//! - `autolearn start` / `autolearn stop`: Set the persisted run flag
//! - `autolearn reset`: Clear progress and logs, keeping settings
//! - `autolearn speed <x>`: Set the playback speed
//! - `autolearn auto-next <bool>` / `autolearn loop <bool>`: Toggle settings
//! - `autolearn logs`: Show the run log
//! - `autolearn simulate`: Run the agents against the simulator
//!
//! # Environment Variables
//!
//! See the [`config`](autolearn_agent::config) module for available configuration options.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use autolearn_agent::config::Config;
use autolearn_agent::sim::{AutoplayPolicy, Simulation, SimulationConfig, SimulationReport};
use autolearn_coordinator::{
    FileStore, MemoryStore, SessionPatch, SessionStore, SettingsPatch, Store,
};

/// Autolearn - unattended course playback.
///
/// Controls the persisted session shared by the list and video agents,
/// and runs the whole protocol against a simulated course platform.
#[derive(Parser, Debug)]
#[command(name = "autolearn")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    AUTOLEARN_STORE_PATH     Session store file (default: ~/.autolearn/state.json)
    AUTOLEARN_TIME_UNIT_MS   Length of one time unit in ms (default: 1000)
    RUST_LOG                 Log filter (default: info)

EXAMPLES:
    # Show the current session
    autolearn status

    # Watch at double speed and stop after the last page
    autolearn speed 2
    autolearn loop false

    # Simulate 12 courses, 4 per page, 100x faster than real time
    autolearn simulate --courses 12 --page-size 4 --time-unit-ms 10
")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Show run state, progress, and settings.
    Status {
        /// Print machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Mark the run as started.
    ///
    /// Open course tabs pick the flag up on their next load.
    Start,

    /// Mark the run as stopped.
    Stop,

    /// Clear the run flag, counters, learned courses, and logs.
    ///
    /// Settings are kept.
    Reset,

    /// Set the playback speed.
    Speed {
        /// Playback rate, e.g. 1.5.
        #[arg(value_parser = parse_speed)]
        speed: f64,
    },

    /// Enable or disable moving on to the next course automatically.
    AutoNext {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Enable or disable starting over when every course is learned.
    Loop {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Show the run log, newest first.
    Logs {
        /// Number of entries to show.
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Run the coordinator and agents against the course simulator.
    Simulate {
        /// Number of courses in the catalogue.
        #[arg(long, default_value_t = 6)]
        courses: usize,

        /// Courses per list page.
        #[arg(long, default_value_t = 5)]
        page_size: usize,

        /// Video length in media seconds.
        #[arg(long, default_value_t = 30.0)]
        video_secs: f64,

        /// Refuse unmuted playback, forcing the muted-autoplay fallback.
        #[arg(long)]
        muted_only: bool,

        /// Start over after the last course instead of halting.
        #[arg(long)]
        loop_learning: bool,

        /// Length of one time unit in milliseconds [default: AUTOLEARN_TIME_UNIT_MS].
        #[arg(long)]
        time_unit_ms: Option<u64>,

        /// Give up after this many time units.
        #[arg(long, default_value_t = 5_000)]
        max_units: u64,

        /// Persist the simulated session to this file instead of memory.
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run(cli.command))
}

async fn run(command: Command) -> Result<()> {
    match command {
        Command::Simulate {
            courses,
            page_size,
            video_secs,
            muted_only,
            loop_learning,
            time_unit_ms,
            max_units,
            store,
        } => {
            let env_config = Config::from_env()
                .and_then(|c| c.with_time_unit_ms(time_unit_ms))
                .context("Failed to load configuration")?;
            let mut config = SimulationConfig::from_config(&env_config, courses, video_secs);
            config.page_size = page_size;
            config.policy = if muted_only {
                AutoplayPolicy::MutedOnly
            } else {
                AutoplayPolicy::Allowed
            };
            config.loop_learning = loop_learning;
            config.max_units = max_units;
            run_simulation(config, store).await
        }
        command => run_session_command(command).await,
    }
}

async fn run_simulation(config: SimulationConfig, store: Option<PathBuf>) -> Result<()> {
    let simulation = Simulation::new(config);
    let report = match store {
        Some(path) => simulation.run(Arc::new(FileStore::new(path))).await,
        None => simulation.run(Arc::new(MemoryStore::new())).await,
    }
    .context("Simulation failed")?;
    print_report(&report);
    Ok(())
}

/// Runs a command that edits the persisted session.
async fn run_session_command(command: Command) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    let session = SessionStore::new(Arc::new(FileStore::new(&config.store_path)));
    session
        .initialize_defaults()
        .await
        .with_context(|| format!("Failed to open store at {}", config.store_path.display()))?;

    match command {
        Command::Status { json } => show_status(&session, json).await,
        Command::Start => set_running(&session, true).await,
        Command::Stop => set_running(&session, false).await,
        Command::Reset => {
            session.reset().await.context("Failed to reset progress")?;
            session.append_log("Progress reset").await?;
            println!("Progress reset.");
            Ok(())
        }
        Command::Speed { speed } => {
            update_settings(
                &session,
                SettingsPatch {
                    video_speed: Some(speed),
                    ..SettingsPatch::default()
                },
                format!("Playback speed set to {speed}x"),
            )
            .await
        }
        Command::AutoNext { enabled } => {
            update_settings(
                &session,
                SettingsPatch {
                    auto_next: Some(enabled),
                    ..SettingsPatch::default()
                },
                format!("Auto-next {}", on_off(enabled)),
            )
            .await
        }
        Command::Loop { enabled } => {
            update_settings(
                &session,
                SettingsPatch {
                    loop_learning: Some(enabled),
                    ..SettingsPatch::default()
                },
                format!("Loop learning {}", on_off(enabled)),
            )
            .await
        }
        Command::Logs { limit } => {
            let logs = session.logs().await.context("Failed to read logs")?;
            if logs.is_empty() {
                println!("No log entries.");
            }
            for entry in logs.iter().rev().take(limit) {
                println!("[{}] {}", entry.time, entry.message);
            }
            Ok(())
        }
        Command::Simulate { .. } => anyhow::bail!("simulate does not use the session store"),
    }
}

async fn show_status<S: Store>(session: &SessionStore<S>, as_json: bool) -> Result<()> {
    let state = session
        .session_state()
        .await
        .context("Failed to read session state")?;
    let settings = session.settings().await.context("Failed to read settings")?;

    if as_json {
        let report = json!({ "session": state, "settings": settings });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Status:          {}", if state.is_running { "running" } else { "stopped" });
    println!("Current course:  {}", state.current_course);
    println!("Videos finished: {}", state.learned_count);
    println!("Courses learned: {}", state.learned_courses.len());
    if let Some(course) = &state.current_learning_course_id {
        println!("Pending course:  {course}");
    }
    println!();
    println!("Playback speed:  {}x", settings.video_speed);
    println!("Auto-next:       {}", on_off(settings.auto_next));
    println!("Loop learning:   {}", on_off(settings.loop_learning));
    Ok(())
}

async fn set_running<S: Store>(session: &SessionStore<S>, running: bool) -> Result<()> {
    session
        .apply(SessionPatch::new().running(running))
        .await
        .context("Failed to update run flag")?;
    let message = if running {
        "Automation started"
    } else {
        "Automation stopped"
    };
    session.append_log(message).await?;
    info!(running, "Run flag updated");
    println!("{message}.");
    Ok(())
}

async fn update_settings<S: Store>(
    session: &SessionStore<S>,
    patch: SettingsPatch,
    message: String,
) -> Result<()> {
    session
        .update_settings(patch)
        .await
        .context("Failed to update settings")?;
    session.append_log(message.clone()).await?;
    println!("{message}.");
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!();
    println!("Outcome:         {:?}", report.outcome);
    println!("Time units:      {}", report.units);
    println!("Courses done:    {}/{}", report.completed, report.total);
    println!("Videos finished: {}", report.learned_count);
    println!();
    println!("Last log entries:");
    for entry in report.logs.iter().rev().take(10).rev() {
        println!("  [{}] {}", entry.time, entry.message);
    }
}

fn parse_speed(val: &str) -> Result<f64, String> {
    let speed: f64 = val
        .parse()
        .map_err(|_| format!("expected a number, got '{val}'"))?;
    if !speed.is_finite() || speed <= 0.0 {
        return Err("speed must be greater than 0".to_string());
    }
    Ok(speed)
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Initializes the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise defaults to `info`.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .init();
    }
}

//! An in-process course platform for running the agents end to end.
//!
//! The simulator stands in for both the browser and the course site. It
//! implements the coordinator's [`Browser`](autolearn_coordinator::Browser)
//! capability and the agents' [`Page`](crate::page::Page) capability, so a
//! whole run (list selection, video tabs, completion, pagination, loop
//! restart) exercises the same code paths as a real deployment.
//!
//! # Modules
//!
//! - [`platform`]: Catalogue, page rendering, and the media clock
//! - [`browser`]: Tab lifecycle and notice delivery
//! - [`page`]: The page capability bound to one simulated tab
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use autolearn_agent::sim::{Simulation, SimulationConfig};
//! use autolearn_coordinator::MemoryStore;
//!
//! # async fn example() -> autolearn_agent::error::Result<()> {
//! let config = SimulationConfig::new(6, 30.0);
//! let report = Simulation::new(config).run(Arc::new(MemoryStore::new())).await?;
//! println!("{} of {} courses complete", report.completed, report.total);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod page;
pub mod platform;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{info, warn};

use autolearn_coordinator::{
    channel, Coordinator, CoordinatorConfig, CourseId, LogEntry, SessionStore, SettingsPatch,
    Store,
};

use crate::config::{AgentTimings, Config};
use crate::error::Result;

pub use browser::SimBrowser;
pub use page::{SimPage, View};
pub use platform::{AutoplayPolicy, SimCourse, SimPlatform};

/// Parameters of one simulated run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub courses: Vec<SimCourse>,
    pub page_size: usize,
    pub policy: AutoplayPolicy,
    pub loop_learning: bool,
    /// Playback speed to store before starting; `None` keeps the stored value.
    pub video_speed: Option<f64>,
    pub time_unit: Duration,
    /// Give up after this many time units.
    pub max_units: u64,
}

impl SimulationConfig {
    /// `count` unwatched courses of `video_secs` media seconds, five per page.
    #[must_use]
    pub fn new(count: usize, video_secs: f64) -> Self {
        Self {
            courses: SimPlatform::catalogue(count, video_secs),
            page_size: 5,
            policy: AutoplayPolicy::default(),
            loop_learning: false,
            video_speed: None,
            time_unit: Duration::from_secs(1),
            max_units: 3_600,
        }
    }

    /// Like [`SimulationConfig::new`], running on the configured time unit.
    #[must_use]
    pub fn from_config(config: &Config, count: usize, video_secs: f64) -> Self {
        Self {
            time_unit: config.time_unit,
            ..Self::new(count, video_secs)
        }
    }
}

/// How a simulated run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationOutcome {
    /// The list agent ran out of courses and stopped the run.
    Halted,
    /// Every course reached full progress while loop mode kept the run going.
    AllComplete,
    /// `max_units` elapsed first.
    TimedOut,
}

/// Summary of a simulated run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub outcome: SimulationOutcome,
    pub units: u64,
    pub completed: usize,
    pub total: usize,
    pub learned_count: u64,
    /// Persisted learned set, in completion order.
    pub learned_courses: Vec<CourseId>,
    pub logs: Vec<LogEntry>,
}

/// One simulated run.
pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    #[must_use]
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    /// Runs the coordinator and agents against the simulated platform.
    ///
    /// Session state is written to `store`, so a file store leaves the run
    /// inspectable afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written, or if the
    /// coordinator stops answering.
    pub async fn run<S: Store>(self, store: Arc<S>) -> Result<SimulationReport> {
        let config = self.config;
        let unit = config.time_unit;
        let total = config.courses.len();

        let session = SessionStore::new(Arc::clone(&store));
        session.initialize_defaults().await?;
        session
            .update_settings(SettingsPatch {
                video_speed: config.video_speed,
                loop_learning: Some(config.loop_learning),
                ..SettingsPatch::default()
            })
            .await?;

        let coordinator_config = CoordinatorConfig::from_unit(unit);
        let (handle, inbox) = channel(coordinator_config.inbox_capacity);
        let platform = Arc::new(Mutex::new(SimPlatform::new(
            config.courses,
            config.page_size,
            config.policy,
            unit,
        )));
        let browser = SimBrowser::new(
            handle.clone(),
            Arc::clone(&platform),
            AgentTimings::from_unit(unit),
        );
        let coordinator = Coordinator::new(
            Arc::clone(&store),
            Arc::clone(&browser),
            coordinator_config,
            inbox,
        )
        .spawn();

        info!(
            courses = total,
            page_size = config.page_size,
            policy = ?config.policy,
            loop_learning = config.loop_learning,
            "Simulation started"
        );
        let control = handle.control();
        control.set_running(true).await?;
        browser.open_tab(View::list());

        let started = Instant::now();
        let mut ticker = interval(unit);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let outcome = loop {
            ticker.tick().await;
            let units = elapsed_units(started, unit);

            if !session.is_running().await? {
                break SimulationOutcome::Halted;
            }
            if config.loop_learning && platform.lock().all_complete() {
                break SimulationOutcome::AllComplete;
            }
            if units >= config.max_units {
                warn!(units, "Simulation timed out");
                break SimulationOutcome::TimedOut;
            }
        };

        if outcome != SimulationOutcome::Halted {
            control.set_running(false).await?;
        }
        browser.shutdown();
        coordinator.abort();

        let state = session.session_state().await?;
        let completed = platform.lock().completed();
        let report = SimulationReport {
            outcome,
            units: elapsed_units(started, unit),
            completed,
            total,
            learned_count: state.learned_count,
            learned_courses: state.learned_courses,
            logs: state.logs,
        };
        info!(
            outcome = ?report.outcome,
            units = report.units,
            completed = report.completed,
            total = report.total,
            learned_count = report.learned_count,
            "Simulation finished"
        );
        Ok(report)
    }
}

fn elapsed_units(started: Instant, unit: Duration) -> u64 {
    (started.elapsed().as_secs_f64() / unit.as_secs_f64()) as u64
}

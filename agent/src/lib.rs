//! Autolearn Agent - page-side course automation.
//!
//! This crate is the page half of Autolearn. A page context runs in every
//! course-platform tab; depending on what the tab shows, it acts as the list
//! agent (picks the next unfinished course and opens it in a new tab) or as
//! the video agent (starts playback, watches for completion, and reports it).
//! All arbitration between tabs goes through the coordinator crate.
//!
//! # Overview
//!
//! Agents never touch markup directly. They work on immutable
//! [`DocumentSnapshot`](dom::DocumentSnapshot)s obtained from a
//! [`Page`](page::Page) capability, and ask a
//! [`PageClassifier`](classifier::PageClassifier) and a
//! [`CompletionDetector`](detector::CompletionDetector) what the snapshot
//! means. The [`sim`] module provides all three for an in-process course
//! platform.
//!
//! # Modules
//!
//! - [`dom`]: Document snapshots and CSS-like selectors
//! - [`page`]: The page capability trait
//! - [`classifier`]: Page classification and card extraction
//! - [`detector`]: Video completion detection
//! - [`context`]: The per-tab runtime that drives both agents
//! - [`list`]: Course selection, pagination, and loop restart
//! - [`video`]: Playback start and completion handling
//! - [`sim`]: Simulated course platform and browser
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for agent operations

pub mod classifier;
pub mod config;
pub mod context;
pub mod detector;
pub mod dom;
pub mod error;
pub mod list;
pub mod page;
pub mod sim;
pub mod video;

#[cfg(test)]
mod testing;

pub use classifier::{CourseCard, PageClassifier, PageKind, PlatformClassifier};
pub use config::{AgentTimings, Config, ConfigError};
pub use context::{Capabilities, PageContext, RunFlag};
pub use detector::{CompletionDetector, CompletionSignals, PlayerCompletionDetector};
pub use dom::{DocumentSnapshot, ElementId, MediaState, Node, Selector};
pub use error::{AgentError, PageError, Result};
pub use list::{select_course, ListAgent, ListOutcome};
pub use page::{ClickStyle, Page};
pub use sim::{Simulation, SimulationConfig, SimulationOutcome, SimulationReport};
pub use video::{PlaybackStart, VideoAgent, VideoState};

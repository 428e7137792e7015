//! Autolearn Coordinator - tab arbitration for unattended course playback.
//!
//! This crate is the background half of Autolearn. It decides which browser
//! tab acts as the course-list agent and which acts as the video agent,
//! keeps at most one video agent active, relays resume signals between them,
//! and owns all writes to the persisted session state.
//!
//! # Modules
//!
//! - [`types`]: Identifiers, phase, session model, and message enums
//! - [`store`]: Asynchronous key-value store abstraction and implementations
//! - [`session`]: Typed session-state operations over a store
//! - [`browser`]: Tab control capability used by the coordinator
//! - [`coordinator`]: The coordinator actor and its arbitration state
//! - [`client`]: Handles and typed clients for talking to the coordinator
//! - [`config`]: Coordinator timing configuration
//! - [`error`]: Transport error type

pub mod browser;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod session;
pub mod store;
pub mod types;

pub use browser::Browser;
#[cfg(any(test, feature = "test-support"))]
pub use browser::RecordingBrowser;
pub use client::{CoordinatorClient, CoordinatorHandle};
pub use config::CoordinatorConfig;
pub use coordinator::{channel, ClosedTab, Coordinator, CoordinatorState, Inbox};
pub use error::TransportError;
pub use session::SessionStore;
pub use store::{FileStore, MemoryStore, Store, StoreError};
pub use types::{
    CompletionRecord, CourseId, LogEntry, Notice, Phase, PhaseStatus, Request, Response,
    SessionPatch, SessionState, Settings, SettingsPatch, TabId,
};

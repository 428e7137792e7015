//! Shared vocabulary for the coordinator and the page agents.
//!
//! This module defines the identifiers, the session phase, the persisted
//! session model, and the message enums exchanged between page contexts and
//! the coordinator. Every wire-facing type serializes to camelCase JSON with
//! an `action` tag, matching the message names page scripts use.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Default playback speed applied to course videos.
pub const DEFAULT_VIDEO_SPEED: f64 = 1.5;

/// Placeholder shown as the current course when nothing is playing.
pub const DEFAULT_CURRENT_COURSE: &str = "none";

/// Maximum number of persisted log entries; the oldest are evicted first.
pub const MAX_LOG_ENTRIES: usize = 50;

/// Opaque handle to a browser tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// Best-effort de-duplication key for a course listing.
///
/// Derived from a card's link target or thumbnail address. Two different
/// courses may collide; a collision only means a course gets learned again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(String);

impl CourseId {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session phase tracked by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// No video agent is registered; a list agent may open the next course.
    #[default]
    Idle,
    /// Exactly one video agent is registered and playing a course.
    Learning,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Learning => f.write_str("learning"),
        }
    }
}

/// A single persisted run log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock time, formatted `HH:MM:SS`.
    pub time: String,
    /// Human-readable message.
    pub message: String,
}

/// User-editable settings plus the learned set, as returned by `getSettings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub video_speed: f64,
    pub auto_next: bool,
    pub loop_learning: bool,
    pub learned_courses: Vec<CourseId>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            video_speed: DEFAULT_VIDEO_SPEED,
            auto_next: true,
            loop_learning: true,
            learned_courses: Vec::new(),
        }
    }
}

/// The persisted session state, as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub is_running: bool,
    pub learned_count: u64,
    pub current_course: String,
    pub learned_courses: Vec<CourseId>,
    pub current_learning_course_id: Option<CourseId>,
    pub logs: Vec<LogEntry>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            is_running: false,
            learned_count: 0,
            current_course: DEFAULT_CURRENT_COURSE.to_string(),
            learned_courses: Vec::new(),
            current_learning_course_id: None,
            logs: Vec::new(),
        }
    }
}

/// A partial update of session fields. Only fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_course: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_courses: Option<Vec<CourseId>>,

    /// `Some(None)` clears the field; `None` leaves it untouched.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "double_option"
    )]
    pub current_learning_course_id: Option<Option<CourseId>>,
}

impl SessionPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn running(mut self, running: bool) -> Self {
        self.is_running = Some(running);
        self
    }

    #[must_use]
    pub fn current_course(mut self, title: impl Into<String>) -> Self {
        self.current_course = Some(title.into());
        self
    }

    #[must_use]
    pub fn learned_courses(mut self, courses: Vec<CourseId>) -> Self {
        self.learned_courses = Some(courses);
        self
    }

    #[must_use]
    pub fn learning_course(mut self, course: Option<CourseId>) -> Self {
        self.current_learning_course_id = Some(course);
        self
    }

    /// Returns true if the patch would not write anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_running.is_none()
            && self.learned_count.is_none()
            && self.current_course.is_none()
            && self.learned_courses.is_none()
            && self.current_learning_course_id.is_none()
    }
}

/// A partial update of user settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_speed: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_next: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loop_learning: Option<bool>,
}

/// Answer to `queryPhase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseStatus {
    pub phase: Phase,
    pub video_agent_id: Option<TabId>,
}

/// Outcome of recording a finished video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    /// Learned count after the increment.
    pub learned_count: u64,
    /// Course appended to the learned set, if one was pending and new.
    pub course_id: Option<CourseId>,
}

/// Requests a page context (or a control surface) sends to the coordinator.
///
/// The sender's tab identity travels alongside the request rather than
/// inside it, the same way a browser runtime attaches the sender tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    RegisterListAgent,
    RegisterVideoAgent,
    QueryPhase,
    CloseVideoTab,
    UpdateSessionField { data: SessionPatch },
    AppendLog { message: String },
    GetSettings,
    UpdatePlaybackSpeed { speed: f64 },
    GetSessionState,
    RecordCompletion,
    SetRunning { running: bool },
    ResetProgress,
    UpdateSettings { settings: SettingsPatch },
}

impl Request {
    /// Wire name of the request, used in log fields.
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::RegisterListAgent => "registerListAgent",
            Self::RegisterVideoAgent => "registerVideoAgent",
            Self::QueryPhase => "queryPhase",
            Self::CloseVideoTab => "closeVideoTab",
            Self::UpdateSessionField { .. } => "updateSessionField",
            Self::AppendLog { .. } => "appendLog",
            Self::GetSettings => "getSettings",
            Self::UpdatePlaybackSpeed { .. } => "updatePlaybackSpeed",
            Self::GetSessionState => "getSessionState",
            Self::RecordCompletion => "recordCompletion",
            Self::SetRunning { .. } => "setRunning",
            Self::ResetProgress => "resetProgress",
            Self::UpdateSettings { .. } => "updateSettings",
        }
    }
}

/// Coordinator replies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// Reply to `registerListAgent`.
    ListRegistered {
        success: bool,
        #[serde(rename = "currentPhase")]
        current_phase: Phase,
    },
    Phase(PhaseStatus),
    Settings(Settings),
    Session(SessionState),
    Completion(CompletionRecord),
    Ack { success: bool },
    /// The request was understood but the store refused it.
    Failed { success: bool, error: String },
}

impl Response {
    #[must_use]
    pub fn ok() -> Self {
        Self::Ack { success: true }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            success: false,
            error: error.into(),
        }
    }
}

/// Notifications delivered to page contexts. None of them expect a reply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum Notice {
    #[serde(rename = "start")]
    Start,
    #[serde(rename = "stop")]
    Stop,
    /// The video tab is gone; the list agent may pick the next course.
    #[serde(rename = "resume-next-course")]
    ResumeNextCourse,
    /// A tab finished loading while the run flag was set.
    #[serde(rename = "resume-if-running")]
    ResumeIfRunning,
    #[serde(rename = "updateSpeed")]
    UpdateSpeed { speed: f64 },
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

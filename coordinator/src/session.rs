//! Typed session-state layer over a [`Store`].
//!
//! [`SessionStore`] turns the flat key namespace into the session model:
//! run flag, learned counters, learned-course set, the course being learned,
//! user settings, and the capped run log.
//!
//! Multi-key operations such as [`SessionStore::record_completion`] are
//! read-modify-write sequences. They are only free of lost updates while a
//! single writer owns the store, which is why the coordinator is the one
//! component that calls them during a run.
//!
//! Malformed persisted values never fail a read: they fall back to their
//! defaults with a warning, so a damaged key cannot wedge the run.

use std::sync::Arc;

use chrono::Local;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::store::{keys, Store, StoreError};
use crate::types::{
    CompletionRecord, CourseId, LogEntry, SessionPatch, SessionState, Settings, SettingsPatch,
    DEFAULT_CURRENT_COURSE, DEFAULT_VIDEO_SPEED, MAX_LOG_ENTRIES,
};

/// Session-state view over a shared store.
#[derive(Debug)]
pub struct SessionStore<S> {
    store: Arc<S>,
}

impl<S> Clone for SessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: Store> SessionStore<S> {
    /// Wraps a store.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fills every missing key with its default, preserving existing values.
    ///
    /// Called once when the coordinator first starts against a store.
    pub async fn initialize_defaults(&self) -> Result<(), StoreError> {
        let existing = self.store.get(&keys::ALL).await?;

        let defaults = [
            (keys::IS_RUNNING, json!(false)),
            (keys::LEARNED_COUNT, json!(0)),
            (keys::CURRENT_COURSE, json!(DEFAULT_CURRENT_COURSE)),
            (keys::VIDEO_SPEED, json!(DEFAULT_VIDEO_SPEED.to_string())),
            (keys::AUTO_NEXT, json!(true)),
            (keys::LOOP_LEARNING, json!(true)),
            (keys::LEARNED_COURSES, json!([])),
            (keys::LOGS, json!([])),
        ];

        let missing: Map<String, Value> = defaults
            .into_iter()
            .filter(|(key, _)| !existing.contains_key(*key))
            .map(|(key, value)| (key.to_string(), value))
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        debug!(keys = missing.len(), "Writing default session values");
        self.store.set(missing).await
    }

    /// Reads the whole persisted session state.
    pub async fn session_state(&self) -> Result<SessionState, StoreError> {
        let values = self.store.get(&keys::ALL).await?;
        let defaults = SessionState::default();

        Ok(SessionState {
            is_running: read_or(&values, keys::IS_RUNNING, defaults.is_running),
            learned_count: read_or(&values, keys::LEARNED_COUNT, defaults.learned_count),
            current_course: read_or(&values, keys::CURRENT_COURSE, defaults.current_course),
            learned_courses: read_or(&values, keys::LEARNED_COURSES, defaults.learned_courses),
            current_learning_course_id: read_or(
                &values,
                keys::CURRENT_LEARNING_COURSE_ID,
                defaults.current_learning_course_id,
            ),
            logs: read_or(&values, keys::LOGS, defaults.logs),
        })
    }

    /// Returns the persisted run flag.
    pub async fn is_running(&self) -> Result<bool, StoreError> {
        let values = self.store.get(&[keys::IS_RUNNING]).await?;
        Ok(read_or(&values, keys::IS_RUNNING, false))
    }

    /// Reads user settings together with the learned-course set.
    pub async fn settings(&self) -> Result<Settings, StoreError> {
        let values = self
            .store
            .get(&[
                keys::VIDEO_SPEED,
                keys::AUTO_NEXT,
                keys::LOOP_LEARNING,
                keys::LEARNED_COURSES,
            ])
            .await?;
        let defaults = Settings::default();

        Ok(Settings {
            video_speed: read_speed(&values),
            auto_next: read_or(&values, keys::AUTO_NEXT, defaults.auto_next),
            loop_learning: read_or(&values, keys::LOOP_LEARNING, defaults.loop_learning),
            learned_courses: read_or(&values, keys::LEARNED_COURSES, defaults.learned_courses),
        })
    }

    /// Returns the persisted run log, oldest first.
    pub async fn logs(&self) -> Result<Vec<LogEntry>, StoreError> {
        let values = self.store.get(&[keys::LOGS]).await?;
        Ok(read_or(&values, keys::LOGS, Vec::new()))
    }

    /// Writes the fields present in `patch`.
    pub async fn apply(&self, patch: SessionPatch) -> Result<(), StoreError> {
        let mut entries = Map::new();

        if let Some(running) = patch.is_running {
            entries.insert(keys::IS_RUNNING.to_string(), json!(running));
        }
        if let Some(count) = patch.learned_count {
            entries.insert(keys::LEARNED_COUNT.to_string(), json!(count));
        }
        if let Some(title) = patch.current_course {
            entries.insert(keys::CURRENT_COURSE.to_string(), json!(title));
        }
        if let Some(courses) = patch.learned_courses {
            entries.insert(keys::LEARNED_COURSES.to_string(), serde_json::to_value(courses)?);
        }
        if let Some(course) = patch.current_learning_course_id {
            entries.insert(
                keys::CURRENT_LEARNING_COURSE_ID.to_string(),
                serde_json::to_value(course)?,
            );
        }

        if entries.is_empty() {
            return Ok(());
        }
        self.store.set(entries).await
    }

    /// Writes the settings present in `patch`. The speed is stored string-encoded.
    pub async fn update_settings(&self, patch: SettingsPatch) -> Result<(), StoreError> {
        let mut entries = Map::new();

        if let Some(speed) = patch.video_speed {
            entries.insert(keys::VIDEO_SPEED.to_string(), json!(speed.to_string()));
        }
        if let Some(auto_next) = patch.auto_next {
            entries.insert(keys::AUTO_NEXT.to_string(), json!(auto_next));
        }
        if let Some(loop_learning) = patch.loop_learning {
            entries.insert(keys::LOOP_LEARNING.to_string(), json!(loop_learning));
        }

        if entries.is_empty() {
            return Ok(());
        }
        self.store.set(entries).await
    }

    /// Appends a timestamped log line, evicting the oldest beyond [`MAX_LOG_ENTRIES`].
    pub async fn append_log(&self, message: impl Into<String>) -> Result<(), StoreError> {
        let entry = LogEntry {
            time: Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
        };
        self.push_log(entry).await
    }

    /// Appends a pre-built entry, applying the same cap as [`Self::append_log`].
    pub async fn push_log(&self, entry: LogEntry) -> Result<(), StoreError> {
        let mut logs = self.logs().await?;
        logs.push(entry);
        if logs.len() > MAX_LOG_ENTRIES {
            let excess = logs.len() - MAX_LOG_ENTRIES;
            logs.drain(..excess);
        }

        let mut entries = Map::new();
        entries.insert(keys::LOGS.to_string(), serde_json::to_value(logs)?);
        self.store.set(entries).await
    }

    /// Records a finished video.
    ///
    /// Increments the learned count, appends the pending course to the learned
    /// set when it is known and not yet present, and clears the pending course.
    /// All three keys are written in one `set`.
    pub async fn record_completion(&self) -> Result<CompletionRecord, StoreError> {
        let values = self
            .store
            .get(&[
                keys::LEARNED_COUNT,
                keys::LEARNED_COURSES,
                keys::CURRENT_LEARNING_COURSE_ID,
            ])
            .await?;

        let learned_count = read_or::<u64>(&values, keys::LEARNED_COUNT, 0) + 1;
        let mut learned: Vec<CourseId> = read_or(&values, keys::LEARNED_COURSES, Vec::new());
        let pending: Option<CourseId> =
            read_or(&values, keys::CURRENT_LEARNING_COURSE_ID, None);

        let recorded = match pending {
            Some(course) if !learned.contains(&course) => {
                learned.push(course.clone());
                Some(course)
            }
            _ => None,
        };

        let mut entries = Map::new();
        entries.insert(keys::LEARNED_COUNT.to_string(), json!(learned_count));
        entries.insert(keys::LEARNED_COURSES.to_string(), serde_json::to_value(&learned)?);
        entries.insert(keys::CURRENT_LEARNING_COURSE_ID.to_string(), Value::Null);
        self.store.set(entries).await?;

        Ok(CompletionRecord {
            learned_count,
            course_id: recorded,
        })
    }

    /// Clears progress: run flag, counters, learned set, pending course, and logs.
    ///
    /// Settings are left untouched.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let mut entries = Map::new();
        entries.insert(keys::IS_RUNNING.to_string(), json!(false));
        entries.insert(keys::LEARNED_COUNT.to_string(), json!(0));
        entries.insert(keys::CURRENT_COURSE.to_string(), json!(DEFAULT_CURRENT_COURSE));
        entries.insert(keys::LEARNED_COURSES.to_string(), json!([]));
        entries.insert(keys::CURRENT_LEARNING_COURSE_ID.to_string(), Value::Null);
        entries.insert(keys::LOGS.to_string(), json!([]));
        self.store.set(entries).await
    }
}

fn read_or<T: DeserializeOwned>(values: &Map<String, Value>, key: &str, default: T) -> T {
    match values.get(key) {
        None => default,
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(key, error = %e, "Malformed stored value, using default");
                default
            }
        },
    }
}

/// Reads `videoSpeed`, accepting either the string encoding or a bare number.
fn read_speed(values: &Map<String, Value>) -> f64 {
    let parsed = match values.get(keys::VIDEO_SPEED) {
        None => return DEFAULT_VIDEO_SPEED,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    };

    match parsed {
        Some(speed) if speed.is_finite() && speed > 0.0 => speed,
        _ => {
            warn!("Malformed videoSpeed, using default");
            DEFAULT_VIDEO_SPEED
        }
    }
}

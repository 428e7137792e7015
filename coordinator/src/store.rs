//! Persistent key-value store abstraction.
//!
//! The store is a flat namespace of JSON values that survives process
//! restarts. A single [`Store::set`] call is atomic; nothing spans multiple
//! calls, and no locking primitive is exposed to callers.
//!
//! Two implementations are provided:
//!
//! - [`MemoryStore`] - an in-process map, used by tests and the simulator
//! - [`FileStore`] - a JSON object on disk, rewritten through a temp file
//!   and a rename so each `set` lands in full or not at all
//!
//! # Example
//!
//! ```
//! use autolearn_coordinator::store::{keys, MemoryStore, Store};
//! use serde_json::{json, Map};
//!
//! # tokio_test_block_on(async {
//! let store = MemoryStore::new();
//! let mut entries = Map::new();
//! entries.insert(keys::IS_RUNNING.to_string(), json!(true));
//! store.set(entries).await.unwrap();
//!
//! let values = store.get(&[keys::IS_RUNNING]).await.unwrap();
//! assert_eq!(values[keys::IS_RUNNING], json!(true));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Flat key names used in the persistent store.
pub mod keys {
    pub const IS_RUNNING: &str = "isRunning";
    pub const LEARNED_COUNT: &str = "learnedCount";
    pub const CURRENT_COURSE: &str = "currentCourse";
    pub const VIDEO_SPEED: &str = "videoSpeed";
    pub const AUTO_NEXT: &str = "autoNext";
    pub const LOOP_LEARNING: &str = "loopLearning";
    pub const LEARNED_COURSES: &str = "learnedCourses";
    pub const CURRENT_LEARNING_COURSE_ID: &str = "currentLearningCourseId";
    pub const LOGS: &str = "logs";

    /// Every key owned by the session layer.
    pub const ALL: [&str; 9] = [
        IS_RUNNING,
        LEARNED_COUNT,
        CURRENT_COURSE,
        VIDEO_SPEED,
        AUTO_NEXT,
        LOOP_LEARNING,
        LEARNED_COURSES,
        CURRENT_LEARNING_COURSE_ID,
        LOGS,
    ];
}

/// Errors that can occur while reading or writing the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value has the wrong shape.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Asynchronous key-value store with per-call atomic writes.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Reads the given keys. Keys that are absent are omitted from the result.
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError>;

    /// Writes all entries in one atomic step.
    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError>;
}

/// In-memory store backed by a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored entry.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.lock().clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let values = self.values.lock();
        Ok(pick(&values, keys))
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError> {
        self.values.lock().extend(entries);
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// Writes are serialized through an async mutex and land via
/// write-to-temp-then-rename. A missing or empty file reads as an empty store.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Creates a store backed by the file at `path`. The file is created lazily.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::InvalidValue {
                key: self.path.display().to_string(),
                message: format!("expected a JSON object, found {}", json_kind(&other)),
            }),
        }
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>, StoreError> {
        let values = self.read_all().await?;
        Ok(pick(&values, keys))
    }

    async fn set(&self, entries: Map<String, Value>) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut values = self.read_all().await?;
        values.extend(entries);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_vec_pretty(&Value::Object(values))?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, body).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        debug!(path = %self.path.display(), "Store file written");
        Ok(())
    }
}

fn pick(values: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    keys.iter()
        .filter_map(|key| values.get(*key).map(|v| ((*key).to_string(), v.clone())))
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

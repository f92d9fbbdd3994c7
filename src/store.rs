//! The document-store seam: CRUD over tasks, queried by owner only.
//!
//! Status filtering and ordering are not the store's job; they happen in
//! `view` after `list` returns, so the store never needs compound indexes.

use crate::models::{NewTask, Task, TaskPatch};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task `{0}` not found")]
    NotFound(String),
    #[error("storage backend: {0}")]
    Backend(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait TaskStore: Send + Sync {
    /// Assign owner, id and both timestamps (equal at creation), then persist.
    fn create(&self, task: NewTask, owner: &str) -> StoreResult<Task>;

    /// Every task owned by `owner`, in no particular order.
    fn list(&self, owner: &str) -> StoreResult<Vec<Task>>;

    fn get(&self, id: &str) -> StoreResult<Option<Task>>;

    /// Merge `patch` into the stored task and move `updated_at` forward.
    fn update(&self, id: &str, patch: &TaskPatch) -> StoreResult<Task>;

    /// Permanent removal. Returns false if nothing was stored under `id`.
    fn delete(&self, id: &str) -> StoreResult<bool>;
}

// ── Clock ──────────────────────────────────────────────────────

/// Millisecond clock that never hands out the same instant twice, so
/// an update issued right after a create still gets a later `updated_at`.
#[derive(Debug, Default)]
pub struct Clock {
    last_ms: AtomicI64,
}

impl Clock {
    pub fn new() -> Self {
        Clock::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.issue(Utc::now().timestamp_millis())
    }

    /// A fresh instant strictly later than `floor`.
    pub fn after(&self, floor: DateTime<Utc>) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_millis();
        self.issue(wall.max(floor.timestamp_millis() + 1))
    }

    fn issue(&self, candidate: i64) -> DateTime<Utc> {
        let previous = self
            .last_ms
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(candidate.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        let issued = candidate.max(previous + 1);
        DateTime::from_timestamp_millis(issued).unwrap_or_else(Utc::now)
    }
}

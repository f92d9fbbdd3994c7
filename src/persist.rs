//! Tasks and user accounts ↔ redb.
//!
//! Records are postcard-encoded. Timestamps are stored as unix
//! milliseconds and due dates as days since the unix epoch; both are
//! converted back to chrono types on every read.

use crate::models::{NewTask, Task, TaskPatch, TaskStatus};
use crate::store::{Clock, StoreError, StoreResult, TaskStore};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use redb::{Database, MultimapTableDefinition, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use uuid::Uuid;

const TASKS: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");
const TASKS_BY_OWNER: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("tasks_by_owner");
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
const USERS_BY_EMAIL: TableDefinition<&str, &str> = TableDefinition::new("users_by_email");

// ── Stored records ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTask {
    user_id: String,
    title: String,
    description: String,
    status: u8,
    /// Days since 1970-01-01.
    due_date: Option<i32>,
    created_at_ms: i64,
    updated_at_ms: i64,
}

impl StoredTask {
    fn from_task(task: &Task) -> Self {
        StoredTask {
            user_id: task.user_id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status as u8,
            due_date: task.due_date.map(days_since_epoch),
            created_at_ms: task.created_at.timestamp_millis(),
            updated_at_ms: task.updated_at.timestamp_millis(),
        }
    }

    fn into_task(self, id: &str) -> StoreResult<Task> {
        let status = TaskStatus::from_u8(self.status)
            .ok_or_else(|| StoreError::Decode(format!("task {id}: status byte {}", self.status)))?;
        let due_date = match self.due_date {
            Some(days) => Some(date_from_days(days).ok_or_else(|| {
                StoreError::Decode(format!("task {id}: due date {days} out of range"))
            })?),
            None => None,
        };
        Ok(Task {
            id: id.to_string(),
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            status,
            due_date,
            created_at: timestamp(self.created_at_ms, id)?,
            updated_at: timestamp(self.updated_at_ms, id)?,
        })
    }
}

/// A user account as kept by `LocalIdentity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub password_hash: String,
    pub email_verified: bool,
    pub created_at_ms: i64,
}

fn epoch() -> NaiveDate {
    DateTime::<Utc>::UNIX_EPOCH.date_naive()
}

fn days_since_epoch(date: NaiveDate) -> i32 {
    let days = date.signed_duration_since(epoch()).num_days();
    i32::try_from(days).unwrap_or(if days < 0 { i32::MIN } else { i32::MAX })
}

fn date_from_days(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(Duration::days(i64::from(days)))
}

fn timestamp(ms: i64, id: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Decode(format!("task {id}: timestamp {ms} out of range")))
}

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    postcard::to_allocvec(value).map_err(|e| StoreError::Encode(e.to_string()))
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> StoreResult<T> {
    postcard::from_bytes(bytes).map_err(|e| StoreError::Decode(e.to_string()))
}

// ── Save file ──────────────────────────────────────────────────

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct SaveFile {
    db: Arc<Database>,
    clock: Arc<Clock>,
}

impl SaveFile {
    /// Open (or create) the save file at the given path.
    /// Creates tables if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(TASKS)?;
            let _ = txn.open_multimap_table(TASKS_BY_OWNER)?;
            let _ = txn.open_table(USERS)?;
            let _ = txn.open_table(USERS_BY_EMAIL)?;
        }
        txn.commit()?;

        Ok(SaveFile {
            db: Arc::new(db),
            clock: Arc::new(Clock::new()),
        })
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    // USERS

    /// Insert a new account. Returns false (and writes nothing) if the
    /// email is already taken.
    pub fn create_user(&self, user: &UserRecord) -> StoreResult<bool> {
        let txn = self.db.begin_write()?;
        {
            let mut by_email = txn.open_table(USERS_BY_EMAIL)?;
            if by_email.get(user.email.as_str())?.is_some() {
                return Ok(false);
            }
            let mut users = txn.open_table(USERS)?;
            let bytes = encode(user)?;
            users.insert(user.uid.as_str(), bytes.as_slice())?;
            by_email.insert(user.email.as_str(), user.uid.as_str())?;
        }
        txn.commit()?;
        Ok(true)
    }

    pub fn get_user(&self, uid: &str) -> StoreResult<Option<UserRecord>> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS)?;
        match users.get(uid)? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRecord>> {
        let txn = self.db.begin_read()?;
        let by_email = txn.open_table(USERS_BY_EMAIL)?;
        let Some(uid) = by_email.get(email)? else {
            return Ok(None);
        };
        let users = txn.open_table(USERS)?;
        match users.get(uid.value())? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// Remove the account and its email index entry. Tasks are left alone.
    pub fn delete_user(&self, uid: &str) -> StoreResult<bool> {
        let Some(user) = self.get_user(uid)? else {
            return Ok(false);
        };
        let txn = self.db.begin_write()?;
        let deleted;
        {
            let mut by_email = txn.open_table(USERS_BY_EMAIL)?;
            by_email.remove(user.email.as_str())?;
            let mut users = txn.open_table(USERS)?;
            deleted = users.remove(uid)?.is_some();
        }
        txn.commit()?;
        Ok(deleted)
    }
}

impl TaskStore for SaveFile {
    fn create(&self, task: NewTask, owner: &str) -> StoreResult<Task> {
        let now = self.clock.now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            user_id: owner.to_string(),
            title: task.title,
            description: task.description,
            status: task.status,
            due_date: Some(task.due_date),
            created_at: now,
            updated_at: now,
        };

        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let mut by_owner = txn.open_multimap_table(TASKS_BY_OWNER)?;
            let bytes = encode(&StoredTask::from_task(&task))?;
            tasks.insert(task.id.as_str(), bytes.as_slice())?;
            by_owner.insert(owner, task.id.as_str())?;
        }
        txn.commit()?;
        Ok(task)
    }

    fn list(&self, owner: &str) -> StoreResult<Vec<Task>> {
        let txn = self.db.begin_read()?;
        let by_owner = txn.open_multimap_table(TASKS_BY_OWNER)?;
        let tasks = txn.open_table(TASKS)?;

        let mut out = Vec::new();
        for entry in by_owner.get(owner)? {
            let id = entry?;
            let id = id.value();
            // The index and the table are written in one transaction,
            // so a dangling id means the file was edited by hand.
            if let Some(data) = tasks.get(id)? {
                let stored: StoredTask = decode(data.value())?;
                out.push(stored.into_task(id)?);
            }
        }
        Ok(out)
    }

    fn get(&self, id: &str) -> StoreResult<Option<Task>> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS)?;
        match tasks.get(id)? {
            Some(data) => {
                let stored: StoredTask = decode(data.value())?;
                Ok(Some(stored.into_task(id)?))
            }
            None => Ok(None),
        }
    }

    fn update(&self, id: &str, patch: &TaskPatch) -> StoreResult<Task> {
        let txn = self.db.begin_write()?;
        let task = {
            let mut tasks = txn.open_table(TASKS)?;
            let stored: StoredTask = match tasks.get(id)? {
                Some(data) => decode(data.value())?,
                None => return Err(StoreError::NotFound(id.to_string())),
            };
            let mut task = stored.into_task(id)?;
            task.apply(patch);
            task.updated_at = self.clock.after(task.updated_at);

            let bytes = encode(&StoredTask::from_task(&task))?;
            tasks.insert(id, bytes.as_slice())?;
            task
        };
        txn.commit()?;
        Ok(task)
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS)?;
            let removed: Option<StoredTask> = match tasks.remove(id)? {
                Some(data) => Some(decode(data.value())?),
                None => None,
            };
            let Some(removed) = removed else {
                return Ok(false);
            };
            let mut by_owner = txn.open_multimap_table(TASKS_BY_OWNER)?;
            by_owner.remove(removed.user_id.as_str(), id)?;
        }
        txn.commit()?;
        Ok(true)
    }
}

// ── Errors ─────────────────────────────────────────────────────

// redb 2.x has many error types. Blanket them all into StoreError::Backend.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for StoreError {
            fn from(e: $t) -> Self { StoreError::Backend(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Create a save file in a temp dir that cleans up on drop.
    fn temp_save() -> (SaveFile, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let sf = SaveFile::open(dir.path().join("tasks.redb")).unwrap();
        (sf, dir)
    }

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.to_string(),
            description: String::new(),
            status: TaskStatus::Todo,
            due_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        }
    }

    fn user(email: &str) -> UserRecord {
        UserRecord {
            uid: Uuid::new_v4().to_string(),
            email: email.to_string(),
            display_name: Some("Ada".into()),
            password_hash: "hash".into(),
            email_verified: false,
            created_at_ms: 0,
        }
    }

    #[test]
    fn create_assigns_owner_and_equal_timestamps() {
        let (sf, _dir) = temp_save();
        let task = sf.create(new_task("Buy milk"), "alice").unwrap();

        assert_eq!(task.user_id, "alice");
        assert_eq!(task.created_at, task.updated_at);
        assert!(!task.id.is_empty());

        let loaded = sf.get(&task.id).unwrap().unwrap();
        assert_eq!(loaded, task);
    }

    #[test]
    fn list_filters_by_owner() {
        let (sf, _dir) = temp_save();
        sf.create(new_task("a1"), "alice").unwrap();
        sf.create(new_task("a2"), "alice").unwrap();
        sf.create(new_task("b1"), "bob").unwrap();

        let mut titles: Vec<_> = sf.list("alice").unwrap().into_iter().map(|t| t.title).collect();
        titles.sort();
        assert_eq!(titles, vec!["a1", "a2"]);
        assert_eq!(sf.list("bob").unwrap().len(), 1);
        assert!(sf.list("carol").unwrap().is_empty());
    }

    #[test]
    fn update_merges_and_advances_updated_at() {
        let (sf, _dir) = temp_save();
        let task = sf.create(new_task("Buy milk"), "alice").unwrap();

        let updated = sf.update(&task.id, &TaskPatch::status(TaskStatus::Done)).unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.title, "Buy milk");
        assert_eq!(updated.created_at, task.created_at);
        assert!(updated.updated_at > updated.created_at);

        assert_eq!(sf.get(&task.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn repeated_status_change_is_idempotent() {
        let (sf, _dir) = temp_save();
        let task = sf.create(new_task("Buy milk"), "alice").unwrap();

        let once = sf.update(&task.id, &TaskPatch::status(TaskStatus::Done)).unwrap();
        let twice = sf.update(&task.id, &TaskPatch::status(TaskStatus::Done)).unwrap();

        assert!(twice.updated_at > once.updated_at);
        let strip = |t: Task| Task { updated_at: t.created_at, ..t };
        assert_eq!(strip(once), strip(twice));
    }

    #[test]
    fn update_missing_task_is_not_found() {
        let (sf, _dir) = temp_save();
        let err = sf.update("nope", &TaskPatch::status(TaskStatus::Done)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "nope"));
    }

    #[test]
    fn delete_removes_task_and_index_entry() {
        let (sf, _dir) = temp_save();
        let task = sf.create(new_task("Doomed"), "alice").unwrap();

        assert!(sf.delete(&task.id).unwrap());
        assert!(sf.get(&task.id).unwrap().is_none());
        assert!(sf.list("alice").unwrap().is_empty());
        assert!(!sf.delete(&task.id).unwrap());
    }

    #[test]
    fn reopen_keeps_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.redb");
        let id = {
            let sf = SaveFile::open(&path).unwrap();
            sf.create(new_task("Survives"), "alice").unwrap().id
        };

        let sf = SaveFile::open(&path).unwrap();
        let task = sf.get(&id).unwrap().unwrap();
        assert_eq!(task.title, "Survives");
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 1, 10));
    }

    #[test]
    fn due_date_round_trips_through_day_count() {
        for date in [
            NaiveDate::from_ymd_opt(1969, 12, 31).unwrap(),
            NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        ] {
            assert_eq!(date_from_days(days_since_epoch(date)), Some(date));
        }
    }

    #[test]
    fn users_are_unique_by_email() {
        let (sf, _dir) = temp_save();
        let ada = user("ada@example.com");
        assert!(sf.create_user(&ada).unwrap());
        assert!(!sf.create_user(&user("ada@example.com")).unwrap());

        assert_eq!(sf.get_user_by_email("ada@example.com").unwrap(), Some(ada.clone()));
        assert_eq!(sf.get_user(&ada.uid).unwrap(), Some(ada.clone()));

        assert!(sf.delete_user(&ada.uid).unwrap());
        assert!(sf.get_user_by_email("ada@example.com").unwrap().is_none());
        assert!(!sf.delete_user(&ada.uid).unwrap());
        assert!(sf.create_user(&user("ada@example.com")).unwrap());
    }
}

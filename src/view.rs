//! Derived task views: status filter, ordering, summary counts.
//!
//! Pure functions over `Task` slices. The server's `GET /tasks` and the
//! client board share them so both sides order a list the same way.

use crate::models::{Task, TaskStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};

// ── Filter ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Only(TaskStatus),
}

impl StatusFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusFilter::All => "all",
            StatusFilter::Only(status) => status.as_str(),
        }
    }

    pub fn matches(self, status: TaskStatus) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Only(wanted) => wanted == status,
        }
    }
}

impl From<TaskStatus> for StatusFilter {
    fn from(status: TaskStatus) -> Self {
        StatusFilter::Only(status)
    }
}

impl FromStr for StatusFilter {
    type Err = ParseViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(StatusFilter::All);
        }
        s.parse::<TaskStatus>()
            .map(StatusFilter::Only)
            .map_err(|_| ParseViewError::Status(s.to_string()))
    }
}

// ── Ordering ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    DueDate,
    CreatedAt,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            SortField::DueDate => "dueDate",
            SortField::CreatedAt => "createdAt",
        }
    }

    /// Numeric sort key. Anything missing counts as zero, i.e. earliest.
    fn key(self, task: &Task) -> i64 {
        match self {
            SortField::DueDate => task.due_date.map_or(0, date_key),
            SortField::CreatedAt => task.created_at.timestamp_millis(),
        }
    }
}

impl FromStr for SortField {
    type Err = ParseViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dueDate" => Ok(SortField::DueDate),
            "createdAt" => Ok(SortField::CreatedAt),
            other => Err(ParseViewError::Field(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl FromStr for SortOrder {
    type Err = ParseViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(ParseViewError::Order(other.to_string())),
        }
    }
}

macro_rules! display_as_str {
    ($($t:ty),+) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })+
    };
}

display_as_str!(StatusFilter, SortField, SortOrder);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseViewError {
    #[error("unknown status filter `{0}`")]
    Status(String),
    #[error("unknown sort field `{0}`")]
    Field(String),
    #[error("unknown sort order `{0}`")]
    Order(String),
}

/// The filter set that produced a task list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskFilters {
    pub status: StatusFilter,
    pub sort_by: SortField,
    pub order: SortOrder,
}

impl TaskFilters {
    /// Server listing defaults: newest first.
    pub fn newest_first() -> Self {
        TaskFilters {
            status: StatusFilter::All,
            sort_by: SortField::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

// ── Operations ─────────────────────────────────────────────────

/// Keeps input order. `All` returns the list untouched.
pub fn filter_by_status(tasks: Vec<Task>, filter: StatusFilter) -> Vec<Task> {
    match filter {
        StatusFilter::All => tasks,
        StatusFilter::Only(_) => tasks.into_iter().filter(|t| filter.matches(t.status)).collect(),
    }
}

/// Stable sort. Descending is the exact reverse of ascending when keys are distinct.
pub fn sort_tasks(tasks: &mut [Task], field: SortField, order: SortOrder) {
    tasks.sort_by(|a, b| compare(a, b, field, order));
}

fn compare(a: &Task, b: &Task, field: SortField, order: SortOrder) -> Ordering {
    let (ka, kb) = (field.key(a), field.key(b));
    match order {
        SortOrder::Asc => ka.cmp(&kb),
        SortOrder::Desc => kb.cmp(&ka),
    }
}

pub fn apply(tasks: Vec<Task>, filters: &TaskFilters) -> Vec<Task> {
    let mut visible = filter_by_status(tasks, filters.status);
    sort_tasks(&mut visible, filters.sort_by, filters.order);
    visible
}

fn date_key(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map_or(0, |dt| dt.and_utc().timestamp_millis())
}

// ── Stats ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
    /// Not done and due before `today`.
    pub overdue: usize,
    pub completion_percent: u8,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task], today: NaiveDate) -> Self {
        let mut stats = TaskStats {
            total: tasks.len(),
            ..TaskStats::default()
        };
        for task in tasks {
            match task.status {
                TaskStatus::Todo => stats.todo += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Done => stats.done += 1,
            }
            if task.status != TaskStatus::Done && task.due_date.is_some_and(|d| d < today) {
                stats.overdue += 1;
            }
        }
        if stats.total > 0 {
            stats.completion_percent = ((stats.done * 100 + stats.total / 2) / stats.total) as u8;
        }
        stats
    }
}

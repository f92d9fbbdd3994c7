//! Field checks run before anything touches the network or the store.
//!
//! Every rule is evaluated; violations come back in rule order so a form
//! can show all of them at once.

use crate::models::{NewTask, Registration, TaskDraft, TaskPatch, TaskStatus};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;

pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 500;
pub const PASSWORD_MIN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    violations: Vec<Violation>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn messages(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.message).collect()
    }

    pub(crate) fn push(&mut self, field: &'static str, message: &'static str) {
        self.violations.push(Violation { field, message });
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for Validation {}

// ── Tasks ──────────────────────────────────────────────────────

/// Rules for a new task: title required (after trim) and ≤100 chars,
/// description ≤500 chars, due date required and well-formed,
/// status (if given) one of the known values.
pub fn validate(draft: &TaskDraft) -> Validation {
    let mut v = Validation::default();

    match draft.title.as_deref() {
        Some(title) if !title.trim().is_empty() => {}
        _ => v.push("title", "Title is required"),
    }
    check_lengths(draft, &mut v);

    match present(&draft.due_date) {
        None => v.push("dueDate", "Due date is required"),
        Some(raw) if parse_due_date(raw).is_none() => v.push("dueDate", "Invalid date format"),
        Some(_) => {}
    }

    check_status(draft, &mut v);
    v
}

/// Rules for a partial update: the same checks, applied only to the
/// fields that are present.
pub fn validate_patch(draft: &TaskDraft) -> Validation {
    let mut v = Validation::default();

    if draft.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
        v.push("title", "Title cannot be empty");
    }
    check_lengths(draft, &mut v);

    if let Some(raw) = draft.due_date.as_deref() {
        if parse_due_date(raw.trim()).is_none() {
            v.push("dueDate", "Invalid date format");
        }
    }

    check_status(draft, &mut v);
    v
}

fn check_lengths(draft: &TaskDraft, v: &mut Validation) {
    if draft.title.as_deref().is_some_and(|t| t.chars().count() > TITLE_MAX) {
        v.push("title", "Title must be less than 100 characters");
    }
    if draft
        .description
        .as_deref()
        .is_some_and(|d| d.chars().count() > DESCRIPTION_MAX)
    {
        v.push("description", "Description must be less than 500 characters");
    }
}

fn check_status(draft: &TaskDraft, v: &mut Validation) {
    if let Some(status) = present(&draft.status) {
        if status.parse::<TaskStatus>().is_err() {
            v.push("status", "Invalid status");
        }
    }
}

/// Blank strings count as absent.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Accepts `YYYY-MM-DD`, RFC 3339 date-times and naive ISO-8601 date-times.
/// Only the calendar date is kept.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|dt| dt.date())
        })
}

impl TryFrom<TaskDraft> for NewTask {
    type Error = Validation;

    fn try_from(draft: TaskDraft) -> Result<Self, Self::Error> {
        let validation = validate(&draft);
        if !validation.is_valid() {
            return Err(validation);
        }

        let due_date = present(&draft.due_date).and_then(parse_due_date);
        let status = present(&draft.status).and_then(|s| s.parse().ok());
        let (Some(title), Some(due_date)) = (draft.title, due_date) else {
            return Err(validation);
        };

        Ok(NewTask {
            title: title.trim().to_string(),
            description: draft
                .description
                .map(|d| d.trim().to_string())
                .unwrap_or_default(),
            status: status.unwrap_or_default(),
            due_date,
        })
    }
}

impl TryFrom<TaskDraft> for TaskPatch {
    type Error = Validation;

    fn try_from(draft: TaskDraft) -> Result<Self, Self::Error> {
        let validation = validate_patch(&draft);
        if !validation.is_valid() {
            return Err(validation);
        }

        Ok(TaskPatch {
            title: draft.title.map(|t| t.trim().to_string()),
            description: draft.description.map(|d| d.trim().to_string()),
            status: present(&draft.status).and_then(|s| s.parse().ok()),
            due_date: draft.due_date.as_deref().and_then(|d| parse_due_date(d.trim())),
        })
    }
}

// ── Accounts ───────────────────────────────────────────────────

pub fn validate_registration(registration: &Registration) -> Validation {
    let mut v = Validation::default();

    if !is_plausible_email(&registration.email) {
        v.push("email", "Valid email is required");
    }
    if registration.password.chars().count() < PASSWORD_MIN {
        v.push("password", "Password must be at least 6 characters");
    }
    if registration
        .display_name
        .as_deref()
        .map_or(true, |name| name.trim().is_empty())
    {
        v.push("displayName", "Display name is required");
    }
    v
}

/// Shape check only: one `@`, non-empty local part, dotted domain, no spaces.
pub fn is_plausible_email(email: &str) -> bool {
    let email = email.trim();
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|part| !part.is_empty())
        }
        None => false,
    }
}

//! Plain-text rendering of tasks for the terminal client.

use crate::models::{Task, TaskStatus};
use crate::view::TaskStats;
use chrono::NaiveDate;
use std::fmt::Write;

pub const DESCRIPTION_PREVIEW: usize = 100;

pub fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "To Do",
        TaskStatus::InProgress => "In Progress",
        TaskStatus::Done => "Done",
    }
}

/// Relative wording near `today`, otherwise e.g. "Jan 10, 2026".
pub fn format_due(due: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(due) = due else {
        return "No date".to_string();
    };
    match (due - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        -1 => "Yesterday".to_string(),
        days if days < 0 => format!("{} days ago", -days),
        days if days <= 7 => format!("In {days} days"),
        _ => due.format("%b %-d, %Y").to_string(),
    }
}

/// How pressing a due date is, from the distance to `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    None,
    Overdue,
    Soon,
    ThisWeek,
    Later,
}

impl Urgency {
    pub fn of(due: Option<NaiveDate>, today: NaiveDate) -> Self {
        let Some(due) = due else {
            return Urgency::None;
        };
        match (due - today).num_days() {
            d if d < 0 => Urgency::Overdue,
            d if d <= 2 => Urgency::Soon,
            d if d <= 7 => Urgency::ThisWeek,
            _ => Urgency::Later,
        }
    }

    pub fn marker(self) -> &'static str {
        match self {
            Urgency::Overdue => "!!",
            Urgency::Soon => "! ",
            Urgency::None | Urgency::ThisWeek | Urgency::Later => "  ",
        }
    }
}

/// Cut to `max` chars and append "..." when anything was dropped.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

pub fn render_task_line(task: &Task, today: NaiveDate) -> String {
    let urgency = if task.status == TaskStatus::Done {
        Urgency::None
    } else {
        Urgency::of(task.due_date, today)
    };
    let mut line = format!(
        "{}[{:<11}] {}  ({})  #{}",
        urgency.marker(),
        status_label(task.status),
        task.title,
        format_due(task.due_date, today),
        task.id,
    );
    if !task.description.is_empty() {
        let _ = write!(line, "\n      {}", truncate(&task.description, DESCRIPTION_PREVIEW));
    }
    line
}

pub fn render_stats(stats: &TaskStats) -> String {
    format!(
        "{} tasks: {} to do, {} in progress, {} done ({}% complete), {} overdue",
        stats.total, stats.todo, stats.in_progress, stats.done, stats.completion_percent, stats.overdue
    )
}

pub fn render_board(tasks: &[Task], stats: &TaskStats, today: NaiveDate) -> String {
    if tasks.is_empty() {
        return format!("No tasks found.\n{}", render_stats(stats));
    }
    let mut out = String::new();
    for task in tasks {
        out.push_str(&render_task_line(task, today));
        out.push('\n');
    }
    out.push_str(&render_stats(stats));
    out
}

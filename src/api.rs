//! Task endpoints. Every route here sits behind `auth_middleware`.

use crate::auth::AuthUser;
use crate::dto::{MessageResponse, TaskListResponse, TaskResponse};
use crate::error::{ApiError, ApiResult};
use crate::models::{NewTask, Task, TaskDraft, TaskPatch};
use crate::state::SharedState;
use crate::store::TaskStore;
use crate::validation::Validation;
use crate::view::{self, TaskFilters};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;

pub const DEMO_MESSAGE: &str = "Demo mode - no real data stored";
const NOT_OWNER: &str = "You do not have permission to access this task";

// ── Query ──────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
}

impl ListQuery {
    /// Unset or blank parameters fall back to newest-first, all statuses.
    pub fn filters(&self) -> ApiResult<TaskFilters> {
        let mut filters = TaskFilters::newest_first();
        let mut v = Validation::default();

        if let Some(raw) = non_blank(&self.status) {
            match raw.parse() {
                Ok(status) => filters.status = status,
                Err(_) => v.push("status", "Invalid status"),
            }
        }
        if let Some(raw) = non_blank(&self.sort_by) {
            match raw.parse() {
                Ok(field) => filters.sort_by = field,
                Err(_) => v.push("sortBy", "Invalid sort field"),
            }
        }
        if let Some(raw) = non_blank(&self.order) {
            match raw.parse() {
                Ok(order) => filters.order = order,
                Err(_) => v.push("order", "Invalid sort order"),
            }
        }

        if v.is_valid() {
            Ok(filters)
        } else {
            Err(ApiError::Validation(v))
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// ── Helpers ────────────────────────────────────────────────────

/// 404 when missing, 403 when someone else owns it.
fn owned_task(store: &dyn TaskStore, id: &str, user: &AuthUser) -> ApiResult<Task> {
    let task = store.get(id)?.ok_or(ApiError::NotFound)?;
    if task.user_id != user.uid {
        tracing::warn!(task = %id, uid = %user.uid, "ownership check failed");
        return Err(ApiError::Forbidden(NOT_OWNER));
    }
    Ok(task)
}

// ── Handlers ───────────────────────────────────────────────────

pub async fn list_tasks(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<TaskListResponse>> {
    let Query(query) = query?;
    let filters = query.filters()?;

    let Some(store) = &state.store else {
        return Ok(Json(TaskListResponse {
            success: true,
            message: Some(DEMO_MESSAGE.to_string()),
            count: 0,
            tasks: Vec::new(),
        }));
    };

    let tasks = view::apply(store.list(&user.uid)?, &filters);
    Ok(Json(TaskListResponse {
        success: true,
        message: None,
        count: tasks.len(),
        tasks,
    }))
}

pub async fn get_task(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskResponse>> {
    let store = state.store()?;
    let task = owned_task(store.as_ref(), &id, &user)?;
    Ok(Json(TaskResponse {
        success: true,
        message: None,
        task,
    }))
}

pub async fn create_task(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<TaskDraft>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    let Json(draft) = payload?;
    let new_task = NewTask::try_from(draft)?;
    let store = state.store()?;

    let task = store.create(new_task, &user.uid)?;
    tracing::info!(task = %task.id, uid = %user.uid, "task created");

    Ok((
        StatusCode::CREATED,
        Json(TaskResponse {
            success: true,
            message: Some("Task created successfully".to_string()),
            task,
        }),
    ))
}

pub async fn update_task(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<TaskDraft>, JsonRejection>,
) -> ApiResult<Json<TaskResponse>> {
    let Json(draft) = payload?;
    let patch = TaskPatch::try_from(draft)?;
    let store = state.store()?;

    owned_task(store.as_ref(), &id, &user)?;
    let task = store.update(&id, &patch)?;
    tracing::debug!(task = %task.id, "task updated");

    Ok(Json(TaskResponse {
        success: true,
        message: Some("Task updated successfully".to_string()),
        task,
    }))
}

pub async fn delete_task(
    State(state): State<SharedState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let store = state.store()?;

    owned_task(store.as_ref(), &id, &user)?;
    if !store.delete(&id)? {
        return Err(ApiError::NotFound);
    }
    tracing::info!(task = %id, uid = %user.uid, "task deleted");

    Ok(Json(MessageResponse::ok("Task deleted successfully")))
}

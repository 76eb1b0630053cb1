//! HTTP surface for the mutation API.
//!
//! `user_id` always derives from the verified bearer token; request bodies
//! and query strings never carry it.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::CoreError;
use crate::domain::models::{
    StatusFilter, TaskPatch, TaskPriority, TaskQuery, TaskSort,
};
use crate::domain::ports::{AuditStore, JobStore, OutboxStore};
use crate::services::{ConnectionRegistry, CreateTaskInput, MutationService, ReminderInput};

use super::auth::JwtVerifier;
use super::error::{ApiError, ApiResult};
use super::ws::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub mutation: Arc<MutationService>,
    pub registry: Arc<ConnectionRegistry>,
    pub verifier: Arc<JwtVerifier>,
    pub audit: Arc<dyn AuditStore>,
    pub outbox: Arc<dyn OutboxStore>,
    pub jobs: Arc<dyn JobStore>,
}

/// Authenticated user extracted from the `Authorization: Bearer` header.
pub struct AuthUser(pub String);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| CoreError::Unauthenticated("missing bearer token".to_string()))?;
        let user_id = state.verifier.verify(&token)?;
        Ok(AuthUser(user_id))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let header = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    header
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/{id}", get(get_task).patch(update_task).delete(delete_task))
        .route("/tasks/{id}/complete", post(complete_task))
        .route("/tasks/{id}/reminders", post(create_reminder).get(list_reminders))
        .route("/audit", get(list_audit))
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn create_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(input): Json<CreateTaskInput>,
) -> ApiResult<impl IntoResponse> {
    let task = state.mutation.create_task(&user_id, input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let task = state.mutation.get_task(&user_id, task_id).await?;
    Ok(Json(task))
}

async fn update_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<impl IntoResponse> {
    let task = state.mutation.update_task(&user_id, task_id, patch).await?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let task = state.mutation.complete_task(&user_id, task_id).await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.mutation.delete_task(&user_id, task_id).await?;
    Ok(Json(json!({})))
}

async fn create_reminder(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
    Json(input): Json<ReminderInput>,
) -> ApiResult<impl IntoResponse> {
    let reminder = state.mutation.schedule_reminder(&user_id, task_id, input).await?;
    Ok((StatusCode::CREATED, Json(reminder)))
}

async fn list_reminders(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let reminders = state.mutation.list_reminders(&user_id, task_id).await?;
    Ok(Json(reminders))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuditParams {
    limit: Option<u32>,
}

async fn list_audit(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<AuditParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500);
    let entries = state.audit.list_for_user(&user_id, limit).await?;
    Ok(Json(entries))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListParams {
    status: Option<String>,
    priority: Option<String>,
    tag: Option<String>,
    due_before: Option<chrono::DateTime<chrono::Utc>>,
    due_after: Option<chrono::DateTime<chrono::Utc>>,
    sort: Option<String>,
    order: Option<String>,
    limit: Option<u32>,
    cursor: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<TaskQuery, CoreError> {
        let status = match self.status.as_deref() {
            None => None,
            Some("pending") => Some(StatusFilter::Pending),
            Some("completed") => Some(StatusFilter::Completed),
            Some(other) => {
                return Err(CoreError::invalid("status", format!("unknown status '{other}'")))
            }
        };
        let priority = match self.priority.as_deref() {
            None => None,
            Some(p) => Some(
                TaskPriority::from_str(p)
                    .ok_or_else(|| CoreError::invalid("priority", format!("unknown priority '{p}'")))?,
            ),
        };
        let sort = match self.sort.as_deref() {
            None | Some("created_at") => TaskSort::CreatedAt,
            Some("due_date") => TaskSort::DueDate,
            Some(other) => {
                return Err(CoreError::invalid("sort", format!("unknown sort key '{other}'")))
            }
        };
        let descending = match self.order.as_deref() {
            None | Some("asc") => false,
            Some("desc") => true,
            Some(other) => {
                return Err(CoreError::invalid("order", format!("unknown order '{other}'")))
            }
        };

        Ok(TaskQuery {
            status,
            priority,
            tag: self.tag,
            due_before: self.due_before,
            due_after: self.due_after,
            sort,
            descending,
            limit: self.limit.unwrap_or(50),
            cursor: self.cursor,
        })
    }
}

async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let query = params.into_query()?;
    let page = state.mutation.list_tasks(&user_id, query).await?;
    Ok(Json(page))
}

async fn healthz(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let outbox_depth = state.outbox.depth().await?;
    let open_jobs = state.jobs.open_count().await?;
    let connections = state.registry.total_connections().await;
    Ok(Json(json!({
        "status": "ok",
        "outbox_depth": outbox_depth,
        "open_jobs": open_jobs,
        "live_connections": connections,
    })))
}

//! Task registry endpoints: the pull-side complement of the push channel.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use uuid::Uuid;

use deckform_core::models::{TaskListQuery, TaskResponse, TaskStats};
use deckform_core::AppError;

use crate::auth::TenantContext;
use crate::error::HttpAppError;
use crate::state::AppState;

#[tracing::instrument(skip(state))]
pub async fn list_tasks(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    let tasks = state.tasks.list(tenant_ctx.tenant_id, query).await?;
    let tasks: Vec<TaskResponse> = tasks.into_iter().map(TaskResponse::from).collect();

    Ok(Json(serde_json::json!({
        "tasks": tasks,
        "count": tasks.len(),
    })))
}

#[tracing::instrument(skip(state))]
pub async fn get_task(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>, HttpAppError> {
    let task = state
        .tasks
        .get(tenant_ctx.tenant_id, task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;

    Ok(Json(TaskResponse::from(task)))
}

#[tracing::instrument(skip(state))]
pub async fn task_stats(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
) -> Result<Json<TaskStats>, HttpAppError> {
    let stats = state.tasks.stats(tenant_ctx.tenant_id).await?;
    Ok(Json(stats))
}

/// Flag a task for cooperative cancellation. The worker honors the flag at
/// its next slide boundary; a terminal task is a 409.
#[tracing::instrument(skip(state))]
pub async fn cancel_task(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    state
        .tasks
        .get(tenant_ctx.tenant_id, task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", task_id)))?;

    let flagged = state
        .tasks
        .request_cancel(tenant_ctx.tenant_id, task_id)
        .await?;
    if !flagged {
        return Err(AppError::Conflict("Task is already terminal".to_string()).into());
    }

    tracing::info!(task_id = %task_id, "Cancellation requested");
    Ok(Json(serde_json::json!({ "cancel_requested": true })))
}

//! Assembly endpoints. Mutations go through the collaboration coordinator;
//! everything else is plain repository reads guarded by membership.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use deckform_core::models::{Assembly, AssemblyMutation, AssemblySnapshot, MemberRole};
use deckform_core::AppError;
use deckform_realtime::MutationOutcome;

use crate::auth::TenantContext;
use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAssemblyBody {
    pub title: String,
}

#[tracing::instrument(skip(state, body))]
pub async fn create_assembly(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAssemblyBody>,
) -> Result<(StatusCode, Json<Assembly>), HttpAppError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(AppError::InvalidInput("Title cannot be empty".to_string()).into());
    }

    let assembly = state
        .assemblies
        .create(tenant_ctx.tenant_id, tenant_ctx.user_id, title)
        .await?;

    tracing::info!(assembly_id = %assembly.id, "Assembly created");
    Ok((StatusCode::CREATED, Json(assembly)))
}

/// Full snapshot: order, members, comments. Members only.
#[tracing::instrument(skip(state))]
pub async fn get_assembly(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(assembly_id): Path<Uuid>,
) -> Result<Json<AssemblySnapshot>, HttpAppError> {
    require_member(&state, &tenant_ctx, assembly_id).await?;

    let snapshot = state
        .assemblies
        .snapshot(tenant_ctx.tenant_id, assembly_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assembly {} not found", assembly_id)))?;

    Ok(Json(snapshot))
}

/// Apply one mutation through the coordinator. The response carries the
/// resulting state so the caller need not wait for its own event.
#[tracing::instrument(skip(state, mutation))]
pub async fn apply_mutation(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(assembly_id): Path<Uuid>,
    Json(mutation): Json<AssemblyMutation>,
) -> Result<Json<MutationOutcome>, HttpAppError> {
    let outcome = state
        .coordinator
        .apply_mutation(tenant_ctx.tenant_id, tenant_ctx.user_id, assembly_id, mutation)
        .await?;

    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct UpsertMemberBody {
    pub user_id: Uuid,
    pub role: MemberRole,
}

/// Grant or change a member's role. Requires the edit role (or tenant
/// admin) on the assembly.
#[tracing::instrument(skip(state, body))]
pub async fn upsert_member(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(assembly_id): Path<Uuid>,
    Json(body): Json<UpsertMemberBody>,
) -> Result<StatusCode, HttpAppError> {
    state
        .assemblies
        .get(tenant_ctx.tenant_id, assembly_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assembly {} not found", assembly_id)))?;

    if !tenant_ctx.role.is_admin() {
        let role = state
            .assemblies
            .member_role(tenant_ctx.tenant_id, assembly_id, tenant_ctx.user_id)
            .await?;
        if !matches!(role, Some(r) if r.can_edit()) {
            return Err(
                AppError::Forbidden("Managing members requires the edit role".to_string()).into(),
            );
        }
    }

    state
        .assemblies
        .upsert_member(tenant_ctx.tenant_id, assembly_id, body.user_id, body.role)
        .await?;

    tracing::info!(
        assembly_id = %assembly_id,
        member = %body.user_id,
        role = %body.role,
        "Member upserted"
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a comment. Author or tenant admin only.
#[tracing::instrument(skip(state))]
pub async fn delete_comment(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(comment_id): Path<Uuid>,
) -> Result<StatusCode, HttpAppError> {
    let comment = state
        .assemblies
        .get_comment(tenant_ctx.tenant_id, comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Comment {} not found", comment_id)))?;

    if comment.author_id != tenant_ctx.user_id && !tenant_ctx.role.is_admin() {
        return Err(
            AppError::Forbidden("Only the author or an admin can delete a comment".to_string())
                .into(),
        );
    }

    state
        .assemblies
        .delete_comment(tenant_ctx.tenant_id, comment_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn require_member(
    state: &Arc<AppState>,
    tenant_ctx: &TenantContext,
    assembly_id: Uuid,
) -> Result<(), HttpAppError> {
    state
        .assemblies
        .get(tenant_ctx.tenant_id, assembly_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Assembly {} not found", assembly_id)))?;

    if tenant_ctx.role.is_admin() {
        return Ok(());
    }
    let role = state
        .assemblies
        .member_role(tenant_ctx.tenant_id, assembly_id, tenant_ctx.user_id)
        .await?;
    if role.is_none() {
        return Err(AppError::Forbidden("Not a member of this assembly".to_string()).into());
    }
    Ok(())
}

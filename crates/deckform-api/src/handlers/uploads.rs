//! Upload flow: grant, direct byte PUT, confirm.
//!
//! The PUT is authorized by the signed token alone, not by identity headers;
//! the grant row ties the key back to its tenant so confirm can enforce
//! ownership. No byte ever flows through the ingestion pipeline before a
//! confirmed, durably committed job row exists.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use deckform_core::models::{JobStatus, UploadJob};
use deckform_core::AppError;
use deckform_db::UploadGrant;
use deckform_storage::upload_key_for;

use crate::auth::TenantContext;
use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestUploadBody {
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct UploadGrantResponse {
    pub upload_id: Uuid,
    pub storage_key: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issue an upload grant: an opaque storage key plus a signed token that
/// authorizes PUTting bytes at that key until expiry.
#[tracing::instrument(skip(state, body))]
pub async fn request_upload(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Json(body): Json<RequestUploadBody>,
) -> Result<(StatusCode, Json<UploadGrantResponse>), HttpAppError> {
    let filename = body.filename.trim();
    if filename.is_empty() {
        return Err(AppError::InvalidInput("Filename cannot be empty".to_string()).into());
    }

    let upload_id = Uuid::new_v4();
    let storage_key = upload_key_for(upload_id);

    let ttl = state.config.upload_token_ttl_secs;
    let expires_at = Utc::now() + Duration::seconds(ttl);
    let token = state.signer.issue(&storage_key, ttl);

    state
        .grants
        .create(
            tenant_ctx.tenant_id,
            tenant_ctx.user_id,
            &storage_key,
            filename,
            expires_at,
        )
        .await?;

    tracing::info!(
        tenant_id = %tenant_ctx.tenant_id,
        upload_id = %upload_id,
        "Upload grant issued"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadGrantResponse {
            upload_id,
            storage_key,
            token,
            expires_at,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct PutBytesQuery {
    pub token: String,
}

/// Accept the raw deck bytes for a granted key. Re-PUTting before confirm
/// replaces the bytes; after confirm the worker reads whatever was last
/// written for the key.
#[tracing::instrument(skip(state, query, body))]
pub async fn put_upload_bytes(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<Uuid>,
    Query(query): Query<PutBytesQuery>,
    body: Bytes,
) -> Result<StatusCode, HttpAppError> {
    let storage_key = upload_key_for(upload_id);

    let grant = state
        .grants
        .get(&storage_key)
        .await?
        .ok_or_else(|| AppError::NotFound("No grant for this upload".to_string()))?;
    if grant.is_expired() {
        return Err(AppError::Unauthorized("Upload grant has expired".to_string()).into());
    }
    if !state.signer.verify(&storage_key, &query.token) {
        return Err(AppError::Unauthorized("Invalid upload token".to_string()).into());
    }
    if body.is_empty() {
        return Err(AppError::InvalidInput("Upload body is empty".to_string()).into());
    }
    if body.len() > state.config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "Upload is {} bytes, limit is {}",
            body.len(),
            state.config.max_upload_bytes
        ))
        .into());
    }

    let size = body.len();
    state.storage.put(&storage_key, body).await?;
    tracing::info!(upload_id = %upload_id, size, "Upload bytes stored");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub job_id: Uuid,
    pub task_id: Uuid,
    pub status: JobStatus,
    /// False when this confirm matched an existing job for the same key.
    pub created: bool,
}

/// Confirm an upload, creating the durable ingestion job and its task
/// handle. Idempotent per storage key: repeats return the original job.
#[tracing::instrument(skip(state))]
pub async fn confirm_upload(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<Uuid>,
) -> Result<(StatusCode, Json<ConfirmResponse>), HttpAppError> {
    let storage_key = upload_key_for(upload_id);

    let grant = state
        .grants
        .get(&storage_key)
        .await?
        .ok_or_else(|| AppError::NotFound("No grant for this upload".to_string()))?;
    check_confirm_grant(&grant, tenant_ctx.tenant_id)?;

    if !state.storage.exists(&storage_key).await? {
        return Err(
            AppError::InvalidInput("No bytes have been uploaded for this key".to_string()).into(),
        );
    }

    let outcome = state
        .jobs
        .confirm(
            tenant_ctx.tenant_id,
            tenant_ctx.user_id,
            &storage_key,
            &grant.filename,
        )
        .await?;

    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    tracing::info!(
        job_id = %outcome.job.id,
        task_id = %outcome.job.task_id,
        created = outcome.created,
        "Upload confirmed"
    );

    Ok((status, Json(confirm_response(outcome.job, outcome.created))))
}

fn confirm_response(job: UploadJob, created: bool) -> ConfirmResponse {
    ConfirmResponse {
        job_id: job.id,
        task_id: job.task_id,
        status: job.status,
        created,
    }
}

/// Grant checks shared by the confirm path. Expiry is enforced here as well
/// as on the byte PUT: a late confirm must not depend on whether the
/// expired-grant sweep has run yet.
fn check_confirm_grant(grant: &UploadGrant, tenant_id: Uuid) -> Result<(), AppError> {
    if grant.tenant_id != tenant_id {
        return Err(AppError::Forbidden(
            "Upload belongs to another tenant".to_string(),
        ));
    }
    if grant.is_expired() {
        return Err(AppError::Unauthorized(
            "Upload grant has expired".to_string(),
        ));
    }
    Ok(())
}

/// Fetch an ingestion job with its extracted slides.
#[tracing::instrument(skip(state))]
pub async fn get_upload_job(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, HttpAppError> {
    let job = state
        .jobs
        .get(tenant_ctx.tenant_id, job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload job {} not found", job_id)))?;

    let slides = state
        .slides
        .list_for_job(tenant_ctx.tenant_id, job_id)
        .await?;

    Ok(Json(serde_json::json!({
        "job": job,
        "slides": slides,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(tenant_id: Uuid, expires_in_secs: i64) -> UploadGrant {
        UploadGrant {
            storage_key: "uploads/test".to_string(),
            tenant_id,
            user_id: Uuid::new_v4(),
            filename: "deck.json".to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn confirm_rejects_expired_grant() {
        let tenant_id = Uuid::new_v4();
        let expired = grant(tenant_id, -5);
        assert!(matches!(
            check_confirm_grant(&expired, tenant_id),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn confirm_rejects_foreign_tenant_grant() {
        let fresh = grant(Uuid::new_v4(), 300);
        assert!(matches!(
            check_confirm_grant(&fresh, Uuid::new_v4()),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn confirm_accepts_live_matching_grant() {
        let tenant_id = Uuid::new_v4();
        let fresh = grant(tenant_id, 300);
        assert!(check_confirm_grant(&fresh, tenant_id).is_ok());
    }
}

//! Live event stream over SSE.
//!
//! One connection per subscriber, lossy per-connection buffering: a slow
//! client is told how many events it missed (a `GAP` frame) and is expected
//! to resynchronize by pulling snapshots, never by stalling the hub.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use deckform_core::AppError;

use crate::auth::TenantContext;
use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated assembly ids to watch.
    pub assemblies: Option<String>,
    /// Comma-separated task ids to watch.
    pub tasks: Option<String>,
}

pub(crate) fn parse_id_list(raw: Option<&str>) -> Result<Vec<Uuid>, AppError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            Uuid::parse_str(s).map_err(|_| AppError::InvalidInput(format!("Invalid id: {}", s)))
        })
        .collect()
}

/// Open the event stream. Tenant-wide events arrive unconditionally;
/// assembly and task events require the interests given in the query, and
/// watching an assembly requires membership in it.
#[tracing::instrument(skip(state, query))]
pub async fn subscribe_events(
    tenant_ctx: TenantContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpAppError> {
    let assembly_ids = parse_id_list(query.assemblies.as_deref())?;
    let task_ids = parse_id_list(query.tasks.as_deref())?;

    for assembly_id in &assembly_ids {
        let member = state
            .assemblies
            .member_role(tenant_ctx.tenant_id, *assembly_id, tenant_ctx.user_id)
            .await?;
        if member.is_none() && !tenant_ctx.role.is_admin() {
            return Err(AppError::Forbidden(format!(
                "Not a member of assembly {}",
                assembly_id
            ))
            .into());
        }
    }

    let (handle, rx) = state.hub.subscribe(tenant_ctx.tenant_id, tenant_ctx.user_id);
    for assembly_id in assembly_ids {
        handle.watch_assembly(assembly_id);
    }
    for task_id in task_ids {
        handle.watch_task(task_id);
    }

    tracing::info!(
        tenant_id = %tenant_ctx.tenant_id,
        user_id = %tenant_ctx.user_id,
        "Event stream opened"
    );

    // The handle lives inside the closure; dropping the stream closes the
    // hub connection and updates presence.
    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let _keep_registered = &handle;
        match result {
            Ok(event) => Event::default()
                .event(event.kind())
                .json_data(&event)
                .ok()
                .map(Ok),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Event stream lagged, oldest events dropped");
                Event::default()
                    .event("GAP")
                    .json_data(&serde_json::json!({ "missed": missed }))
                    .ok()
                    .map(Ok)
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keep-alive"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_lists_parse_with_whitespace_and_empties() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!(" {} , {} ,", a, b);
        assert_eq!(parse_id_list(Some(&raw)).unwrap(), vec![a, b]);
        assert!(parse_id_list(None).unwrap().is_empty());
        assert!(parse_id_list(Some("")).unwrap().is_empty());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(parse_id_list(Some("not-a-uuid")).is_err());
    }
}

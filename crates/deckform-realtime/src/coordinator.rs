use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use deckform_core::models::{AssemblyMutation, Comment, HubEvent};
use deckform_core::{order, AppError};
use deckform_db::{AssemblyRepository, SlideRepository, TenantRepository};

use crate::hub::NotificationHub;
use crate::locks::AssemblyLocks;

/// What a mutation produced, echoed back to the caller so it does not have
/// to wait for its own event on the push channel.
#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MutationOutcome {
    Order { order: Vec<Uuid> },
    Comment { comment: Comment },
}

/// Applies collaborative mutations with per-assembly serialization.
///
/// Permission checks run before the assembly slot is taken so unauthorized
/// callers never queue behind real work. Tenant liveness is re-checked
/// inside the slot: a tenant suspended mid-flight aborts the mutation
/// rather than landing one last write. Events publish only after the
/// database commit.
pub struct CollaborationCoordinator {
    locks: AssemblyLocks,
    tenants: TenantRepository,
    assemblies: AssemblyRepository,
    slides: SlideRepository,
    hub: Arc<NotificationHub>,
}

impl CollaborationCoordinator {
    pub fn new(
        tenants: TenantRepository,
        assemblies: AssemblyRepository,
        slides: SlideRepository,
        hub: Arc<NotificationHub>,
    ) -> Self {
        Self {
            locks: AssemblyLocks::new(),
            tenants,
            assemblies,
            slides,
            hub,
        }
    }

    pub async fn apply_mutation(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        assembly_id: Uuid,
        mutation: AssemblyMutation,
    ) -> Result<MutationOutcome, AppError> {
        let role = self
            .assemblies
            .member_role(tenant_id, assembly_id, user_id)
            .await?
            .ok_or_else(|| AppError::Forbidden("Not a member of this assembly".to_string()))?;

        let needs_edit = !matches!(mutation, AssemblyMutation::AddComment { .. });
        if needs_edit && !role.can_edit() {
            return Err(AppError::Forbidden(
                "Editing this assembly requires the edit role".to_string(),
            ));
        }

        if let AssemblyMutation::InsertItem { slide_id, .. } = &mutation {
            let found = self.slides.count_existing(tenant_id, &[*slide_id]).await?;
            if found != 1 {
                return Err(AppError::NotFound(format!("Slide {} not found", slide_id)));
            }
        }

        let _slot = self.locks.acquire(assembly_id).await;

        // tenant may have been suspended while this mutation queued
        self.tenants.get_active(tenant_id).await?;

        if self.assemblies.get(tenant_id, assembly_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "Assembly {} not found",
                assembly_id
            )));
        }

        match mutation {
            AssemblyMutation::AddComment { slide_id, body } => {
                if body.trim().is_empty() {
                    return Err(AppError::InvalidInput(
                        "Comment body cannot be empty".to_string(),
                    ));
                }
                let comment = self
                    .assemblies
                    .add_comment(tenant_id, assembly_id, slide_id, user_id, &body)
                    .await?;
                info!(
                    tenant_id = %tenant_id,
                    assembly_id = %assembly_id,
                    comment_id = %comment.id,
                    "comment added"
                );
                self.hub.publish(
                    tenant_id,
                    HubEvent::CommentAdded {
                        assembly_id,
                        comment: comment.clone(),
                    },
                );
                Ok(MutationOutcome::Comment { comment })
            }
            mutation => {
                // the three remaining variants all carry an order op
                let op = mutation
                    .as_order_op()
                    .ok_or_else(|| AppError::Internal("Mutation has no order op".to_string()))?;

                let mut current = self.assemblies.load_order(tenant_id, assembly_id).await?;
                if !order::apply(&mut current, &op) {
                    debug!(
                        assembly_id = %assembly_id,
                        "order mutation was a no-op against current state"
                    );
                    return Ok(MutationOutcome::Order { order: current });
                }

                self.assemblies
                    .store_order(tenant_id, assembly_id, &current)
                    .await?;
                info!(
                    tenant_id = %tenant_id,
                    assembly_id = %assembly_id,
                    user_id = %user_id,
                    items = current.len(),
                    "assembly order updated"
                );
                self.hub.publish(
                    tenant_id,
                    HubEvent::AssemblyChanged {
                        assembly_id,
                        resulting_order: current.clone(),
                        changed_by: user_id,
                    },
                );
                Ok(MutationOutcome::Order { order: current })
            }
        }
    }
}

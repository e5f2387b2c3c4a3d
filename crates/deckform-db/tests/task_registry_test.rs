//! Task registry integration tests: terminal states never change again.
//!
//! Run with: `cargo test -p deckform-db --test task_registry_test`
//! Requires Docker for testcontainers (Postgres).

mod helpers;

use deckform_core::models::TaskStatus;
use deckform_db::{TaskRepository, UploadJobRepository};
use helpers::{seed_tenant, setup_test_db};
use uuid::Uuid;

#[tokio::test]
async fn completed_task_ignores_every_late_write() {
    let db = setup_test_db().await;
    let tenant_id = seed_tenant(&db.pool).await;
    let jobs = UploadJobRepository::new(db.pool.clone());
    let tasks = TaskRepository::new(db.pool.clone());

    let user_id = Uuid::new_v4();
    let outcome = jobs
        .confirm(tenant_id, user_id, "uploads/terminal", "deck.json")
        .await
        .unwrap();
    let task_id = outcome.job.task_id;

    assert!(tasks.mark_started(tenant_id, task_id).await.unwrap());
    assert!(tasks
        .complete(tenant_id, task_id, serde_json::json!({"slide_count": 3}))
        .await
        .unwrap());

    // Late writes from a presumed-dead worker degrade to no-ops.
    assert!(!tasks
        .update_progress(tenant_id, task_id, 0.5, "slide 2 of 4")
        .await
        .unwrap());
    assert!(!tasks.fail(tenant_id, task_id, "store timeout").await.unwrap());
    assert!(!tasks
        .complete(tenant_id, task_id, serde_json::json!({"slide_count": 99}))
        .await
        .unwrap());
    assert!(!tasks.request_cancel(tenant_id, task_id).await.unwrap());

    let task = tasks.get(tenant_id, task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 1.0);
    assert_eq!(task.result, Some(serde_json::json!({"slide_count": 3})));
    assert!(task.error_message.is_none());
    assert!(!task.cancel_requested);
}

#[tokio::test]
async fn failed_task_cannot_be_completed_afterwards() {
    let db = setup_test_db().await;
    let tenant_id = seed_tenant(&db.pool).await;
    let jobs = UploadJobRepository::new(db.pool.clone());
    let tasks = TaskRepository::new(db.pool.clone());

    let outcome = jobs
        .confirm(tenant_id, Uuid::new_v4(), "uploads/failing", "deck.json")
        .await
        .unwrap();
    let task_id = outcome.job.task_id;

    assert!(tasks.mark_started(tenant_id, task_id).await.unwrap());
    assert!(tasks.fail(tenant_id, task_id, "cancelled").await.unwrap());

    assert!(!tasks
        .complete(tenant_id, task_id, serde_json::json!({"slide_count": 1}))
        .await
        .unwrap());

    let task = tasks.get(tenant_id, task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_message.as_deref(), Some("cancelled"));
}

#[tokio::test]
async fn mark_started_is_a_one_shot_transition() {
    let db = setup_test_db().await;
    let tenant_id = seed_tenant(&db.pool).await;
    let jobs = UploadJobRepository::new(db.pool.clone());
    let tasks = TaskRepository::new(db.pool.clone());

    let outcome = jobs
        .confirm(tenant_id, Uuid::new_v4(), "uploads/once", "deck.json")
        .await
        .unwrap();
    let task_id = outcome.job.task_id;

    assert!(tasks.mark_started(tenant_id, task_id).await.unwrap());
    assert!(!tasks.mark_started(tenant_id, task_id).await.unwrap());

    // Cancellation flag is writable while processing and readable by workers.
    assert!(tasks.request_cancel(tenant_id, task_id).await.unwrap());
    assert!(tasks.cancel_requested(task_id).await.unwrap());
}

//! Storage abstraction trait
//!
//! The core never embeds backend details; repositories and workers hold an
//! `Arc<dyn Storage>` and address blobs by opaque key only.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable blob storage, addressed by opaque keys.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write a blob at the given key, replacing any existing content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Read a blob by key.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete a blob by key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}

//! Deckform Core Library
//!
//! This crate provides core domain models, error types, configuration, and the
//! pure assembly-order algebra shared across all Deckform components.

pub mod config;
pub mod error;
pub mod models;
pub mod order;
pub mod worker_error;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use worker_error::{WorkerError, WorkerResultExt};

//! Deckform Storage Library
//!
//! Object-store abstraction for raw uploads and derived artifacts, plus the
//! signed-token scheme that authorizes direct byte PUTs.
//!
//! # Storage key format
//!
//! Keys are opaque: `uploads/{uuid}` for raw uploads, `artifacts/{uuid}` for
//! derived artifacts. Deliberately NO tenant information is embedded in keys -
//! tenant scoping is enforced only by the owning database row, so there is a
//! single source of truth for isolation. Keys must not contain `..` or a
//! leading `/`.

pub mod keys;
pub mod local;
pub mod token;
pub mod traits;

pub use keys::{artifact_key, upload_key, upload_key_for, validate_key};
pub use local::LocalStorage;
pub use token::UploadTokenSigner;
pub use traits::{Storage, StorageError, StorageResult};

//! Opaque storage key generation.
//!
//! Keys carry no tenant information; the owning database row is the only
//! source of truth for who a blob belongs to.

use crate::{StorageError, StorageResult};
use uuid::Uuid;

/// Key for a raw upload blob.
pub fn upload_key() -> String {
    upload_key_for(Uuid::new_v4())
}

/// Key for the raw upload blob of a known upload id.
pub fn upload_key_for(upload_id: Uuid) -> String {
    format!("uploads/{}", upload_id)
}

/// Key for a derived artifact blob.
pub fn artifact_key() -> String {
    format!("artifacts/{}", Uuid::new_v4())
}

/// Reject keys that could escape the store or alias another object.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains("..")
        || key.contains('\\')
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.'))
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_validate_and_contain_no_tenant() {
        let key = upload_key();
        assert!(key.starts_with("uploads/"));
        assert!(validate_key(&key).is_ok());

        let key = artifact_key();
        assert!(key.starts_with("artifacts/"));
        assert!(validate_key(&key).is_ok());
    }

    #[test]
    fn traversal_keys_are_rejected() {
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key("/absolute").is_err());
        assert!(validate_key("uploads/../../secret").is_err());
        assert!(validate_key("uploads\\windows").is_err());
        assert!(validate_key("").is_err());
    }
}

//! Caller identity extraction.
//!
//! Identity arrives on upstream-verified headers; this service never sees
//! credentials. The extractor validates that the tenant exists and is
//! active, so every handler taking a `TenantContext` starts from a live
//! tenant.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use deckform_core::models::Tenant;
use deckform_core::AppError;

use crate::error::HttpAppError;
use crate::state::AppState;

pub const TENANT_HEADER: &str = "x-deckform-tenant";
pub const USER_HEADER: &str = "x-deckform-user";
pub const ROLE_HEADER: &str = "x-deckform-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Member,
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl Display for UserRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Member => write!(f, "member"),
        }
    }
}

impl FromStr for UserRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "member" => Ok(UserRole::Member),
            other => Err(AppError::Unauthorized(format!("Unknown role: {}", other))),
        }
    }
}

/// Caller identity, validated against the tenant table per request.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
    pub tenant: Tenant,
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    let value = parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", name)))?;
    Uuid::parse_str(value)
        .map_err(|_| AppError::Unauthorized(format!("Invalid {} header", name)))
}

impl FromRequestParts<Arc<AppState>> for TenantContext {
    type Rejection = HttpAppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let tenant_id = header_uuid(parts, TENANT_HEADER)?;
        let user_id = header_uuid(parts, USER_HEADER)?;
        let role = match parts.headers.get(ROLE_HEADER) {
            Some(value) => value
                .to_str()
                .map_err(|_| AppError::Unauthorized(format!("Invalid {} header", ROLE_HEADER)))?
                .parse()?,
            None => UserRole::Member,
        };

        let tenant = state.tenants.get_active(tenant_id).await?;

        Ok(TenantContext {
            tenant_id,
            user_id,
            role,
            tenant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_defaults_are_strict() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("member".parse::<UserRole>().unwrap(), UserRole::Member);
        assert!("root".parse::<UserRole>().is_err());
        assert!("Admin".parse::<UserRole>().is_err());
    }

    #[test]
    fn only_admin_is_admin() {
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::Member.is_admin());
    }
}

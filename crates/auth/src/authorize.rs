use thiserror::Error;

use crate::{Permission, PermissionTable, Role};

/// Why a permission check did not pass.
///
/// The `Display` text doubles as the client-facing message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Insufficient permissions")]
    Forbidden(Permission),
}

/// Authorize a role against the permission table.
///
/// - No IO
/// - No panics
/// - Unknown roles are denied, never treated as wildcard
pub fn authorize(
    table: &PermissionTable,
    role: Option<&Role>,
    required: &Permission,
) -> Result<(), AuthzError> {
    let role = role.ok_or(AuthzError::AuthenticationRequired)?;

    if table.grants(role, required) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.clone()))
    }
}

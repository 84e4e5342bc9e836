use thiserror::Error;

use cmsgate_core::DomainError;

use crate::authorize::AuthzError;
use crate::credentials::StoreError;
use crate::password::PasswordError;
use crate::session::SessionError;

/// Everything the auth layer can refuse or fail with.
///
/// `Display` is for logs. Clients see [`AuthError::user_message`].
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("user already exists")]
    DuplicateUser,

    #[error("csrf token missing or invalid")]
    InvalidCsrf,

    #[error("session expired")]
    SessionExpired,

    #[error("insufficient permissions")]
    InsufficientPermissions,

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("too many attempts")]
    RateLimited,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Client-safe message. Infrastructure detail never leaks.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::DuplicateUser => "User already exists".to_string(),
            Self::InvalidCsrf => "Invalid security token".to_string(),
            Self::SessionExpired => "Session expired. Please login again.".to_string(),
            Self::InsufficientPermissions => "Insufficient permissions".to_string(),
            Self::AuthenticationRequired => "Authentication required".to_string(),
            Self::RateLimited => "Too many attempts. Please try again later.".to_string(),
            Self::Validation(msg) => msg.clone(),
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => {
                "An internal error occurred. Please try again.".to_string()
            }
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.message().to_string())
    }
}

impl From<AuthzError> for AuthError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::AuthenticationRequired => Self::AuthenticationRequired,
            AuthzError::Forbidden(_) => Self::InsufficientPermissions,
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        Self::Internal(err.to_string())
    }
}

//! `cmsgate-auth`: session-based authentication and role authorization.
//!
//! This crate is decoupled from HTTP. Storage is reached only through the
//! [`CredentialStore`] trait; the transport interprets [`GuardOutcome`]s.

pub mod activity;
pub mod authenticator;
pub mod authorize;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod csrf;
pub mod error;
pub mod guard;
pub mod password;
pub mod permission_table;
pub mod permissions;
pub mod rate_limit;
pub mod roles;
pub mod session;
pub mod token;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

pub use activity::{ActivityRecorder, ClientInfo};
pub use authenticator::{Authenticator, LoginSuccess};
pub use authorize::{AuthzError, authorize};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AuthConfig;
pub use credentials::{ActivityLogEntry, CredentialStore, StoreError};
pub use csrf::CsrfGuard;
pub use error::AuthError;
pub use guard::{AccessGuard, CurrentUser, GuardOutcome};
pub use password::{PasswordError, PasswordParams, hash_password, needs_rehash, verify_password};
pub use permission_table::PermissionTable;
pub use permissions::Permission;
pub use rate_limit::{
    NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimitSettings, RateLimiter,
    WindowRateLimiter, rate_limiter,
};
pub use roles::Role;
pub use session::{DEFAULT_ROTATION_GRACE_SECS, SessionError, SessionId, SessionStore};
pub use token::{OsTokenSource, TokenSource};
pub use user::{NewUser, SessionUser, User, UserView};

//! Access gating applied before any handler logic runs.
//!
//! Page routes get a [`GuardOutcome`] and let the transport turn it into a
//! redirect or a 403. API routes use [`AccessGuard::check_permission`], which
//! never terminates the request on its own.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use cmsgate_core::UserId;

use crate::activity::{ActivityRecorder, ClientInfo};
use crate::authorize::{AuthzError, authorize};
use crate::config::AuthConfig;
use crate::credentials::CredentialStore;
use crate::error::AuthError;
use crate::session::{SessionError, SessionId, SessionStore};
use crate::{Permission, PermissionTable, Role, SessionUser};

pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please login again.";
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied. Insufficient permissions.";

/// What the transport should do with a gated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allowed,
    /// Send the visitor elsewhere, optionally carrying a one-shot message.
    RedirectTo { path: String, flash: Option<String> },
    Forbidden { message: String },
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Identity plus the optional profile values collaborators store in the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
}

/// Lifecycle state of a session as the guard sees it.
enum Liveness {
    Anonymous,
    Expired,
    Live(SessionUser),
}

pub struct AccessGuard {
    sessions: Arc<SessionStore>,
    store: Arc<dyn CredentialStore>,
    activity: ActivityRecorder,
    table: PermissionTable,
    login_path: String,
    timeout: TimeDelta,
}

impl core::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessGuard")
            .field("login_path", &self.login_path)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AccessGuard {
    pub fn new(
        sessions: Arc<SessionStore>,
        store: Arc<dyn CredentialStore>,
        activity: ActivityRecorder,
        config: &AuthConfig,
    ) -> Self {
        Self {
            sessions,
            store,
            activity,
            table: config.roles.clone(),
            login_path: config.login_path.clone(),
            timeout: config.session_timeout(),
        }
    }

    /// Inspect without mutating.
    fn liveness(&self, session: &SessionId) -> Liveness {
        let now = self.sessions.clock().now();
        let timeout = self.timeout;
        self.sessions
            .with_session(session, |s| match &s.user {
                None => Liveness::Anonymous,
                Some(_) if s.is_expired(now, timeout) => Liveness::Expired,
                Some(user) => Liveness::Live(user.clone()),
            })
            .unwrap_or(Liveness::Anonymous)
    }

    fn to_login(&self, flash: Option<&str>) -> GuardOutcome {
        GuardOutcome::RedirectTo {
            path: self.login_path.clone(),
            flash: flash.map(str::to_string),
        }
    }

    /// Must be logged in with an unexpired session. Extends the session on success.
    pub fn require_auth(&self, session: &SessionId) -> Result<GuardOutcome, SessionError> {
        Ok(match self.authenticate(session)? {
            Ok(_) => GuardOutcome::Allowed,
            Err(outcome) => outcome,
        })
    }

    /// Check, expire and extend under one session lock.
    fn authenticate(
        &self,
        session: &SessionId,
    ) -> Result<Result<SessionUser, GuardOutcome>, SessionError> {
        let now = self.sessions.clock().now();
        let timeout = self.timeout;
        let state = self.sessions.with_session(session, |s| {
            let Some(user) = s.user.clone() else {
                return Liveness::Anonymous;
            };
            if s.is_expired(now, timeout) {
                return Liveness::Expired;
            }
            s.last_extended_at = Some(now);
            Liveness::Live(user)
        });

        match state {
            Ok(Liveness::Live(user)) => Ok(Ok(user)),
            Ok(Liveness::Anonymous) | Err(SessionError::UnknownSession) => {
                Ok(Err(self.to_login(None)))
            }
            Ok(Liveness::Expired) => {
                self.sessions.destroy(session)?;
                tracing::info!("expired session destroyed by guard");
                Ok(Err(self.to_login(Some(SESSION_EXPIRED_MESSAGE))))
            }
            Err(err) => Err(err),
        }
    }

    pub fn require_role(&self, session: &SessionId, role: &Role) -> Result<GuardOutcome, SessionError> {
        self.require_any_role(session, std::slice::from_ref(role))
    }

    /// Authenticated and holding one of `roles`.
    pub fn require_any_role(
        &self,
        session: &SessionId,
        roles: &[Role],
    ) -> Result<GuardOutcome, SessionError> {
        let user = match self.authenticate(session)? {
            Ok(user) => user,
            Err(outcome) => return Ok(outcome),
        };

        if roles.contains(&user.role) {
            Ok(GuardOutcome::Allowed)
        } else {
            tracing::info!(user_id = %user.id, role = %user.role, "role check denied");
            Ok(GuardOutcome::Forbidden {
                message: ACCESS_DENIED_MESSAGE.to_string(),
            })
        }
    }

    /// Permission check against the role table. Does not extend or destroy.
    pub fn check_permission(&self, session: &SessionId, permission: &Permission) -> Result<(), AuthzError> {
        let role = match self.liveness(session) {
            Liveness::Live(user) => Some(user.role),
            Liveness::Anonymous | Liveness::Expired => None,
        };
        authorize(&self.table, role.as_ref(), permission)
    }

    /// Permission check against permissions granted directly to the user in
    /// the credential store. Exact match only; the role table is not consulted.
    pub async fn check_stored_permission(
        &self,
        session: &SessionId,
        permission: &Permission,
    ) -> Result<(), AuthError> {
        let Liveness::Live(user) = self.liveness(session) else {
            return Err(AuthError::AuthenticationRequired);
        };

        let granted: BTreeSet<Permission> = self
            .store
            .find_permissions_for_user(user.id)
            .await
            .inspect_err(|err| tracing::error!(user_id = %user.id, error = %err, "permission lookup failed"))?;

        if granted.contains(permission) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions)
        }
    }

    /// Append an activity entry for the session's user. No-op when anonymous.
    pub fn log_activity(
        &self,
        session: &SessionId,
        action: &str,
        description: &str,
        client: &ClientInfo,
    ) {
        if let Some(user_id) = self.sessions.user_id(session) {
            self.activity.record(user_id, action, description, client);
        }
    }

    pub fn current_user(&self, session: &SessionId) -> Option<CurrentUser> {
        let user = self.sessions.user(session)?;
        let text = |key: &str| {
            self.sessions
                .get(session, key)
                .and_then(|v| v.as_str().map(str::to_string))
        };
        Some(CurrentUser {
            first_name: text("first_name"),
            last_name: text("last_name"),
            department: text("department"),
            position: text("position"),
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
        })
    }
}

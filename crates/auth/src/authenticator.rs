//! Credential verification and the login / logout / register flows.

use std::sync::Arc;

use cmsgate_core::Email;

use crate::activity::{ActivityRecorder, ClientInfo};
use crate::credentials::{CredentialStore, StoreError};
use crate::error::AuthError;
use crate::password::{PasswordError, PasswordParams, hash_password, needs_rehash, verify_password};
use crate::session::{SessionId, SessionStore};
use crate::{NewUser, Role, User, UserView};

/// Verified against when the email is unknown, so both failure paths cost the
/// same argon2 work.
const DUMMY_PASSWORD: &str = "cmsgate-timing-equalizer";

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSuccess {
    /// Freshly minted; never a pre-login id.
    pub session_id: SessionId,
    pub user: UserView,
}

pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    sessions: Arc<SessionStore>,
    activity: ActivityRecorder,
    password: PasswordParams,
    dummy_hash: String,
}

impl core::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Authenticator")
            .field("password", &self.password)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Fails only if `password` holds parameters argon2 rejects.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sessions: Arc<SessionStore>,
        activity: ActivityRecorder,
        password: PasswordParams,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hash_password(DUMMY_PASSWORD, password)?;
        Ok(Self {
            store,
            sessions,
            activity,
            password,
            dummy_hash,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Verify credentials and open a new authenticated session.
    ///
    /// Unknown email and wrong password fail identically for the caller.
    #[tracing::instrument(skip_all)]
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<LoginSuccess, AuthError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AuthError::Validation("Email and password are required".to_string()));
        }
        let email = Email::parse(email)?;

        let user = self
            .store
            .find_user_by_email(email.as_str())
            .await
            .inspect_err(|err| tracing::error!(error = %err, "login lookup failed"))?;

        let Some(user) = user else {
            // Burn the same work as a real verification, then fail.
            let _ = verify_blocking(password, &self.dummy_hash).await?;
            tracing::info!("login failed: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        match verify_blocking(password, &user.password_hash).await? {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(user_id = %user.id, "login failed: wrong password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(err) => {
                tracing::error!(user_id = %user.id, error = %err, "stored password hash is unusable");
                return Err(AuthError::InvalidCredentials);
            }
        }

        if needs_rehash(&user.password_hash) {
            self.upgrade_hash(&user, password).await;
        }

        let view = user.view();
        let session_id = self.sessions.create(view.clone())?;
        self.activity
            .record(view.id, "login", "User logged in", client);
        tracing::info!(user_id = %view.id, role = %view.role, "login succeeded");

        Ok(LoginSuccess {
            session_id,
            user: view,
        })
    }

    /// Create a user. Does not log them in.
    #[tracing::instrument(skip_all)]
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Option<Role>,
    ) -> Result<UserView, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::Validation("Username is required".to_string()));
        }
        let email = Email::parse(email)?;
        if password.is_empty() {
            return Err(AuthError::Validation("Password is required".to_string()));
        }

        let existing = self
            .store
            .find_user_by_email_or_username(email.as_str(), username)
            .await
            .inspect_err(|err| tracing::error!(error = %err, "registration lookup failed"))?;
        if existing.is_some() {
            return Err(AuthError::DuplicateUser);
        }

        let params = self.password;
        let plain = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&plain, params))
            .await
            .map_err(|e| AuthError::Internal(format!("password worker failed: {e}")))??;

        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role: role.unwrap_or_default(),
        };
        let role = new_user.role.clone();

        let id = match self.store.insert_user(new_user).await {
            Ok(id) => id,
            Err(StoreError::Conflict(constraint)) => {
                tracing::info!(constraint = %constraint, "registration lost a uniqueness race");
                return Err(AuthError::DuplicateUser);
            }
            Err(err) => {
                tracing::error!(error = %err, "user insert failed");
                return Err(err.into());
            }
        };
        tracing::info!(user_id = %id, role = %role, "user registered");

        Ok(UserView {
            id,
            username: username.to_string(),
            email: email.into(),
            role,
        })
    }

    /// Re-store a legacy hash as Argon2id. Failure is logged, never fatal.
    async fn upgrade_hash(&self, user: &User, password: &str) {
        let params = self.password;
        let plain = password.to_string();
        let hashed = tokio::task::spawn_blocking(move || hash_password(&plain, params)).await;
        let hash = match hashed {
            Ok(Ok(hash)) => hash,
            Ok(Err(err)) => {
                tracing::warn!(user_id = %user.id, error = %err, "password rehash failed");
                return;
            }
            Err(err) => {
                tracing::warn!(user_id = %user.id, error = %err, "password worker failed");
                return;
            }
        };
        match self.store.update_password_hash(user.id, hash).await {
            Ok(()) => tracing::info!(user_id = %user.id, "legacy password hash upgraded"),
            Err(err) => tracing::warn!(user_id = %user.id, error = %err, "password hash upgrade not stored"),
        }
    }

    /// End the session. Safe to call on unknown or anonymous sessions.
    pub fn logout(&self, session: &SessionId, client: &ClientInfo) -> Result<(), AuthError> {
        if let Some(user_id) = self.sessions.user_id(session) {
            self.activity
                .record(user_id, "logout", "User logged out", client);
            tracing::info!(user_id = %user_id, "logout");
        }
        self.sessions.destroy(session)?;
        Ok(())
    }

    pub fn current_user(&self, session: &SessionId) -> Option<UserView> {
        self.sessions.user(session)
    }

    pub fn has_role(&self, session: &SessionId, role: &Role) -> bool {
        self.sessions.role(session).as_ref() == Some(role)
    }
}

async fn verify_blocking(
    password: &str,
    hash: &str,
) -> Result<Result<bool, PasswordError>, AuthError> {
    let (password, hash) = (password.to_string(), hash.to_string());
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(format!("password worker failed: {e}")))
}

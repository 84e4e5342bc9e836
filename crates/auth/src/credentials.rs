//! Persistence seam: users, activity log and stored per-user permissions.
//!
//! Implementations live in `cmsgate-infra` (in-memory and Postgres). The auth
//! layer never mutates users beyond inserting new ones on registration.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cmsgate_core::UserId;

use crate::{NewUser, Permission, User};

/// Append-only record of something a user did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub user_id: UserId,
    pub action: String,
    pub description: String,
    pub ip_address: String,
    pub occurred_at: DateTime<Utc>,
}

/// Credential store failure.
///
/// The detail is for server-side logs only; clients get a generic message.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint (email / username) rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("credential store unavailable: {0}")]
    Unavailable(String),

    #[error("credential store query failed: {0}")]
    Query(String),
}

/// Credential store abstraction.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Any user whose email OR username matches.
    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: NewUser) -> Result<UserId, StoreError>;

    /// Replace a user's stored hash (legacy hash upgrade on login).
    async fn update_password_hash(&self, user_id: UserId, password_hash: String) -> Result<(), StoreError>;

    async fn insert_activity_log(&self, entry: ActivityLogEntry) -> Result<(), StoreError>;

    /// Directly granted permissions (alternative to the static role table).
    async fn find_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<Permission>, StoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_email(email).await
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        (**self).find_user_by_email_or_username(email, username).await
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserId, StoreError> {
        (**self).insert_user(user).await
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: String) -> Result<(), StoreError> {
        (**self).update_password_hash(user_id, password_hash).await
    }

    async fn insert_activity_log(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        (**self).insert_activity_log(entry).await
    }

    async fn find_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<Permission>, StoreError> {
        (**self).find_permissions_for_user(user_id).await
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use cmsgate_auth::{ActivityLogEntry, CredentialStore, NewUser, Permission, StoreError, User};
use cmsgate_core::UserId;

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    activity: Vec<ActivityLogEntry>,
    user_permissions: BTreeMap<UserId, BTreeSet<Permission>>,
    next_id: i64,
}

/// In-memory credential store.
///
/// Intended for tests/dev. Enforces the same uniqueness rules as the
/// Postgres schema (email and username are each unique).
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    tables: RwLock<Tables>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a permission directly to a user (the `user_permissions` table).
    pub fn grant_permission(&self, user_id: UserId, permission: Permission) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::Query(format!("no user with id {user_id}")));
        }
        tables
            .user_permissions
            .entry(user_id)
            .or_default()
            .insert(permission);
        Ok(())
    }

    /// Snapshot of the activity log. The auth layer never reads it back.
    pub fn activity(&self) -> Vec<ActivityLogEntry> {
        self.tables
            .read()
            .map(|t| t.activity.clone())
            .unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.tables.read().map(|t| t.users.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .users
            .values()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserId, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;

        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("users_username_key".to_string()));
        }

        tables.next_id += 1;
        let id = UserId::new(tables.next_id);
        tables.users.insert(id, user.into_user(id));
        Ok(id)
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: String) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::Query(format!("no user with id {user_id}")))?;
        user.password_hash = password_hash;
        Ok(())
    }

    async fn insert_activity_log(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.activity.push(entry);
        Ok(())
    }

    async fn find_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<Permission>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .user_permissions
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

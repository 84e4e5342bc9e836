//! Test doubles shared by the unit tests in this crate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use cmsgate_core::UserId;

use crate::credentials::{ActivityLogEntry, CredentialStore, StoreError};
use crate::password::{PasswordParams, hash_password};
use crate::{NewUser, Permission, Role, User};

/// Cheap argon2 parameters so tests don't spend seconds hashing.
pub(crate) const FAST_PARAMS: PasswordParams = PasswordParams {
    memory_kib: 8,
    iterations: 1,
    parallelism: 1,
};

#[derive(Debug, Default)]
pub(crate) struct FakeStore {
    users: Mutex<Vec<User>>,
    activity: Mutex<Vec<ActivityLogEntry>>,
    permissions: Mutex<BTreeMap<UserId, BTreeSet<Permission>>>,
    fail_lookups: AtomicBool,
    fail_activity: AtomicBool,
    /// Simulates a concurrent registration winning the unique index.
    conflict_on_insert: AtomicBool,
}

impl FakeStore {
    pub(crate) fn with_user(self, username: &str, email: &str, password: &str, role: &str) -> Self {
        let hash = hash_password(password, FAST_PARAMS).unwrap();
        {
            let mut users = self.users.lock().unwrap();
            let id = UserId::new(users.len() as i64 + 1);
            users.push(User {
                id,
                username: username.to_string(),
                email: email.to_string(),
                password_hash: hash,
                role: Role::new(role.to_string()),
            });
        }
        self
    }

    pub(crate) fn with_raw_hash(self, email: &str, password_hash: &str) -> Self {
        {
            let mut users = self.users.lock().unwrap();
            let id = UserId::new(users.len() as i64 + 1);
            users.push(User {
                id,
                username: email.to_string(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role: Role::default(),
            });
        }
        self
    }

    pub(crate) fn grant(&self, user_id: UserId, permission: &'static str) {
        self.permissions
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .insert(Permission::new(permission));
    }

    pub(crate) fn fail_lookups(&self, on: bool) {
        self.fail_lookups.store(on, Ordering::SeqCst);
    }

    pub(crate) fn fail_activity(&self, on: bool) {
        self.fail_activity.store(on, Ordering::SeqCst);
    }

    pub(crate) fn conflict_on_insert(&self, on: bool) {
        self.conflict_on_insert.store(on, Ordering::SeqCst);
    }

    pub(crate) fn activity(&self) -> Vec<ActivityLogEntry> {
        self.activity.lock().unwrap().clone()
    }

    pub(crate) fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    /// Wait for background appends to land.
    pub(crate) async fn eventually_activity(&self, at_least: usize) -> Vec<ActivityLogEntry> {
        for _ in 0..200 {
            let entries = self.activity();
            if entries.len() >= at_least {
                return entries;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected at least {at_least} activity entries, got {:?}", self.activity());
    }

    pub(crate) fn password_hash_of(&self, email: &str) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.password_hash.clone())
    }

    fn check_lookups(&self) -> Result<(), StoreError> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("fake store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FakeStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check_lookups()?;
        Ok(self.users.lock().unwrap().iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        self.check_lookups()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserId, StoreError> {
        if self.conflict_on_insert.load(Ordering::SeqCst) {
            return Err(StoreError::Conflict("users_email_key".to_string()));
        }
        let mut users = self.users.lock().unwrap();
        let id = UserId::new(users.len() as i64 + 1);
        users.push(user.into_user(id));
        Ok(id)
    }

    async fn update_password_hash(&self, user_id: UserId, password_hash: String) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::Query(format!("no user {user_id}")))?;
        user.password_hash = password_hash;
        Ok(())
    }

    async fn insert_activity_log(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        if self.fail_activity.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("activity table locked".to_string()));
        }
        self.activity.lock().unwrap().push(entry);
        Ok(())
    }

    async fn find_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<Permission>, StoreError> {
        self.check_lookups()?;
        Ok(self
            .permissions
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

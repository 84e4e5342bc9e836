//! Fire-and-forget activity logging.

use std::sync::Arc;

use cmsgate_core::UserId;

use crate::clock::Clock;
use crate::credentials::{ActivityLogEntry, CredentialStore};

/// Request metadata recorded alongside activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: None,
        }
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new("unknown")
    }
}

/// Appends activity entries without blocking the caller.
///
/// A failed append is logged at `warn` and otherwise ignored: activity logging
/// never changes the outcome of the request that triggered it.
#[derive(Clone)]
pub struct ActivityRecorder {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

impl core::fmt::Debug for ActivityRecorder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ActivityRecorder").finish_non_exhaustive()
    }
}

impl ActivityRecorder {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Spawn the append on the current runtime and return immediately.
    ///
    /// Outside a Tokio runtime the entry is dropped with a warning.
    pub fn record(
        &self,
        user_id: UserId,
        action: &str,
        description: impl Into<String>,
        client: &ClientInfo,
    ) {
        let entry = ActivityLogEntry {
            user_id,
            action: action.to_string(),
            description: description.into(),
            ip_address: client.ip_address.clone(),
            occurred_at: self.clock.now(),
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(user_id = %user_id, action, "no runtime; activity entry dropped");
            return;
        };

        let store = self.store.clone();
        handle.spawn(async move {
            let action = entry.action.clone();
            if let Err(err) = store.insert_activity_log(entry).await {
                tracing::warn!(user_id = %user_id, action = %action, error = %err, "activity log append failed");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::testing::FakeStore;

    #[tokio::test]
    async fn record_appends_in_background() {
        let store = Arc::new(FakeStore::default());
        let recorder = ActivityRecorder::new(store.clone(), Arc::new(SystemClock));

        recorder.record(UserId::new(7), "login", "User logged in", &ClientInfo::new("10.0.0.1"));

        let entries = store.eventually_activity(1).await;
        assert_eq!(entries[0].action, "login");
        assert_eq!(entries[0].ip_address, "10.0.0.1");
        assert_eq!(entries[0].user_id, UserId::new(7));
    }

    #[tokio::test]
    async fn failed_append_is_swallowed() {
        let store = Arc::new(FakeStore::default());
        store.fail_activity(true);
        let recorder = ActivityRecorder::new(store.clone(), Arc::new(SystemClock));

        recorder.record(UserId::new(7), "login", "User logged in", &ClientInfo::default());
        tokio::task::yield_now().await;
        assert!(store.activity().is_empty());
    }

    #[test]
    fn without_runtime_nothing_panics() {
        let store = Arc::new(FakeStore::default());
        let recorder = ActivityRecorder::new(store.clone(), Arc::new(SystemClock));
        recorder.record(UserId::new(1), "logout", "User logged out", &ClientInfo::default());
        assert!(store.activity().is_empty());
    }
}

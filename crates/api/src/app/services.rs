//! Service wiring: one `AppState` shared by every handler.

use std::sync::Arc;
use std::time::Duration;

use cmsgate_auth::{
    AccessGuard, ActivityRecorder, AuthError, Authenticator, Clock, CredentialStore, CsrfGuard,
    OsTokenSource, RateLimiter, Role, SessionStore, SystemClock, rate_limiter,
};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, SeedAdmin};
use crate::render::{PageRenderer, PlainPageRenderer};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionStore>,
    pub csrf: CsrfGuard,
    pub authenticator: Arc<Authenticator>,
    pub guard: Arc<AccessGuard>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub renderer: Arc<dyn PageRenderer>,
}

impl core::fmt::Debug for AppState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

/// Build the service graph on the system clock.
pub async fn build_services(
    config: AppConfig,
    store: Arc<dyn CredentialStore>,
) -> Result<AppState, AuthError> {
    build_services_with_clock(config, store, Arc::new(SystemClock)).await
}

/// As [`build_services`] with an injected clock (tests drive expiry with it).
pub async fn build_services_with_clock(
    config: AppConfig,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
) -> Result<AppState, AuthError> {
    let sessions = Arc::new(
        SessionStore::new(clock.clone(), Arc::new(OsTokenSource))
            .with_rotation_grace(config.auth.rotation_grace()),
    );
    let rate_limiter = rate_limiter(config.auth.rate_limit, clock.clone());
    let activity = ActivityRecorder::new(store.clone(), clock);

    let authenticator = Arc::new(Authenticator::new(
        store.clone(),
        sessions.clone(),
        activity.clone(),
        config.auth.password,
    )?);
    let guard = Arc::new(AccessGuard::new(
        sessions.clone(),
        store,
        activity,
        &config.auth,
    ));

    if let Some(seed) = &config.seed_admin {
        seed_admin(&authenticator, seed).await?;
    }

    Ok(AppState {
        csrf: CsrfGuard::new(sessions.clone()),
        config: Arc::new(config),
        sessions,
        authenticator,
        guard,
        rate_limiter,
        renderer: Arc::new(PlainPageRenderer),
    })
}

/// Periodically drop idle sessions. `None` when the interval is zero.
pub fn spawn_session_reaper(state: &AppState) -> Option<JoinHandle<()>> {
    let every = state.config.auth.purge_interval_secs;
    if every == 0 {
        return None;
    }
    Some(spawn_reaper(
        state.sessions.clone(),
        state.config.auth.session_timeout(),
        Duration::from_secs(every),
    ))
}

fn spawn_reaper(sessions: Arc<SessionStore>, timeout: chrono::TimeDelta, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match sessions.purge_expired(timeout) {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, remaining = sessions.len(), "idle sessions reaped"),
                Err(err) => tracing::warn!(error = %err, "session reap failed"),
            }
        }
    })
}

/// Create the seed account unless it already exists.
async fn seed_admin(authenticator: &Authenticator, seed: &SeedAdmin) -> Result<(), AuthError> {
    match authenticator
        .register(
            &seed.username,
            &seed.email,
            &seed.password,
            Some(Role::new(seed.role.clone())),
        )
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, email = %user.email, "seed account created");
            Ok(())
        }
        Err(AuthError::DuplicateUser) => {
            tracing::debug!(email = %seed.email, "seed account already present");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use cmsgate_auth::ManualClock;
    use cmsgate_infra::InMemoryCredentialStore;

    #[tokio::test]
    async fn reaper_drops_idle_sessions() {
        let clock = Arc::new(ManualClock::default());
        let sessions = Arc::new(SessionStore::new(clock.clone(), Arc::new(OsTokenSource)));
        for _ in 0..50 {
            sessions.create_anonymous().unwrap();
        }
        clock.advance(TimeDelta::hours(2));
        let keep = sessions.create_anonymous().unwrap();

        let reaper = spawn_reaper(sessions.clone(), TimeDelta::hours(1), Duration::from_millis(10));
        for _ in 0..200 {
            if sessions.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        reaper.abort();

        assert_eq!(sessions.len(), 1);
        assert!(sessions.exists(&keep));
    }

    #[tokio::test]
    async fn zero_interval_disables_the_reaper() {
        let mut config = AppConfig::default();
        config.auth.purge_interval_secs = 0;
        config.auth.password.memory_kib = 8;
        config.auth.password.iterations = 1;
        let state = build_services(config, Arc::new(InMemoryCredentialStore::new()))
            .await
            .unwrap();
        assert!(spawn_session_reaper(&state).is_none());
    }
}

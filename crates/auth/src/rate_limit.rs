//! Attempt throttling for credential endpoints.
//!
//! Handlers ask the limiter before doing any work; a `Limited` answer becomes
//! a 429. Counting is per fixed window, keyed by client address and by the
//! normalized email, so one address cannot spray many accounts and many
//! addresses cannot hammer one account.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Window map size at which lapsed windows are swept on the next check.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    Register,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync + core::fmt::Debug {
    fn check_ip(&self, ip: &str, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

/// Limits per window. Defaults: 100 attempts per address and 10 per email
/// every 15 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub window_secs: i64,
    pub max_per_ip: u32,
    pub max_per_email: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 15 * 60,
            max_per_ip: 100,
            max_per_email: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Scope {
    Ip,
    Email,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

/// In-process fixed-window limiter.
#[derive(Debug)]
pub struct WindowRateLimiter {
    settings: RateLimitSettings,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<(RateLimitAction, Scope, String), Window>>,
}

impl WindowRateLimiter {
    pub fn new(settings: RateLimitSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn hit(&self, action: RateLimitAction, scope: Scope, key: String, max: u32) -> RateLimitDecision {
        let now = self.clock.now();
        let span = TimeDelta::seconds(self.settings.window_secs);
        let Ok(mut windows) = self.windows.lock() else {
            tracing::error!("rate limiter lock poisoned; refusing");
            return RateLimitDecision::Limited;
        };

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| now - w.started < span);
        }

        let window = windows.entry((action, scope, key)).or_insert(Window {
            started: now,
            count: 0,
        });
        if now - window.started >= span {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        if window.count >= max {
            tracing::info!(?action, ?scope, "attempt rate limited");
            return RateLimitDecision::Limited;
        }
        window.count += 1;
        RateLimitDecision::Allowed
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check_ip(&self, ip: &str, action: RateLimitAction) -> RateLimitDecision {
        self.hit(action, Scope::Ip, ip.to_string(), self.settings.max_per_ip)
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        let normalized = email.trim().to_lowercase();
        self.hit(action, Scope::Email, normalized, self.settings.max_per_email)
    }
}

/// The limiter `settings` ask for.
pub fn rate_limiter(settings: RateLimitSettings, clock: Arc<dyn Clock>) -> Arc<dyn RateLimiter> {
    if settings.enabled {
        Arc::new(WindowRateLimiter::new(settings, clock))
    } else {
        Arc::new(NoopRateLimiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(max_per_ip: u32, max_per_email: u32) -> (Arc<ManualClock>, WindowRateLimiter) {
        let clock = Arc::new(ManualClock::default());
        let settings = RateLimitSettings {
            enabled: true,
            window_secs: 60,
            max_per_ip,
            max_per_email,
        };
        (clock.clone(), WindowRateLimiter::new(settings, clock))
    }

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Login), RateLimitDecision::Allowed);
        assert_eq!(
            limiter.check_email("user@example.com", RateLimitAction::Login),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn refuses_past_the_ip_limit_until_the_window_rolls() {
        let (clock, limiter) = limiter(3, 100);
        for _ in 0..3 {
            assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Login), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Login), RateLimitDecision::Limited);
        assert_eq!(
            limiter.check_ip("10.0.0.2", RateLimitAction::Login),
            RateLimitDecision::Allowed,
            "other addresses are unaffected"
        );

        clock.advance(TimeDelta::seconds(60));
        assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Login), RateLimitDecision::Allowed);
    }

    #[test]
    fn email_key_is_normalized() {
        let (_, limiter) = limiter(100, 2);
        assert_eq!(limiter.check_email("Admin@BPO.com", RateLimitAction::Login), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_email(" admin@bpo.com", RateLimitAction::Login), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_email("admin@bpo.com", RateLimitAction::Login), RateLimitDecision::Limited);
    }

    #[test]
    fn actions_are_counted_separately() {
        let (_, limiter) = limiter(1, 100);
        assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Login), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Register), RateLimitDecision::Allowed);
        assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Login), RateLimitDecision::Limited);
    }

    #[test]
    fn disabled_settings_give_noop() {
        let settings = RateLimitSettings {
            enabled: false,
            max_per_ip: 0,
            ..RateLimitSettings::default()
        };
        let limiter = rate_limiter(settings, Arc::new(ManualClock::default()));
        assert_eq!(limiter.check_ip("10.0.0.1", RateLimitAction::Login), RateLimitDecision::Allowed);
    }
}

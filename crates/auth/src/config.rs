use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::PermissionTable;
use crate::password::PasswordParams;
use crate::rate_limit::RateLimitSettings;
use crate::session::DEFAULT_ROTATION_GRACE_SECS;

/// Auth policy knobs. Every field has a default so partial config files work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Idle time after which an authenticated session is expired.
    pub session_timeout_secs: i64,
    /// Minimum age of a session id before it is rotated.
    pub rotation_interval_secs: i64,
    /// How long a rotated-away id keeps resolving to its successor.
    pub rotation_grace_secs: i64,
    /// How often idle sessions are reaped. Zero disables the reaper.
    pub purge_interval_secs: u64,
    pub cookie_name: String,
    /// Only disable for plain-HTTP local development.
    pub cookie_secure: bool,
    pub login_path: String,
    pub error_path: String,
    pub allow_registration: bool,
    pub password: PasswordParams,
    pub rate_limit: RateLimitSettings,
    /// Role table. Deserializing this struct directly replaces the built-in
    /// table wholesale; layered config (figment) merges role keys instead.
    pub roles: PermissionTable,
}

impl AuthConfig {
    pub fn session_timeout(&self) -> TimeDelta {
        TimeDelta::seconds(self.session_timeout_secs)
    }

    pub fn rotation_interval(&self) -> TimeDelta {
        TimeDelta::seconds(self.rotation_interval_secs)
    }

    pub fn rotation_grace(&self) -> TimeDelta {
        TimeDelta::seconds(self.rotation_grace_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 3600,
            rotation_interval_secs: 300,
            rotation_grace_secs: DEFAULT_ROTATION_GRACE_SECS,
            purge_interval_secs: 300,
            cookie_name: "cmsgate_session".to_string(),
            cookie_secure: true,
            login_path: "/login.html".to_string(),
            error_path: "/error.html".to_string(),
            allow_registration: false,
            password: PasswordParams::default(),
            rate_limit: RateLimitSettings::default(),
            roles: PermissionTable::default(),
        }
    }
}

//! Process configuration.
//!
//! Sources, later ones winning:
//! 1. built-in defaults
//! 2. an optional YAML file (default `cmsgate.yaml`)
//! 3. `CMSGATE_*` environment variables, `__` separating nested keys
//!    (e.g. `CMSGATE_AUTH__SESSION_TIMEOUT_SECS=900`)
//! 4. plain `DATABASE_URL`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use cmsgate_auth::AuthConfig;

pub const DEFAULT_CONFIG_PATH: &str = "cmsgate.yaml";

/// Served on every response unless overridden.
pub const DEFAULT_CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
    style-src 'self' 'unsafe-inline' https://cdn.tailwindcss.com https://cdnjs.cloudflare.com; \
    script-src 'self' 'unsafe-inline' https://cdn.tailwindcss.com; \
    font-src 'self' https://cdnjs.cloudflare.com; \
    img-src 'self' data: https:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Postgres URL. Without one the server runs on the in-memory store.
    pub database_url: Option<String>,
    /// Where the client goes after a successful login.
    pub post_login_redirect: String,
    pub content_security_policy: String,
    pub auth: AuthConfig,
    /// Account created at startup if missing.
    pub seed_admin: Option<SeedAdmin>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            post_login_redirect: "/index.html".to_string(),
            content_security_policy: DEFAULT_CONTENT_SECURITY_POLICY.to_string(),
            auth: AuthConfig::default(),
            seed_admin: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default = "SeedAdmin::default_role")]
    pub role: String,
}

impl SeedAdmin {
    fn default_role() -> String {
        "admin".to_string()
    }
}

impl core::fmt::Debug for SeedAdmin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SeedAdmin")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CMSGATE_").split("__"))
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmsgate_auth::{Permission, Role};
    use figment::Jail;

    #[test]
    fn defaults_without_any_source() {
        Jail::expect_with(|_jail| {
            let config = AppConfig::load("missing.yaml")?;
            assert_eq!(config, AppConfig::default());
            assert_eq!(config.auth.session_timeout_secs, 3600);
            assert_eq!(config.auth.rotation_interval_secs, 300);
            Ok(())
        });
    }

    #[test]
    fn yaml_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cmsgate.yaml",
                r#"
bind_addr: 127.0.0.1:9000
auth:
  session_timeout_secs: 900
  cookie_secure: false
  roles:
    editor: [page.edit, page.view]
seed_admin:
  username: admin
  email: admin@bpo.com
  password: admin123
"#,
            )?;
            jail.set_env("CMSGATE_AUTH__SESSION_TIMEOUT_SECS", "60");
            jail.set_env("DATABASE_URL", "postgres://localhost/cms");

            let config = AppConfig::load("cmsgate.yaml")?;

            assert_eq!(config.bind_addr, "127.0.0.1:9000");
            assert_eq!(config.auth.session_timeout_secs, 60);
            assert!(!config.auth.cookie_secure);
            assert_eq!(config.auth.rotation_interval_secs, 300);
            assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/cms"));

            let seed = config.seed_admin.expect("seed admin");
            assert_eq!(seed.role, "admin");
            assert!(!format!("{seed:?}").contains("admin123"));
            Ok(())
        });
    }

    #[test]
    fn configured_roles_merge_over_the_built_in_table() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "cmsgate.yaml",
                r#"
auth:
  roles:
    editor: [page.edit]
    agent: [ticket.view]
"#,
            )?;

            let roles = AppConfig::load("cmsgate.yaml")?.auth.roles;

            assert!(roles.grants(&Role::new("editor"), &Permission::new("page.edit")));
            assert!(
                roles.grants(&Role::new("admin"), &Permission::new("page.edit")),
                "built-in admin wildcard survives"
            );
            assert!(roles.grants(&Role::new("hr"), &Permission::new("hr.view")));
            // A listed role replaces its own set rather than extending it.
            assert!(roles.grants(&Role::new("agent"), &Permission::new("ticket.view")));
            assert!(!roles.grants(&Role::new("agent"), &Permission::new("ticket.edit")));
            Ok(())
        });
    }

    #[test]
    fn rate_limit_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("CMSGATE_AUTH__RATE_LIMIT__MAX_PER_EMAIL", "3");
            let config = AppConfig::load("missing.yaml")?;
            assert_eq!(config.auth.rate_limit.max_per_email, 3);
            assert_eq!(config.auth.rate_limit.max_per_ip, 100);
            Ok(())
        });
    }
}

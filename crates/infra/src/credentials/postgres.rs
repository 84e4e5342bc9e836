//! Postgres-backed credential store.
//!
//! Expected schema (bootstrap is out of scope for this crate):
//!
//! ```sql
//! CREATE TABLE users (
//!     id         BIGSERIAL PRIMARY KEY,
//!     username   TEXT NOT NULL UNIQUE,
//!     email      TEXT NOT NULL UNIQUE,
//!     password   TEXT NOT NULL,
//!     role       TEXT NOT NULL DEFAULT 'user',
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! CREATE TABLE user_activity (
//!     id          BIGSERIAL PRIMARY KEY,
//!     user_id     BIGINT NOT NULL REFERENCES users(id),
//!     action      TEXT NOT NULL,
//!     description TEXT NOT NULL,
//!     ip_address  TEXT NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL
//! );
//! CREATE TABLE permissions (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL UNIQUE);
//! CREATE TABLE user_permissions (
//!     user_id       BIGINT NOT NULL REFERENCES users(id),
//!     permission_id BIGINT NOT NULL REFERENCES permissions(id),
//!     PRIMARY KEY (user_id, permission_id)
//! );
//! ```
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` (constraint name) |
//! | Database (other) | any other | `Query` |
//! | PoolClosed / PoolTimedOut / Io / Tls | N/A | `Unavailable` |
//! | Other | N/A | `Query` |

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use cmsgate_auth::{ActivityLogEntry, CredentialStore, NewUser, Permission, Role, StoreError, User};
use cmsgate_core::UserId;

/// Postgres credential store. Cheap to clone (the pool is shared).
#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: PgPool,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with a small default pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: UserId::new(row.try_get("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        role: Role::new(row.try_get::<String, _>("role")?),
    })
}

#[async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip_all, err)]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, username, email, password, role FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_email", e))?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_user_by_email", e))
    }

    #[instrument(skip_all, err)]
    async fn find_user_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT id, username, email, password, role FROM users WHERE email = $1 OR username = $2 LIMIT 1",
        )
        .bind(email)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_user_by_email_or_username", e))?;

        row.as_ref()
            .map(user_from_row)
            .transpose()
            .map_err(|e| map_sqlx_error("find_user_by_email_or_username", e))
    }

    #[instrument(skip_all, fields(username = %user.username), err)]
    async fn insert_user(&self, user: NewUser) -> Result<UserId, StoreError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (username, email, password, role, created_at)
            VALUES ($1, $2, $3, $4, now())
            RETURNING id
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;

        Ok(UserId::new(id))
    }

    #[instrument(skip(self, password_hash), err)]
    async fn update_password_hash(&self, user_id: UserId, password_hash: String) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(&password_hash)
            .bind(user_id.get())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_password_hash", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("no user with id {user_id}")));
        }
        Ok(())
    }

    #[instrument(skip_all, fields(user_id = %entry.user_id, action = %entry.action), err)]
    async fn insert_activity_log(&self, entry: ActivityLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_activity (user_id, action, description, ip_address, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.user_id.get())
        .bind(&entry.action)
        .bind(&entry.description)
        .bind(&entry.ip_address)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_activity_log", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn find_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<BTreeSet<Permission>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.name FROM permissions p
            JOIN user_permissions up ON p.id = up.permission_id
            WHERE up.user_id = $1
            "#,
        )
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_permissions_for_user", e))?;

        Ok(names.into_iter().map(Permission::new).collect())
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                StoreError::Conflict(constraint)
            } else {
                StoreError::Query(format!("database error in {operation}: {}", db_err.message()))
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        other => StoreError::Query(format!("sqlx error in {operation}: {other}")),
    }
}

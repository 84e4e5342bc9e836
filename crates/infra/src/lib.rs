//! Infrastructure layer: credential storage adapters.

pub mod credentials;

pub use credentials::InMemoryCredentialStore;
#[cfg(feature = "postgres")]
pub use credentials::PostgresCredentialStore;

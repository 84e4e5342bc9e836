//! `CredentialStore` implementations.
//!
//! - [`InMemoryCredentialStore`]: development and tests
//! - `PostgresCredentialStore` (feature `postgres`): production

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryCredentialStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCredentialStore;

//! `cmsgate-core`: shared building blocks for the auth layer.
//!
//! This crate contains **pure** primitives (no IO, no HTTP, no storage).

pub mod email;
pub mod error;
pub mod id;

pub use email::Email;
pub use error::{DomainError, DomainResult};
pub use id::UserId;

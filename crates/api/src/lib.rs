//! HTTP API: session cookie handling, `/auth` endpoints and guarded pages.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
pub mod render;
pub mod security;

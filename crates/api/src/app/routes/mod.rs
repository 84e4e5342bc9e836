use axum::{Router, routing::get};

use crate::app::services::AppState;

pub mod auth;
pub mod common;
pub mod pages;
pub mod system;

/// Routes that run behind the session middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .merge(pages::router())
}

/// Routes that never read or create sessions.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/health", get(system::health))
}

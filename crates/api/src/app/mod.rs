//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: shared state (session store, guards, authenticator, limiter)
//! - `routes/`: HTTP routes + handlers (`/auth/*` JSON, guarded pages)
//! - `errors.rs`: consistent `{success, message}` error responses

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware;
use crate::security::with_security_headers;

pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppState, build_services, spawn_session_reaper};

/// Full HTTP router over an already-built state.
///
/// Session handling wraps the session-aware routes only; `/health` sits
/// outside it so health checks never touch the session store.
pub fn router_with_state(state: AppState) -> Router {
    let session_aware = routes::router().layer(axum::middleware::from_fn_with_state(
        state.clone(),
        middleware::session_middleware,
    ));

    let app = session_aware
        .merge(routes::public_router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    with_security_headers(app, &state.config).with_state(state)
}

//! Guarded HTML pages.
//!
//! Page flows never answer with JSON errors: a refused visitor is redirected
//! (303) to the login or error page, with any message parked in the session
//! as a flash.

use axum::{
    Extension, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use cmsgate_auth::{GuardOutcome, Role, SessionError, SessionId};

use crate::app::errors;
use crate::app::routes::common::{FLASH_ERROR, FLASH_SUCCESS};
use crate::app::services::AppState;
use crate::context::SessionContext;
use crate::middleware::SessionCookie;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard).fallback(errors::method_not_allowed))
        .route("/admin", get(admin).fallback(errors::method_not_allowed))
}

/// GET /dashboard (any authenticated user)
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    let Some(session) = ctx.session_id() else {
        return see_other(&state.config.auth.login_path);
    };
    let outcome = state.guard.require_auth(session);
    render_gated(&state, &ctx, session, outcome, "Dashboard", "Accessed dashboard")
}

/// GET /admin (role `admin` only)
pub async fn admin(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    let Some(session) = ctx.session_id() else {
        return see_other(&state.config.auth.login_path);
    };
    let outcome = state.guard.require_role(session, &Role::new("admin"));
    render_gated(&state, &ctx, session, outcome, "Administration", "Accessed administration")
}

fn render_gated(
    state: &AppState,
    ctx: &SessionContext,
    session: &SessionId,
    outcome: Result<GuardOutcome, SessionError>,
    page: &str,
    activity: &str,
) -> Response {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => return errors::session_error_to_response(err),
    };

    match outcome {
        GuardOutcome::Allowed => {
            let Some(user) = state.guard.current_user(session) else {
                return see_other(&state.config.auth.login_path);
            };
            state
                .guard
                .log_activity(session, "page_access", activity, ctx.client());
            let flash = state
                .sessions
                .flash_take(session, FLASH_SUCCESS)
                .or_else(|| state.sessions.flash_take(session, FLASH_ERROR));
            state
                .renderer
                .render(page, &user, flash.as_deref())
                .into_response()
        }
        GuardOutcome::RedirectTo { path, flash: None } => see_other(&path),
        GuardOutcome::RedirectTo {
            path,
            flash: Some(message),
        } => {
            // The guard destroyed the old session; the flash needs a new one.
            let fresh = match state.sessions.create_anonymous() {
                Ok(id) => id,
                Err(err) => return errors::session_error_to_response(err),
            };
            if let Err(err) = state.sessions.flash_set(&fresh, FLASH_ERROR, message) {
                tracing::warn!(error = %err, "flash message dropped");
            }
            (Extension(SessionCookie::Set(fresh)), see_other(&path)).into_response()
        }
        GuardOutcome::Forbidden { message } => {
            if let Err(err) = state.sessions.flash_set(session, FLASH_ERROR, message) {
                tracing::warn!(error = %err, "flash message dropped");
            }
            see_other(&state.config.auth.error_path)
        }
    }
}

fn see_other(path: &str) -> Response {
    match HeaderValue::from_str(path) {
        Ok(location) => (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response(),
        Err(_) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "Invalid redirect target"),
    }
}

//! JSON authentication endpoints under `/auth`.

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;

use cmsgate_auth::{AuthError, GuardOutcome, Permission, RateLimitAction};

use crate::app::errors;
use crate::app::routes::common::{FLASH_ERROR, FLASH_SUCCESS, JsonOrForm, supplied_csrf, throttle};
use crate::app::services::AppState;
use crate::context::SessionContext;
use crate::middleware::SessionCookie;

// ─────────────────────────────────────────────────────────────────────────────
// Request DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub csrf_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionQuery {
    /// Consult per-user grants in the credential store instead of the role table.
    #[serde(default)]
    pub stored: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login).fallback(errors::method_not_allowed))
        .route("/logout", post(logout).fallback(errors::method_not_allowed))
        .route("/check", get(check).fallback(errors::method_not_allowed))
        .route("/csrf", get(csrf_token).fallback(errors::method_not_allowed))
        .route("/register", post(register).fallback(errors::method_not_allowed))
        .route(
            "/permissions/:permission",
            get(check_permission).fallback(errors::method_not_allowed),
        )
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /auth/login
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    headers: HeaderMap,
    JsonOrForm(body): JsonOrForm<LoginRequest>,
) -> Response {
    if let Err(limited) = throttle(&state, &ctx, &body.email, RateLimitAction::Login) {
        return limited;
    }

    let csrf = supplied_csrf(&headers, body.csrf_token.as_deref());
    let Some(previous) = ctx.session_id().filter(|id| state.csrf.verify(id, csrf)) else {
        tracing::info!("login rejected: bad csrf token");
        return errors::auth_error_to_response(AuthError::InvalidCsrf);
    };

    let ok = match state
        .authenticator
        .login(&body.email, &body.password, ctx.client())
        .await
    {
        Ok(ok) => ok,
        Err(err) => return errors::auth_error_to_response(err),
    };

    // The pre-login session is retired; the client moves to the new id.
    if let Err(err) = state.sessions.destroy(previous) {
        tracing::warn!(error = %err, "could not retire pre-login session");
    }
    if let Err(err) = state.sessions.flash_set(&ok.session_id, FLASH_SUCCESS, "Login successful") {
        tracing::warn!(error = %err, "flash message dropped");
    }

    (
        Extension(SessionCookie::Set(ok.session_id)),
        Json(json!({
            "success": true,
            "message": "Login successful",
            "user": ok.user,
            "redirect": state.config.post_login_redirect,
        })),
    )
        .into_response()
}

/// POST /auth/logout
#[tracing::instrument(skip_all)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    if let Some(session) = ctx.session_id() {
        if let Err(err) = state.authenticator.logout(session, ctx.client()) {
            return errors::auth_error_to_response(err);
        }
    }

    (
        Extension(SessionCookie::Clear),
        Json(json!({
            "success": true,
            "message": "You have been logged out successfully.",
        })),
    )
        .into_response()
}

/// GET /auth/check
///
/// 200 with the user when logged in, 401 otherwise.
pub async fn check(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    let Some(session) = ctx.session_id() else {
        return not_authenticated(None);
    };

    let outcome = match state.guard.require_auth(session) {
        Ok(outcome) => outcome,
        Err(err) => return errors::session_error_to_response(err),
    };

    match outcome {
        GuardOutcome::Allowed => match state.authenticator.current_user(session) {
            Some(user) => Json(json!({ "success": true, "user": user })).into_response(),
            None => not_authenticated(None),
        },
        GuardOutcome::RedirectTo { flash: Some(_), .. } => {
            // Expired: the session is gone, so drop the cookie too.
            (
                Extension(SessionCookie::Clear),
                errors::auth_error_to_response(AuthError::SessionExpired),
            )
                .into_response()
        }
        GuardOutcome::RedirectTo { flash: None, .. } | GuardOutcome::Forbidden { .. } => {
            not_authenticated(state.sessions.flash_take(session, FLASH_ERROR))
        }
    }
}

fn not_authenticated(flash: Option<String>) -> Response {
    let mut body = json!({
        "success": false,
        "message": "User not authenticated",
    });
    if let Some(flash) = flash {
        body["flash"] = json!(flash);
    }
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

/// GET /auth/csrf
///
/// First-time visitors get their session here.
pub async fn csrf_token(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    let (session, created) = match ctx.session_id() {
        Some(id) => (id.clone(), false),
        None => match state.sessions.create_anonymous() {
            Ok(id) => (id, true),
            Err(err) => return errors::session_error_to_response(err),
        },
    };

    let token = match state.csrf.issue_token(&session) {
        Ok(token) => token,
        Err(err) => return errors::session_error_to_response(err),
    };
    let body = Json(json!({ "success": true, "token": token }));

    if created {
        (Extension(SessionCookie::Set(session)), body).into_response()
    } else {
        body.into_response()
    }
}

/// POST /auth/register
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    headers: HeaderMap,
    JsonOrForm(body): JsonOrForm<RegisterRequest>,
) -> Response {
    if !state.config.auth.allow_registration {
        return errors::json_error(StatusCode::FORBIDDEN, "Registration is disabled");
    }
    if let Err(limited) = throttle(&state, &ctx, &body.email, RateLimitAction::Register) {
        return limited;
    }

    let csrf = supplied_csrf(&headers, body.csrf_token.as_deref());
    if !ctx.session_id().is_some_and(|id| state.csrf.verify(id, csrf)) {
        return errors::auth_error_to_response(AuthError::InvalidCsrf);
    }

    // Self-registration always gets the default role.
    match state
        .authenticator
        .register(&body.username, &body.email, &body.password, None)
        .await
    {
        Ok(user) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "message": "User registered successfully",
                "user": user,
            })),
        )
            .into_response(),
        Err(err) => errors::auth_error_to_response(err),
    }
}

/// GET /auth/permissions/:permission
pub async fn check_permission(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(permission): Path<String>,
    Query(query): Query<PermissionQuery>,
) -> Response {
    let permission = Permission::new(permission);
    let Some(session) = ctx.session_id() else {
        return errors::auth_error_to_response(AuthError::AuthenticationRequired);
    };

    let result = if query.stored {
        state
            .guard
            .check_stored_permission(session, &permission)
            .await
    } else {
        state
            .guard
            .check_permission(session, &permission)
            .map_err(AuthError::from)
    };

    match result {
        Ok(()) => Json(json!({
            "success": true,
            "permission": permission,
        }))
        .into_response(),
        Err(err) => errors::auth_error_to_response(err),
    }
}

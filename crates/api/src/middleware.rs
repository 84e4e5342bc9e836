use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::Response,
};

use cmsgate_auth::{SessionError, SessionId};

use crate::app::services::AppState;
use crate::context::{SessionContext, client_info};

/// Instruction from a handler to the session middleware about the cookie.
///
/// Handlers that replace the session (login, logout, expiry cleanup) put one
/// of these in the response extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCookie {
    Set(SessionId),
    Clear,
}

/// Resolve the visitor's session, rotate a stale id, and keep the cookie in
/// sync.
///
/// No session is created here: a visitor without a live cookie reaches the
/// handler with an empty [`SessionContext`].
pub async fn session_middleware(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let cookie_name = state.config.auth.cookie_name.as_str();

    let presented = read_cookie(req.headers(), cookie_name).and_then(SessionId::parse);
    let resolved = presented.as_ref().and_then(|id| state.sessions.resolve(id));

    // A retired id still in flight gets the successor's cookie.
    let mut reissue = matches!((&presented, &resolved), (Some(p), Some(r)) if p != r);

    let session_id = match resolved {
        Some(id) => match state
            .sessions
            .rotate_if_stale(&id, state.config.auth.rotation_interval())
        {
            Ok(Some(rotated)) => {
                reissue = true;
                Some(rotated)
            }
            Ok(None) => Some(id),
            // Another request rotated it between resolve and rotate.
            Err(SessionError::UnknownSession) => {
                let current = state.sessions.resolve(&id);
                reissue = current.is_some();
                current
            }
            Err(err) => {
                tracing::warn!(error = %err, "session rotation skipped");
                Some(id)
            }
        },
        None => None,
    };

    let ctx = SessionContext::new(session_id.clone(), client_info(&req));
    req.extensions_mut().insert(ctx);

    let mut res = next.run(req).await;

    let cookie = match (res.extensions_mut().remove::<SessionCookie>(), &session_id) {
        (Some(SessionCookie::Set(id)), _) => Some(set_cookie(&state, &id)),
        (Some(SessionCookie::Clear), _) => Some(clear_cookie(&state)),
        (None, Some(id)) if reissue => Some(set_cookie(&state, id)),
        (None, _) => None,
    };

    if let Some(cookie) = cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                res.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(err) => tracing::error!(error = %err, "invalid set-cookie header"),
        }
    }

    res
}

fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
}

fn set_cookie(state: &AppState, id: &SessionId) -> String {
    format!(
        "{}={}; Path=/; HttpOnly;{} SameSite=Strict",
        state.config.auth.cookie_name,
        id,
        secure_attr(state)
    )
}

fn clear_cookie(state: &AppState) -> String {
    format!(
        "{}=; Path=/; HttpOnly;{} SameSite=Strict; Max-Age=0",
        state.config.auth.cookie_name,
        secure_attr(state)
    )
}

fn secure_attr(state: &AppState) -> &'static str {
    if state.config.auth.cookie_secure {
        " Secure;"
    } else {
        ""
    }
}

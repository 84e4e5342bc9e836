use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use cmsgate_auth::{AuthError, SessionError};

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    let status = match &err {
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::DuplicateUser => StatusCode::CONFLICT,
        AuthError::InvalidCsrf => StatusCode::FORBIDDEN,
        AuthError::SessionExpired => StatusCode::UNAUTHORIZED,
        AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
        AuthError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Session(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }

    json_error(status, err.user_message())
}

pub fn session_error_to_response(err: SessionError) -> axum::response::Response {
    auth_error_to_response(err.into())
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub async fn method_not_allowed() -> axum::response::Response {
    json_error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

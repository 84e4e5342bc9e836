use axum::{
    Form, Json,
    async_trait,
    extract::{FromRequest, Request},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use serde::de::DeserializeOwned;

use cmsgate_auth::{AuthError, RateLimitAction, RateLimitDecision};

use crate::app::errors;
use crate::app::services::AppState;
use crate::context::SessionContext;

/// Header alternative to a `csrf_token` body field.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Flash key for refusals shown on the login or error page.
pub const FLASH_ERROR: &str = "error";

/// Flash key for confirmations shown on the next rendered page.
pub const FLASH_SUCCESS: &str = "success";

/// Body extractor accepting either JSON or an urlencoded form.
///
/// Login pages post forms; scripts post JSON. Anything unparsable is a 400
/// with the usual error envelope.
#[derive(Debug)]
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        let parsed = if is_json {
            Json::<T>::from_request(req, state)
                .await
                .map(|Json(v)| v)
                .map_err(|e| e.body_text())
        } else {
            Form::<T>::from_request(req, state)
                .await
                .map(|Form(v)| v)
                .map_err(|e| e.body_text())
        };

        parsed.map(Self).map_err(|detail| {
            tracing::debug!(detail = %detail, "rejected request body");
            errors::json_error(StatusCode::BAD_REQUEST, "Invalid request body")
        })
    }
}

/// The CSRF token a client supplied, from the body or the header.
pub fn supplied_csrf<'a>(headers: &'a HeaderMap, from_body: Option<&'a str>) -> &'a str {
    from_body
        .filter(|t| !t.is_empty())
        .or_else(|| headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()))
        .unwrap_or("")
}

/// Count an attempt against the client address and the submitted email.
///
/// Returns the 429 response when either budget is spent.
pub fn throttle(
    state: &AppState,
    ctx: &SessionContext,
    email: &str,
    action: RateLimitAction,
) -> Result<(), Response> {
    let by_ip = state.rate_limiter.check_ip(&ctx.client().ip_address, action);
    if by_ip == RateLimitDecision::Limited {
        return Err(errors::auth_error_to_response(AuthError::RateLimited));
    }
    if !email.trim().is_empty()
        && state.rate_limiter.check_email(email, action) == RateLimitDecision::Limited
    {
        return Err(errors::auth_error_to_response(AuthError::RateLimited));
    }
    Ok(())
}

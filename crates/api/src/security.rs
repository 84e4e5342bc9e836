//! Response hardening headers applied to every route.

use axum::{
    Router,
    http::{HeaderName, HeaderValue, header},
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::{AppConfig, DEFAULT_CONTENT_SECURITY_POLICY};

const HSTS: &str = "max-age=15552000; includeSubDomains";

/// Static header set for `config`. HSTS only when cookies are `Secure`,
/// i.e. when the service is served over TLS.
pub fn security_headers(config: &AppConfig) -> Vec<(HeaderName, HeaderValue)> {
    let csp = HeaderValue::from_str(&config.content_security_policy).unwrap_or_else(|err| {
        tracing::warn!(error = %err, "invalid content_security_policy; using default");
        HeaderValue::from_static(DEFAULT_CONTENT_SECURITY_POLICY)
    });

    let mut headers = vec![
        (header::CONTENT_SECURITY_POLICY, csp),
        (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
        (header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN")),
        (header::REFERRER_POLICY, HeaderValue::from_static("no-referrer")),
    ];
    if config.auth.cookie_secure {
        headers.push((header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS)));
    }
    headers
}

/// Wrap `router` so each response carries the hardening headers, unless a
/// handler already set one.
pub fn with_security_headers<S>(router: Router<S>, config: &AppConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    security_headers(config)
        .into_iter()
        .fold(router, |router, (name, value)| {
            router.layer(SetResponseHeaderLayer::if_not_present(name, value))
        })
}

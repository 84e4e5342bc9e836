use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{Request, header};

use cmsgate_auth::{ClientInfo, SessionId};

/// Session context for a request.
///
/// Inserted by the session middleware on every route behind it. The id is
/// `None` for visitors without a live session; handlers that need state
/// create one themselves and hand it back through
/// [`crate::middleware::SessionCookie::Set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session_id: Option<SessionId>,
    client: ClientInfo,
}

impl SessionContext {
    pub fn new(session_id: Option<SessionId>, client: ClientInfo) -> Self {
        Self { session_id, client }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }
}

/// Peer address and user agent, when available.
pub fn client_info<B>(req: &Request<B>) -> ClientInfo {
    let ip_address = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    ClientInfo {
        ip_address,
        user_agent,
    }
}

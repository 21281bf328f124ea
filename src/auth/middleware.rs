//! Axum extractors and response helpers for carrying the session id.

use super::service::AuthService;
use super::session::{Authentication, SessionId};
use crate::config::{Config, SessionTransport};
use crate::error::AppError;
use crate::siwe::VerificationError;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

/// Response header carrying the session id in bearer mode.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub config: Arc<Config>,
}

/// The caller's session id, if it presented a well-formed one.
pub struct SessionHandle(pub Option<SessionId>);

impl SessionHandle {
    fn from_headers(headers: &HeaderMap, config: &Config) -> Self {
        let raw = match config.session_transport {
            SessionTransport::Cookie => CookieJar::from_headers(headers)
                .get(&config.session_cookie_name)
                .map(|cookie| cookie.value().to_string()),
            SessionTransport::Bearer => headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string),
        };
        SessionHandle(raw.as_deref().and_then(SessionId::parse))
    }
}

impl FromRequestParts<AppState> for SessionHandle {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, &state.config))
    }
}

/// Authenticated session extractor.
///
/// Returns 401 Unauthorized unless the session holds a live authentication.
pub struct AuthSession {
    pub id: SessionId,
    pub authentication: Authentication,
}

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || AppError::Verification(VerificationError::SessionMissing);

        let SessionHandle(id) = SessionHandle::from_headers(&parts.headers, &state.config);
        let id = id.ok_or_else(unauthorized)?;
        let authentication = state
            .auth
            .authenticated(&id)
            .await?
            .ok_or_else(unauthorized)?;

        Ok(AuthSession { id, authentication })
    }
}

fn session_cookie(config: &Config, value: String) -> Cookie<'static> {
    Cookie::build((config.session_cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(config.cookie_secure)
        .build()
}

/// Header that hands the session id to the client.
///
/// In cookie mode `max_age` bounds the cookie's lifetime; `None` makes it a
/// browser-session cookie.
pub fn session_header(
    config: &Config,
    id: &SessionId,
    max_age: Option<chrono::Duration>,
) -> Result<(HeaderName, HeaderValue), AppError> {
    let (name, value) = match config.session_transport {
        SessionTransport::Cookie => {
            let mut cookie = session_cookie(config, id.as_str().to_string());
            if let Some(max_age) = max_age {
                cookie.set_max_age(time::Duration::seconds(max_age.num_seconds().max(0)));
            }
            (header::SET_COOKIE, cookie.to_string())
        }
        SessionTransport::Bearer => (
            HeaderName::from_static(SESSION_TOKEN_HEADER),
            id.as_str().to_string(),
        ),
    };
    let value = HeaderValue::from_str(&value)
        .map_err(|e| AppError::Internal(format!("Invalid session header: {}", e)))?;
    Ok((name, value))
}

/// Header that tells a cookie client to forget its session. Bearer clients
/// just drop the token, so there is nothing to send.
pub fn clear_session_header(config: &Config) -> Option<(HeaderName, HeaderValue)> {
    match config.session_transport {
        SessionTransport::Cookie => {
            let mut cookie = session_cookie(config, String::new());
            cookie.make_removal();
            HeaderValue::from_str(&cookie.to_string())
                .ok()
                .map(|value| (header::SET_COOKIE, value))
        }
        SessionTransport::Bearer => None,
    }
}

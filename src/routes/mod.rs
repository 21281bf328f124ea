//! HTTP surface of the sign-in flow.

pub mod auth;

use crate::auth::middleware::{AppState, SESSION_TOKEN_HEADER};
use crate::config::Config;
use crate::middleware::security_headers;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

/// Build the API router with all endpoints.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/nonce", get(auth::nonce))
        .route("/verify", post(auth::verify))
        .route("/personal_information", get(auth::personal_information))
        .route("/logout", post(auth::logout))
}

/// Single allowed origin with credentials, so the browser sends the session
/// cookie on cross-origin calls from the front end.
pub fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([HeaderName::from_static(SESSION_TOKEN_HEADER)])
        .allow_credentials(true);

    match HeaderValue::from_str(&config.allowed_origin) {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(origin = %config.allowed_origin, "Invalid allowed origin, CORS disabled");
            CorsLayer::new()
        }
    }
}

/// The full application: routes, CORS and security headers.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    api_router()
        .layer(cors)
        .layer(axum::middleware::from_fn(security_headers))
        .with_state(state)
}

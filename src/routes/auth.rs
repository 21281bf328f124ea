//! Sign-in API endpoints.

use crate::auth::middleware::{
    clear_session_header, session_header, AppState, AuthSession, SessionHandle,
};
use crate::error::AppError;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub message: Option<String>,
    pub signature: Option<String>,
}

/// GET /nonce: issue a fresh nonce on the caller's session
pub async fn nonce(
    State(state): State<AppState>,
    SessionHandle(id): SessionHandle,
) -> Result<impl IntoResponse, AppError> {
    let (id, nonce) = state.auth.issue_nonce(id.as_ref()).await?;
    let session = session_header(&state.config, &id, None)?;

    Ok(([(header::CONTENT_TYPE, HeaderValue::from_static("text/plain")), session], nonce))
}

/// POST /verify: check a signed message and sign the session in
pub async fn verify(
    State(state): State<AppState>,
    SessionHandle(id): SessionHandle,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(req) = body.map_err(|e| {
        tracing::debug!(error = %e, "Rejected verify body");
        missing_message()
    })?;
    let message = req.message.ok_or_else(missing_message)?;
    let signature = req
        .signature
        .ok_or_else(|| AppError::Failed("Expected signature in body.".to_string()))?;

    let signed = state
        .auth
        .verify(id.as_ref(), &message, &signature)
        .await?;

    let max_age = signed.authentication.expires_at - Utc::now();
    let session = session_header(&state.config, &signed.id, Some(max_age))?;

    Ok(([session], Json(true)).into_response())
}

fn missing_message() -> AppError {
    AppError::Unprocessable("Expected message and signature in body.".to_string())
}

/// GET /personal_information: who the session is signed in as
pub async fn personal_information(session: AuthSession) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
        format!(
            "You are authenticated and your address is: {}",
            session.authentication.address
        ),
    )
}

/// POST /logout: destroy the signed-in session
pub async fn logout(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Response, AppError> {
    state.auth.logout(&session.id).await?;

    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Some((name, value)) = clear_session_header(&state.config) {
        response.headers_mut().insert(name, value);
    }
    Ok(response)
}

//! Error types and Axum response conversions.
//!
//! Every error body is `{"message": "..."}`.

use crate::auth::service::AuthError;
use crate::siwe::VerificationError;
use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Login Time-out, the conventional status for an expired sign-in.
pub const LOGIN_TIMEOUT: u16 = 440;

/// Application error types.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unprocessable: {0}")]
    Unprocessable(String),

    /// A request that cannot be completed, reported to the caller as-is.
    #[error("Failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Verification(err) => match err {
                VerificationError::NonceMismatch | VerificationError::InvalidSignature(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                VerificationError::ExpiredMessage => {
                    StatusCode::from_u16(LOGIN_TIMEOUT).unwrap_or(StatusCode::UNAUTHORIZED)
                }
                VerificationError::SessionMissing => StatusCode::UNAUTHORIZED,
                VerificationError::MalformedMessage(_)
                | VerificationError::DomainMismatch { .. }
                | VerificationError::MessageNotYetValid => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(msg) => {
                // Log detailed error server-side, return generic message to client
                tracing::error!(error = %msg, "Internal server error");
                "Internal server error".to_string()
            }
            AppError::Unprocessable(msg) | AppError::Failed(msg) => msg.clone(),
            AppError::Verification(err) => err.to_string(),
        };

        let body = Json(json!({
            "message": message
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Internal(format!("Session store error: {}", err))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Verification(e) => AppError::Verification(e),
            AuthError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::siwe::message::ParseError;
    use crate::siwe::signature::SignatureError;

    /// Extract status code and JSON body from an AppError response.
    async fn error_response(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, json)
    }

    #[tokio::test]
    async fn test_internal_hides_details() {
        let (status, body) = error_response(AppError::Internal(
            "Redis connection refused at 10.0.0.5:6379".to_string(),
        ))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
        assert!(!body["message"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_session_missing_is_401() {
        let (status, body) = error_response(VerificationError::SessionMissing.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "You have to first sign_in");
    }

    #[tokio::test]
    async fn test_nonce_and_signature_rejections_are_422() {
        for err in [
            VerificationError::NonceMismatch,
            VerificationError::InvalidSignature(SignatureError::Malformed),
        ] {
            let (status, body) = error_response(err.into()).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert!(body["message"].is_string());
        }
    }

    #[tokio::test]
    async fn test_other_verification_failures_are_500() {
        for err in [
            VerificationError::MalformedMessage(ParseError::Empty),
            VerificationError::DomainMismatch {
                expected: "a.example".to_string(),
                actual: "b.example".to_string(),
            },
        ] {
            let expected = err.to_string();
            let (status, body) = error_response(err.into()).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body["message"], expected);
        }
    }

    #[tokio::test]
    async fn test_failed_keeps_message() {
        let (status, body) =
            error_response(AppError::Failed("Expected signature in body.".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Expected signature in body.");
    }

    #[tokio::test]
    async fn test_expired_is_440() {
        let (status, body) = error_response(VerificationError::ExpiredMessage.into()).await;
        assert_eq!(status.as_u16(), 440);
        assert_eq!(body["message"], "message has expired");
    }

    #[tokio::test]
    async fn test_not_yet_valid_is_500() {
        let (status, body) = error_response(VerificationError::MessageNotYetValid.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "message is not yet valid");
    }

    #[test]
    fn test_from_store_error() {
        let redis_err = redis::RedisError::from((
            redis::ErrorKind::IoError,
            "test context",
            "connection refused".to_string(),
        ));
        let app_err = AppError::from(AuthError::Store(StoreError::Redis(redis_err)));
        match app_err {
            AppError::Internal(msg) => assert!(msg.contains("Session store error")),
            _ => panic!("Expected Internal variant"),
        }
    }
}

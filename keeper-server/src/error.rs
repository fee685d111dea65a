//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use keeper_core::KeeperError;

/// Server error types mapped to HTTP status codes.
#[derive(Debug)]
pub enum ServerError {
    Database(String),
    Unauthenticated(String),
    NotFound(String),
    AlreadyExists(String),
    InvalidArgument(String),
    Internal(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(e) => write!(f, "Database error: {}", e),
            Self::Unauthenticated(e) => write!(f, "Unauthenticated: {}", e),
            Self::NotFound(e) => write!(f, "Not found: {}", e),
            Self::AlreadyExists(e) => write!(f, "Already exists: {}", e),
            Self::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            Self::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Database(_) | Self::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::Unauthenticated(e) => (StatusCode::UNAUTHORIZED, e.clone()),
            Self::NotFound(e) => (StatusCode::NOT_FOUND, e.clone()),
            Self::AlreadyExists(e) => (StatusCode::CONFLICT, e.clone()),
            Self::InvalidArgument(e) => (StatusCode::BAD_REQUEST, e.clone()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<KeeperError> for ServerError {
    fn from(e: KeeperError) -> Self {
        match e {
            KeeperError::InvalidArgument(m) => Self::InvalidArgument(m),
            KeeperError::NotFound(m) => Self::NotFound(m),
            KeeperError::Unauthenticated(m) => Self::Unauthenticated(m),
            KeeperError::AlreadyExists(m) => Self::AlreadyExists(m),
            KeeperError::Database(e) => Self::Database(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (ServerError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (ServerError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (ServerError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ServerError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (ServerError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn core_errors_keep_their_category() {
        let err: ServerError = KeeperError::InvalidArgument("text is required".into()).into();
        assert!(matches!(err, ServerError::InvalidArgument(_)));

        let err: ServerError = KeeperError::PasswordHash("boom".into()).into();
        assert!(matches!(err, ServerError::Internal(_)));
    }
}

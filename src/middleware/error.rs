use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Rejections of the bearer middleware.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No bearer credential on the request.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Credential failed validation.
    #[error("Token invalid or expired")]
    InvalidToken,

    /// Credential is valid but its session is gone from the store.
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Session store operation failed.
    #[error("Session store error: {0}")]
    Store(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated | Self::InvalidToken | Self::SessionExpired => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::Store(_) => {
                tracing::error!(error = %self, "Auth internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

impl From<crate::error::Error> for AuthError {
    fn from(e: crate::error::Error) -> Self {
        use crate::error::Error;
        match e {
            Error::TokenInvalid(_) | Error::TokenExpired => {
                tracing::debug!(error = %e, "Bearer credential rejected");
                Self::InvalidToken
            }
            Error::SessionNotFound(_) => Self::SessionExpired,
            other => Self::Store(other.to_string()),
        }
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Failure taxonomy shared by the store and the workflow services. The
/// services return these untranslated; mapping to HTTP happens in
/// `IntoResponse` below, at the transport edge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("insufficient balance: have {have}, need {need}")]
    InsufficientBalance { have: i64, need: i64 },

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::FORBIDDEN,
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
            // Do not leak backend details to the client.
            return (status, Json(json!({ "error": "internal error" }))).into_response();
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod status_tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(Error::NotFound("task").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::InvalidArgument("title must be non-empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::InvalidState("already submitted".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::InsufficientBalance { have: 30, need: 40 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::Unauthorized.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            Error::Unauthenticated("invalid or expired session").status(),
            StatusCode::UNAUTHORIZED
        );
    }
}

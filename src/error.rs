use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::status::TransitionError;

/// `axum`-compatible error handler.
#[derive(Error)]
pub struct Error {
    status: StatusCode,
    err: anyhow::Error,
}

impl Error {
    pub fn with_status(status: StatusCode, err: impl Into<anyhow::Error>) -> Self {
        Self {
            status,
            err: err.into(),
        }
    }

    pub fn bad_request(msg: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::BAD_REQUEST, anyhow::anyhow!("{msg}"))
    }

    pub fn not_found(what: &str) -> Self {
        Self::with_status(StatusCode::NOT_FOUND, anyhow::anyhow!("{what} not found"))
    }

    pub fn conflict(msg: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::CONFLICT, anyhow::anyhow!("{msg}"))
    }

    pub fn unauthorized(msg: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::UNAUTHORIZED, anyhow::anyhow!("{msg}"))
    }

    pub fn forbidden(msg: impl std::fmt::Display) -> Self {
        Self::with_status(StatusCode::FORBIDDEN, anyhow::anyhow!("{msg}"))
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err,
        }
    }
}

impl From<TransitionError> for Error {
    fn from(err: TransitionError) -> Self {
        Self::with_status(StatusCode::CONFLICT, err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.status, self.err)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.err.fmt(f)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("{:?}", self.err);

        // N.B: Client errors always carry their message. Server errors are only
        // forwarded verbatim in debug builds, since they may leak internals.
        let message = if self.status.is_client_error() {
            format!("{:#}", self.err)
        } else if cfg!(debug_assertions) {
            format!("{:?}", self.err)
        } else {
            "internal server error".to_owned()
        };

        (
            self.status,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}

/// Returns true when `err` is a unique-constraint violation reported by the database.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

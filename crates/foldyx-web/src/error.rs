use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use foldyx_common::FoldyxError;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    #[error("{0} file is not available for this run")]
    FileUnavailable(String),

    #[error("Run {0} is not running")]
    NotRunning(Uuid),

    #[error(transparent)]
    Core(#[from] FoldyxError),
}

impl WebError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebError::SessionNotFound(_)
            | WebError::RunNotFound(_)
            | WebError::FileUnavailable(_) => StatusCode::NOT_FOUND,
            WebError::NotRunning(_) => StatusCode::CONFLICT,
            WebError::Core(e) if e.is_user_error() => StatusCode::UNPROCESSABLE_ENTITY,
            WebError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type WebResult<T> = std::result::Result<T, WebError>;

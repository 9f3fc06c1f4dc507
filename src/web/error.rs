use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::settings::SettingsError;
use crate::snippets::SnippetError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Only allowed from this machine")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Malformed upload: {}", .0.body_text())]
    NotMultipart(#[from] MultipartRejection),

    #[error("Invalid JSON body: {}", .0.body_text())]
    Json(#[from] JsonRejection),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Snippet(#[from] SnippetError),

    #[error("Internal error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Missing bundled asset {0}")]
    MissingAsset(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_)
            | AppError::Multipart(_)
            | AppError::NotMultipart(_)
            | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::Snippet(SnippetError::InvalidLanguage | SnippetError::InvalidFileName) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Settings(_)
            | AppError::Snippet(SnippetError::Write { .. })
            | AppError::Io(_)
            | AppError::MissingAsset(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

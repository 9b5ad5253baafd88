//! ---
//! vs_section: "07-networking-external-interfaces"
//! vs_subsection: "module"
//! vs_type: "source"
//! vs_scope: "code"
//! vs_description: "HTTP error mapping."
//! vs_version: "v0.0.0-prealpha"
//! vs_owner: "tbd"
//! ---
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;
use vesense_dataflow::DataflowError;
use vesense_msg::BusError;
use vesense_vfs::FileStoreError;

/// Failures returned by the API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unknown device, missing file or unconfigured feature.
    #[error("{0}")]
    NotFound(String),
    /// Operation rejected by the store.
    #[error("{0}")]
    PermissionDenied(String),
    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DataflowError> for ApiError {
    fn from(err: DataflowError) -> Self {
        match err {
            DataflowError::DeviceNotFound(_) => Self::NotFound(err.to_string()),
            DataflowError::DuplicateDevice(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<FileStoreError> for ApiError {
    fn from(err: FileStoreError) -> Self {
        match err {
            FileStoreError::NotFound(_) => Self::NotFound(err.to_string()),
            FileStoreError::PermissionDenied(_) => Self::PermissionDenied(err.to_string()),
            FileStoreError::WriteInProgress(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<BusError> for ApiError {
    fn from(err: BusError) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "api request failed");
        }
        let body = Json(ErrorResponse {
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

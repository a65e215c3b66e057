//! API error types.
//!
//! Every error leaves the server as a Git LFS error body, `{"message": ...}`,
//! with the LFS media type. Server-side failures are logged and answered
//! with an opaque message.

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use lfs_auth::AuthError;
use lfs_core::LFS_MEDIA_TYPE;
use lfs_metadata::MetadataError;
use lfs_storage::StorageError;
use serde::Serialize;

pub const MSG_ACCEPT: &str = "accept ヘッダーは application/vnd.git-lfs+json である必要があります";
pub const MSG_CONTENT_TYPE: &str =
    "content-type ヘッダーは application/vnd.git-lfs+json である必要があります";
pub const MSG_OBJECT_NOT_FOUND: &str = "オブジェクトが見つかりません";
pub const MSG_SIZE_MISMATCH: &str = "サイズが一致しません";

/// Header carried by every 401 so Git prompts for credentials.
pub const LFS_AUTHENTICATE: &str = "lfs-authenticate";
const LFS_AUTHENTICATE_VALUE: &str = "Basic realm=\"Git LFS\"";

const OPAQUE_MESSAGE: &str = "internal server error";
const UPSTREAM_MESSAGE: &str = "identity provider unavailable";

/// LFS error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upload timed out")]
    RequestTimeout,

    #[error("{0}")]
    Unprocessable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Core(#[from] lfs_core::Error),
}

impl ApiError {
    /// Get the error code for this error (logs and metrics).
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::RequestTimeout => "timeout",
            Self::Unprocessable(_) => "unprocessable",
            Self::Internal(_) => "internal_error",
            Self::Storage(StorageError::SizeMismatch { .. }) => "size_mismatch",
            Self::Storage(StorageError::HashMismatch { .. }) => "hash_mismatch",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Auth(_) => "auth_error",
            Self::Core(_) => "validation_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::SizeMismatch { .. } | StorageError::HashMismatch { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(e) => match e {
                AuthError::StateNotFound => StatusCode::BAD_REQUEST,
                AuthError::Upstream(_) => StatusCode::BAD_GATEWAY,
                AuthError::Cache(_) | AuthError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::UNAUTHORIZED,
            },
            Self::Core(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    /// Message shown to the client.
    fn public_message(&self, status: StatusCode) -> String {
        match self {
            Self::Storage(StorageError::NotFound(_)) | Self::Metadata(MetadataError::NotFound(_)) => {
                MSG_OBJECT_NOT_FOUND.to_string()
            }
            Self::Storage(StorageError::SizeMismatch { .. }) => MSG_SIZE_MISMATCH.to_string(),
            Self::Storage(StorageError::HashMismatch { .. }) => {
                "content does not match oid".to_string()
            }
            _ if status == StatusCode::BAD_GATEWAY => UPSTREAM_MESSAGE.to_string(),
            _ if status.is_server_error() => OPAQUE_MESSAGE.to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            message: self.public_message(status),
        };
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        let mut response = (
            status,
            [(CONTENT_TYPE, HeaderValue::from_static(LFS_MEDIA_TYPE))],
            bytes,
        )
            .into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                HeaderName::from_static(LFS_AUTHENTICATE),
                HeaderValue::from_static(LFS_AUTHENTICATE_VALUE),
            );
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

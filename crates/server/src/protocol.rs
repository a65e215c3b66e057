//! Git LFS Batch and Verify payloads.

use crate::error::{ApiError, ApiResult, MSG_ACCEPT, MSG_CONTENT_TYPE};
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use lfs_core::{BASIC_TRANSFER, HashAlgo, LFS_MEDIA_TYPE, Oid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;

/// Batch operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Upload,
    Download,
}

impl Operation {
    pub fn parse(s: &str) -> ApiResult<Self> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            other => Err(ApiError::Unprocessable(format!(
                "unsupported operation: {other:?}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

/// Object reference as sent by the client.
#[derive(Debug, Deserialize)]
pub struct ObjectSpec {
    pub oid: String,
    /// `null` and missing both mean zero.
    #[serde(default)]
    pub size: Option<i64>,
}

/// Optional ref the client is operating on; accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct RefSpec {
    pub name: String,
}

/// `POST .../objects/batch` body.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub operation: String,
    #[serde(default)]
    pub transfers: Option<Vec<String>>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<RefSpec>,
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub hash_algo: Option<String>,
}

/// A batch request that passed validation.
#[derive(Debug)]
pub struct ValidatedBatch {
    pub operation: Operation,
    pub hash_algo: HashAlgo,
    /// In request order.
    pub objects: Vec<(Oid, i64)>,
}

impl BatchRequest {
    /// Validate the request. Every failure is a 422.
    pub fn validate(self, max_objects: usize) -> ApiResult<ValidatedBatch> {
        let operation = Operation::parse(&self.operation)?;

        if self.objects.is_empty() {
            return Err(ApiError::Unprocessable(
                "objects must not be empty".to_string(),
            ));
        }
        if self.objects.len() > max_objects {
            return Err(ApiError::Unprocessable(format!(
                "too many objects: {} (max {max_objects})",
                self.objects.len()
            )));
        }

        let hash_algo = match self.hash_algo.as_deref() {
            None => HashAlgo::Sha256,
            Some(name) => HashAlgo::parse(name)?,
        };

        let objects = self
            .objects
            .into_iter()
            .map(|spec| {
                let oid = Oid::parse(&spec.oid)?;
                let size = validate_size(spec.size.unwrap_or(0))?;
                Ok((oid, size))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        Ok(ValidatedBatch {
            operation,
            hash_algo,
            objects,
        })
    }
}

fn validate_size(size: i64) -> ApiResult<i64> {
    if size < 0 {
        return Err(lfs_core::Error::InvalidSize(size).into());
    }
    Ok(size)
}

/// `POST .../objects/verify` body.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub oid: String,
    #[serde(default)]
    pub size: Option<i64>,
}

impl VerifyRequest {
    /// Verify needs a positive size; empty objects have nothing to check.
    pub fn validate(self) -> ApiResult<(Oid, i64)> {
        let oid = Oid::parse(&self.oid)?;
        match self.size {
            Some(size) if size > 0 => Ok((oid, size)),
            Some(size) => Err(lfs_core::Error::InvalidSize(size).into()),
            None => Err(ApiError::Unprocessable("size is required".to_string())),
        }
    }
}

/// One transfer action.
#[derive(Clone, Debug, Serialize)]
pub struct Action {
    pub href: String,
    pub expires_in: i64,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Actions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify: Option<Action>,
}

/// Per-object error inside a 200 batch response.
#[derive(Clone, Debug, Serialize)]
pub struct ObjectError {
    pub code: u16,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ObjectEntry {
    pub oid: String,
    pub size: i64,
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Actions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
}

impl ObjectEntry {
    /// An object the client need not transfer.
    pub fn present(oid: &Oid, size: i64) -> Self {
        Self {
            oid: oid.to_string(),
            size,
            authenticated: true,
            actions: None,
            error: None,
        }
    }

    pub fn with_actions(oid: &Oid, size: i64, actions: Actions) -> Self {
        Self {
            actions: Some(actions),
            ..Self::present(oid, size)
        }
    }

    pub fn failed(oid: &Oid, size: i64, code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            error: Some(ObjectError {
                code: code.as_u16(),
                message: message.into(),
            }),
            ..Self::present(oid, size)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub transfer: &'static str,
    pub objects: Vec<ObjectEntry>,
    pub hash_algo: &'static str,
}

impl BatchResponse {
    pub fn basic(hash_algo: HashAlgo, objects: Vec<ObjectEntry>) -> Self {
        Self {
            transfer: BASIC_TRANSFER,
            objects,
            hash_algo: hash_algo.as_str(),
        }
    }
}

/// JSON response with the LFS media type.
pub struct LfsJson<T>(pub T);

impl<T: Serialize> IntoResponse for LfsJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(bytes) => (
                StatusCode::OK,
                [(CONTENT_TYPE, HeaderValue::from_static(LFS_MEDIA_TYPE))],
                bytes,
            )
                .into_response(),
            Err(e) => ApiError::Internal(format!("failed to encode response: {e}")).into_response(),
        }
    }
}

/// Parse an LFS JSON body. Malformed JSON is a 400; well-formed JSON of the
/// wrong shape is a 422.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| match e.classify() {
        Category::Data => ApiError::Unprocessable(format!("invalid request: {e}")),
        Category::Io | Category::Syntax | Category::Eof => {
            ApiError::BadRequest(format!("malformed JSON: {e}"))
        }
    })
}

/// Whether a header lists the LFS media type, ignoring parameters.
fn accepts_lfs_media_type(value: &HeaderValue) -> bool {
    value.to_str().is_ok_and(|v| {
        v.split(',')
            .filter_map(|part| part.trim().parse::<mime::Mime>().ok())
            .any(|m| m.essence_str() == LFS_MEDIA_TYPE)
    })
}

/// Batch and Verify require the LFS media type on both `Accept` and
/// `Content-Type`.
pub fn require_lfs_media_types(headers: &HeaderMap) -> ApiResult<()> {
    if !headers.get(ACCEPT).is_some_and(accepts_lfs_media_type) {
        return Err(ApiError::BadRequest(MSG_ACCEPT.to_string()));
    }
    if !headers.get(CONTENT_TYPE).is_some_and(accepts_lfs_media_type) {
        return Err(ApiError::BadRequest(MSG_CONTENT_TYPE.to_string()));
    }
    Ok(())
}

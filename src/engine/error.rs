//! FOTA Error Types
//! Request-level failures and their HTTP status mapping

use axum::http::StatusCode;
use thiserror::Error;

use super::blobs::BlobError;
use super::registry::RegistryError;
use super::upload::UploadError;

#[derive(Error, Debug)]
pub enum FotaError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Firmware file missing: {0}")]
    FirmwareFileMissing(String),

    #[error("Truncated upload: expected {expected} bytes, received {received}")]
    TruncatedUpload { expected: u64, received: u64 },

    #[error("Upload timed out")]
    UploadTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FotaError>;

impl FotaError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedRequest(reason.into())
    }

    /// Every failure maps to exactly one response status.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed => StatusCode::FORBIDDEN,
            Self::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            Self::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Self::FirmwareFileMissing(_) => StatusCode::NOT_FOUND,
            Self::TruncatedUpload { .. } => StatusCode::BAD_REQUEST,
            Self::UploadTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for FotaError {
    fn from(e: RegistryError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<UploadError> for FotaError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Truncated { expected, received } => {
                Self::TruncatedUpload { expected, received }
            }
            UploadError::Timeout(_) => Self::UploadTimeout,
            UploadError::Stream(reason) => Self::MalformedRequest(reason),
            UploadError::Io(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<BlobError> for FotaError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::InvalidReference(reference) => {
                Self::MalformedRequest(format!("invalid firmware reference {:?}", reference))
            }
            BlobError::NotFound(reference) => Self::FirmwareFileMissing(reference),
            BlobError::Upload(e) => e.into(),
            BlobError::Io(e) => Self::Internal(e.to_string()),
        }
    }
}

//! Error types and their HTTP mapping

use crate::records::RecordError;
use crate::storage::{InvalidOwnerId, StorageError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Bytes per MiB, used in user-facing size messages
const MIB: u64 = 1024 * 1024;

/// Why an upload did not end up stored and recorded
///
/// Client errors carry a specific, actionable message. Server errors are
/// reported to the client generically; the details go to the logs.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The declared filename's extension is not on the allow-list
    #[error("File type not allowed: {filename}")]
    RejectedExtension {
        /// Declared filename
        filename: String,
    },

    /// The upload is larger than the configured maximum
    #[error("File size {size} bytes exceeds {}MB limit", .limit.div_ceil(MIB))]
    OversizedUpload {
        /// Measured size
        size: u64,
        /// Configured maximum
        limit: u64,
    },

    /// The owner id cannot be used to name a directory
    #[error(transparent)]
    InvalidOwner(#[from] InvalidOwnerId),

    /// The upload stream could not be measured or read
    #[error("Failed to read upload: {0}")]
    Read(#[source] std::io::Error),

    /// The document could not be written; nothing was left on disk
    #[error("Failed to save document: {0}")]
    StorageWrite(#[source] StorageError),

    /// The metadata record could not be persisted; the stored file was removed
    #[error("Failed to save document metadata: {0}")]
    MetadataPersist(#[source] RecordError),
}

impl IngestError {
    /// HTTP status for this error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::RejectedExtension { .. } | Self::InvalidOwner(_) | Self::Read(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::OversizedUpload { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::StorageWrite(_) | Self::MetadataPersist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the client caused the failure
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Message safe to show to the uploader
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::StorageWrite(_) => "Failed to save document".to_string(),
            Self::MetadataPersist(_) => "Failed to save document metadata".to_string(),
            Self::OversizedUpload { limit, .. } => {
                format!("File size exceeds {}MB limit", limit.div_ceil(MIB))
            }
            Self::RejectedExtension { .. } => "File type not allowed".to_string(),
            Self::InvalidOwner(_) | Self::Read(_) => self.to_string(),
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "document upload failed");
        }
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}

/// Error returned by download and purge operations
#[derive(Debug, Error)]
#[error(transparent)]
pub struct DocumentAccessError(#[from] pub StorageError);

impl IntoResponse for DocumentAccessError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "Document not found"),
            StorageError::InvalidPath(_) => (StatusCode::FORBIDDEN, "Access denied"),
            StorageError::Io(_) | StorageError::Write { .. } => {
                tracing::error!(error = %self.0, "document access failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to access document")
            }
        };
        (status, Json(json!({ "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors() {
        let rejected = IngestError::RejectedExtension {
            filename: "x.exe".to_string(),
        };
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert!(rejected.is_client_error());
        assert_eq!(rejected.public_message(), "File type not allowed");

        let oversized = IngestError::OversizedUpload {
            size: 20 * MIB,
            limit: 15 * MIB,
        };
        assert_eq!(oversized.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(oversized.public_message(), "File size exceeds 15MB limit");
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = IngestError::StorageWrite(StorageError::Write {
            path: "/srv/uploads/applicant_1/secret.pdf".into(),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("secret"));
        assert!(err.to_string().contains("disk full"));

        let err = IngestError::MetadataPersist(RecordError::Rejected("boom".to_string()));
        assert_eq!(err.public_message(), "Failed to save document metadata");
    }

    #[test]
    fn test_into_response_status() {
        let response = IngestError::RejectedExtension {
            filename: "a.gif".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = DocumentAccessError(StorageError::NotFound("x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response =
            DocumentAccessError(StorageError::InvalidPath("../x".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

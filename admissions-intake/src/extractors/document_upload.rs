//! Document upload form extractor
//!
//! Parses a `multipart/form-data` body with three required fields:
//!
//! | Field | Content |
//! |---|---|
//! | `file` | The document, with a filename |
//! | `form_id` | Application form id (integer) |
//! | `document_type` | Category tag such as `transcript` |
//!
//! Axum limits request bodies to 2MB by default; routes accepting
//! documents need a larger `DefaultBodyLimit`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use admissions_intake::prelude::*;
//! use axum::extract::{DefaultBodyLimit, Path, State};
//! use axum::{routing::post, Router};
//!
//! type Pipeline = DocumentPipeline<LocalDocumentStore, PgMetadataRecorder>;
//!
//! async fn upload(
//!     State(pipeline): State<Pipeline>,
//!     Path(owner): Path<String>,
//!     upload: DocumentUpload,
//! ) -> Result<IngestReceipt, IngestError> {
//!     pipeline.ingest(upload.into_request(owner)?).await
//! }
//!
//! fn routes(pipeline: Pipeline) -> Router {
//!     Router::new()
//!         .route("/applicants/{owner}/documents", post(upload))
//!         .layer(DefaultBodyLimit::max(16 * 1024 * 1024))
//!         .with_state(pipeline)
//! }
//! ```

use crate::error::IngestError;
use crate::pipeline::UploadRequest;
use crate::storage::OwnerId;
use axum::{
    extract::{multipart::Field, FromRequest, Multipart, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::{Bytes, BytesMut};
use serde_json::json;
use std::io::Cursor;
use thiserror::Error;

/// Hard ceiling on the `file` field; the pipeline applies the configured limit
pub const MAX_DOCUMENT_FIELD_BYTES: usize = 64 * 1024 * 1024;

/// Largest accepted text field (`form_id`, `document_type`)
const MAX_TEXT_FIELD_BYTES: usize = 1024;

/// Error types for upload form parsing
#[derive(Debug, Error)]
pub enum UploadFormError {
    /// One of the required fields is absent
    #[error("Missing file, form_id, or document_type")]
    MissingField(&'static str),

    /// The `file` field has an empty filename
    #[error("No file selected")]
    EmptyFilename,

    /// `form_id` is not an integer
    #[error("Invalid form_id: {0:?}")]
    InvalidFormId(String),

    /// A field exceeds its size ceiling
    #[error("Field {field} exceeds maximum of {max} bytes")]
    FieldTooLarge {
        /// Field name
        field: String,
        /// Maximum allowed
        max: usize,
    },

    /// Failed to read multipart data
    #[error("Multipart error: {0}")]
    Multipart(String),
}

impl IntoResponse for UploadFormError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::FieldTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MissingField(_)
            | Self::EmptyFilename
            | Self::InvalidFormId(_)
            | Self::Multipart(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// A parsed document upload form
///
/// Nothing here is validated beyond presence and shape; the pipeline
/// decides whether the document is acceptable.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    /// Filename declared by the client
    pub filename: String,
    /// Document bytes
    pub data: Bytes,
    /// Application form id
    pub form_id: i64,
    /// Category tag
    pub document_type: String,
}

impl DocumentUpload {
    /// Turns the form into a pipeline request for the raw `owner` id
    ///
    /// # Errors
    ///
    /// Returns `IngestError::InvalidOwner` if `owner` cannot name an owner
    /// directory.
    pub fn into_request(
        self,
        owner: impl Into<String>,
    ) -> Result<UploadRequest<Cursor<Bytes>>, IngestError> {
        let owner = OwnerId::new(owner)?;
        Ok(
            UploadRequest::new(owner, self.filename, self.document_type, Cursor::new(self.data))
                .with_form_id(self.form_id),
        )
    }
}

impl<S> FromRequest<S> for DocumentUpload
where
    S: Send + Sync,
{
    type Rejection = UploadFormError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| UploadFormError::Multipart(e.to_string()))?;

        let mut file = None;
        let mut form_id = None;
        let mut document_type = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| UploadFormError::Multipart(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let data = read_field(field, "file", MAX_DOCUMENT_FIELD_BYTES).await?;
                    file = Some((filename, data));
                }
                "form_id" => {
                    let raw = read_text(field, "form_id").await?;
                    let id = raw
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| UploadFormError::InvalidFormId(raw.clone()))?;
                    form_id = Some(id);
                }
                "document_type" => {
                    document_type = Some(read_text(field, "document_type").await?);
                }
                _ => {}
            }
        }

        let (filename, data) = file.ok_or(UploadFormError::MissingField("file"))?;
        let form_id = form_id.ok_or(UploadFormError::MissingField("form_id"))?;
        let document_type = document_type.ok_or(UploadFormError::MissingField("document_type"))?;

        if filename.is_empty() {
            return Err(UploadFormError::EmptyFilename);
        }

        Ok(Self {
            filename,
            data,
            form_id,
            document_type,
        })
    }
}

/// Reads a field chunk by chunk, failing as soon as it exceeds `max` bytes
async fn read_field(mut field: Field<'_>, name: &str, max: usize) -> Result<Bytes, UploadFormError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| UploadFormError::Multipart(e.to_string()))?
    {
        if buf.len() + chunk.len() > max {
            return Err(UploadFormError::FieldTooLarge {
                field: name.to_string(),
                max,
            });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

async fn read_text(field: Field<'_>, name: &str) -> Result<String, UploadFormError> {
    let data = read_field(field, name, MAX_TEXT_FIELD_BYTES).await?;
    String::from_utf8(data.to_vec()).map_err(|e| UploadFormError::Multipart(e.to_string()))
}

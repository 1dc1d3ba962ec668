//! Axum request extractors
//!
//! - [`DocumentUpload`]: the document upload form (`file`, `form_id`, `document_type`)

mod document_upload;

pub use document_upload::{DocumentUpload, UploadFormError, MAX_DOCUMENT_FIELD_BYTES};

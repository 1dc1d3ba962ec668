//! Metadata records for stored documents
//!
//! The pipeline hands a fully typed [`DocumentRecord`] to a
//! [`MetadataRecorder`] only after the document's bytes are durable on disk.
//! What the recorder does with it (SQL row, audit log, ...) is its own
//! business; the pipeline only needs the new record's id or an error.

mod postgres;

pub use postgres::PgMetadataRecorder;

use crate::storage::{OwnerId, StoredDocument};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier assigned to a persisted record
pub type DocumentId = i64;

/// Errors raised while persisting a record
#[derive(Debug, Error)]
pub enum RecordError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The record could not be represented in the backing store
    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// Everything persisted about one uploaded document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Principal that uploaded the document
    pub owner: OwnerId,

    /// Application form the document belongs to, when the caller supplied one
    pub form_id: Option<i64>,

    /// Caller-supplied category tag such as `transcript`
    pub category: String,

    /// Filename as declared by the uploader, kept for display only
    pub original_filename: String,

    /// Where and how the bytes were stored
    pub stored: StoredDocument,

    /// When the document was accepted
    pub uploaded_at: DateTime<Utc>,
}

/// Persists document records
///
/// # Examples
///
/// ```rust
/// use admissions_intake::records::{DocumentId, DocumentRecord, MetadataRecorder, RecordError};
/// use async_trait::async_trait;
/// use std::sync::Mutex;
///
/// #[derive(Default)]
/// struct InMemory(Mutex<Vec<DocumentRecord>>);
///
/// #[async_trait]
/// impl MetadataRecorder for InMemory {
///     async fn record(&self, record: &DocumentRecord) -> Result<DocumentId, RecordError> {
///         let mut rows = self.0.lock().unwrap();
///         rows.push(record.clone());
///         Ok(rows.len() as DocumentId)
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataRecorder: Send + Sync {
    /// Persists `record` and returns its id
    ///
    /// # Errors
    ///
    /// Returns `RecordError` if the record could not be persisted. The
    /// pipeline then removes the stored file.
    async fn record(&self, record: &DocumentRecord) -> Result<DocumentId, RecordError>;
}

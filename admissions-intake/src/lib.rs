//! admissions-intake: document intake for admissions applications
//!
//! Takes one uploaded document (transcript scan, passport photo, result
//! slip) and turns it into a durable file plus a metadata record:
//!
//! 1. **Validate** the declared extension against an allow-list
//! 2. **Measure** the upload and reject anything over the size limit
//! 3. **Compress** images by re-encoding them as JPEG towards a byte ceiling
//! 4. **Store** the bytes under a random name in the owner's directory
//! 5. **Record** the metadata, removing the file again if that fails
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use admissions_intake::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     admissions_intake::observability::init()?;
//!
//!     let config = IntakeConfig::load_for_service("admissions")?;
//!     let store = LocalDocumentStore::open(&config.storage.root).await?;
//!     let recorder = PgMetadataRecorder::connect("postgres://localhost/admissions", 5).await?;
//!     let pipeline = DocumentPipeline::new(&config, Arc::new(store), Arc::new(recorder));
//!
//!     let body = std::io::Cursor::new(tokio::fs::read("passport.png").await?);
//!     let request = UploadRequest::new("17".parse()?, "passport.png", "passport", body);
//!     let receipt = pipeline.ingest(request).await?;
//!
//!     println!("{} ({})", receipt.document, receipt.compression_ratio_display());
//!     Ok(())
//! }
//! ```

#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod observability;
pub mod pipeline;
pub mod records;
pub mod storage;

pub mod prelude {
    //! Convenience re-exports for common types and traits
    //!
    //! # Examples
    //!
    //! ```rust
    //! use admissions_intake::prelude::*;
    //! ```

    // Configuration
    pub use crate::config::IntakeConfig;

    // Errors
    pub use crate::error::{DocumentAccessError, IngestError};

    // Extractors
    pub use crate::extractors::{DocumentUpload, UploadFormError};

    // Pipeline
    pub use crate::pipeline::{DocumentPipeline, IngestReceipt, UploadRequest};

    // Metadata
    pub use crate::records::{DocumentId, DocumentRecord, MetadataRecorder, PgMetadataRecorder, RecordError};

    // Storage
    pub use crate::storage::{
        DocumentStore, ImageCompressor, LocalDocumentStore, OwnerId, StorageError, StoredDocument,
    };

    pub use axum;
}

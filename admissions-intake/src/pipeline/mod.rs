//! Ingest orchestration
//!
//! [`DocumentPipeline`] runs one upload through the intake stages:
//!
//! ```text
//! Validated → Measured → Compressed | CompressionSkipped | CompressionFailed
//!           → Stored → MetadataRecorded
//! ```
//!
//! Rejections happen before any byte touches the disk. Once a document is
//! stored it is either referenced by a metadata record or removed again.

mod guard;

use crate::config::{IntakeConfig, UploadSettings};
use crate::error::{DocumentAccessError, IngestError};
use crate::records::{DocumentId, DocumentRecord, MetadataRecorder};
use crate::storage::probe::probe_len;
use crate::storage::validation::detect_mime;
use crate::storage::{
    CompressionError, DocumentStore, ExtensionValidator, ImageCompressor, OwnerId, StoredDocument,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use guard::CompensationGuard;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek};

/// One document to ingest
///
/// `filename` and `category` are untrusted. The filename only contributes
/// its extension to the stored name.
#[derive(Debug)]
pub struct UploadRequest<R> {
    /// Principal the document belongs to
    pub owner: OwnerId,
    /// Filename declared by the uploader
    pub filename: String,
    /// Category tag such as `transcript`
    pub category: String,
    /// Application form the document is attached to
    pub form_id: Option<i64>,
    /// Upload content
    pub body: R,
}

impl<R> UploadRequest<R>
where
    R: AsyncRead + AsyncSeek + Unpin + Send,
{
    /// Creates a request without a form id
    pub fn new(
        owner: OwnerId,
        filename: impl Into<String>,
        category: impl Into<String>,
        body: R,
    ) -> Self {
        Self {
            owner,
            filename: filename.into(),
            category: category.into(),
            form_id: None,
            body,
        }
    }

    /// Attaches the document to an application form
    #[must_use]
    pub const fn with_form_id(mut self, form_id: i64) -> Self {
        self.form_id = Some(form_id);
        self
    }
}

/// Result of a completed ingest
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IngestReceipt {
    /// Id assigned by the metadata recorder
    pub document_id: DocumentId,
    /// The stored document
    pub document: StoredDocument,
}

impl IngestReceipt {
    /// Percentage of bytes saved by compression
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        self.document.compression_ratio()
    }

    /// Compression ratio with one decimal and a percent sign, e.g. `87.5%`
    #[must_use]
    pub fn compression_ratio_display(&self) -> String {
        format!("{:.1}%", self.compression_ratio())
    }
}

impl IntoResponse for IngestReceipt {
    fn into_response(self) -> Response {
        let body = json!({
            "message": "Document uploaded successfully",
            "document_id": self.document_id,
            "stored_filename": self.document.stored_filename,
            "original_size": self.document.original_size,
            "compressed_size": self.document.final_size,
            "is_compressed": self.document.is_compressed,
            "compression_ratio": self.compression_ratio_display(),
        });
        (StatusCode::CREATED, Json(body)).into_response()
    }
}

/// Named points an ingest passes through, used in log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Extension accepted
    Validated,
    /// Size known and within the limit
    Measured,
    /// Bytes replaced by a re-encoded JPEG
    Compressed,
    /// Not an image, or compression disabled
    CompressionSkipped,
    /// Compression errored; the original bytes are kept
    CompressionFailed,
    /// Bytes durable on disk
    Stored,
    /// Metadata record persisted
    MetadataRecorded,
}

impl IngestStage {
    /// Stage name in log output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Measured => "measured",
            Self::Compressed => "compressed",
            Self::CompressionSkipped => "compression_skipped",
            Self::CompressionFailed => "compression_failed",
            Self::Stored => "stored",
            Self::MetadataRecorded => "metadata_recorded",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validates, compresses, stores and records uploaded documents
///
/// Cheap to clone; clones share the store and the recorder.
///
/// # Examples
///
/// ```rust,no_run
/// use admissions_intake::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = IntakeConfig::load_for_service("admissions")?;
/// let store = LocalDocumentStore::open(&config.storage.root).await?;
/// let recorder = PgMetadataRecorder::connect("postgres://localhost/admissions", 5).await?;
/// let pipeline = DocumentPipeline::new(&config, Arc::new(store), Arc::new(recorder));
///
/// let body = std::io::Cursor::new(std::fs::read("waec.pdf")?);
/// let request = UploadRequest::new("17".parse()?, "waec.pdf", "transcript", body).with_form_id(3);
/// let receipt = pipeline.ingest(request).await?;
/// println!("document {} saved {}", receipt.document_id, receipt.compression_ratio_display());
/// # Ok(())
/// # }
/// ```
pub struct DocumentPipeline<S, M> {
    upload: UploadSettings,
    compression_enabled: bool,
    validator: ExtensionValidator,
    compressor: ImageCompressor,
    store: Arc<S>,
    recorder: Arc<M>,
}

impl<S, M> Clone for DocumentPipeline<S, M> {
    fn clone(&self) -> Self {
        Self {
            upload: self.upload.clone(),
            compression_enabled: self.compression_enabled,
            validator: self.validator.clone(),
            compressor: self.compressor.clone(),
            store: Arc::clone(&self.store),
            recorder: Arc::clone(&self.recorder),
        }
    }
}

impl<S, M> fmt::Debug for DocumentPipeline<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentPipeline")
            .field("upload", &self.upload)
            .field("compression_enabled", &self.compression_enabled)
            .field("compressor", &self.compressor)
            .finish_non_exhaustive()
    }
}

impl<S, M> DocumentPipeline<S, M>
where
    S: DocumentStore + 'static,
    M: MetadataRecorder,
{
    /// Builds a pipeline from configuration and its two collaborators
    #[must_use]
    pub fn new(config: &IntakeConfig, store: Arc<S>, recorder: Arc<M>) -> Self {
        Self {
            upload: config.upload.clone(),
            compression_enabled: config.compression.enabled,
            validator: config.upload.validator(),
            compressor: config.compression.compressor(),
            store,
            recorder,
        }
    }

    /// Runs one upload through every stage
    ///
    /// # Errors
    ///
    /// - `RejectedExtension` / `OversizedUpload` before any I/O
    /// - `Read` if the body cannot be measured or read
    /// - `StorageWrite` if the store failed; nothing is left on disk
    /// - `MetadataPersist` if the recorder failed; the stored file is removed
    pub async fn ingest<R>(&self, request: UploadRequest<R>) -> Result<IngestReceipt, IngestError>
    where
        R: AsyncRead + AsyncSeek + Unpin + Send,
    {
        let UploadRequest {
            owner,
            filename,
            category,
            form_id,
            mut body,
        } = request;

        let Some(extension) = self.validator.validate(&filename) else {
            tracing::info!(owner = %owner, filename = %filename, "upload rejected: extension not allowed");
            return Err(IngestError::RejectedExtension { filename });
        };
        tracing::debug!(owner = %owner, stage = %IngestStage::Validated, extension = %extension);

        let limit = self.upload.max_bytes;
        let size = probe_len(&mut body).await.map_err(IngestError::Read)?;
        if size > limit {
            tracing::info!(owner = %owner, size, limit, "upload rejected: too large");
            return Err(IngestError::OversizedUpload { size, limit });
        }
        tracing::debug!(owner = %owner, stage = %IngestStage::Measured, size);

        let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
        (&mut body)
            .take(limit.saturating_add(1))
            .read_to_end(&mut data)
            .await
            .map_err(IngestError::Read)?;
        let original_size = data.len() as u64;
        if original_size > limit {
            return Err(IngestError::OversizedUpload {
                size: original_size,
                limit,
            });
        }

        let (data, is_compressed) = self.maybe_compress(data, &owner, &filename).await;
        let final_size = data.len() as u64;
        let mime_type = detect_mime(&data, Some(&extension));

        let directory = self.store.owner_dir(&owner);
        let stored_filename = self
            .store
            .save(data, &directory, &filename)
            .await
            .map_err(IngestError::StorageWrite)?;
        let path = directory.join(&stored_filename);
        let guard = CompensationGuard::new(Arc::clone(&self.store), path.clone());
        tracing::debug!(owner = %owner, stage = %IngestStage::Stored, path = %path.display());

        let stored = StoredDocument {
            stored_filename,
            path,
            original_size,
            final_size,
            is_compressed,
            mime_type,
        };
        let record = DocumentRecord {
            owner,
            form_id,
            category,
            original_filename: filename,
            stored,
            uploaded_at: Utc::now(),
        };

        match self.recorder.record(&record).await {
            Ok(document_id) => {
                guard.disarm();
                tracing::info!(
                    owner = %record.owner,
                    stage = %IngestStage::MetadataRecorded,
                    document_id,
                    category = %record.category,
                    original_size,
                    final_size,
                    is_compressed,
                    "document ingested"
                );
                Ok(IngestReceipt {
                    document_id,
                    document: record.stored,
                })
            }
            Err(e) => {
                tracing::warn!(owner = %record.owner, error = %e, "metadata not recorded");
                guard.compensate().await;
                Err(IngestError::MetadataPersist(e))
            }
        }
    }

    /// Reads a stored document
    ///
    /// # Errors
    ///
    /// `NotFound` for missing documents, `InvalidPath` for paths outside
    /// the store.
    pub async fn download(&self, path: &Path) -> Result<Vec<u8>, DocumentAccessError> {
        let data = self.store.read(path).await?;
        tracing::debug!(path = %path.display(), size = data.len(), "document read");
        Ok(data)
    }

    /// Deletes a stored document; absent documents are not an error
    ///
    /// # Errors
    ///
    /// `InvalidPath` for paths outside the store, `Io` if removal fails.
    pub async fn purge(&self, path: &Path) -> Result<(), DocumentAccessError> {
        self.store.delete(path).await?;
        tracing::info!(path = %path.display(), "document purged");
        Ok(())
    }

    /// Returns the bytes to store and whether they are a re-encoding
    async fn maybe_compress(
        &self,
        data: Vec<u8>,
        owner: &OwnerId,
        filename: &str,
    ) -> (Vec<u8>, bool) {
        if !self.compression_enabled || !self.upload.is_compressible(filename) {
            tracing::debug!(owner = %owner, stage = %IngestStage::CompressionSkipped);
            return (data, false);
        }

        let original = Arc::new(data);
        let input = Arc::clone(&original);
        let compressor = self.compressor.clone();
        let result = tokio::task::spawn_blocking(move || compressor.compress(&input))
            .await
            .map_err(|e| CompressionError::TaskFailed(e.to_string()))
            .and_then(std::convert::identity);
        let original = Arc::try_unwrap(original).unwrap_or_else(|shared| shared.as_ref().clone());

        match result {
            Ok(outcome) if outcome.data == original => {
                tracing::debug!(owner = %owner, stage = %IngestStage::CompressionSkipped, "re-encoding identical to upload");
                (original, false)
            }
            Ok(outcome) => {
                tracing::debug!(
                    owner = %owner,
                    stage = %IngestStage::Compressed,
                    quality = outcome.quality,
                    trials = outcome.trials.len(),
                    original_size = outcome.original_size,
                    final_size = outcome.final_size,
                    reached_target = outcome.reached_target
                );
                (outcome.data, true)
            }
            Err(e) => {
                tracing::warn!(
                    owner = %owner,
                    stage = %IngestStage::CompressionFailed,
                    error = %e,
                    "storing original bytes"
                );
                (original, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{MockMetadataRecorder, RecordError};
    use crate::storage::{MockDocumentStore, StorageError};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::path::PathBuf;

    const OWNER_DIR: &str = "/uploads/applicant_17";
    const PDF: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

    fn owner() -> OwnerId {
        "17".parse().unwrap()
    }

    fn store_with_dir() -> MockDocumentStore {
        let mut store = MockDocumentStore::new();
        store
            .expect_owner_dir()
            .returning(|_| PathBuf::from(OWNER_DIR));
        store
    }

    fn pipeline(
        config: &IntakeConfig,
        store: MockDocumentStore,
        recorder: MockMetadataRecorder,
    ) -> DocumentPipeline<MockDocumentStore, MockMetadataRecorder> {
        DocumentPipeline::new(config, Arc::new(store), Arc::new(recorder))
    }

    fn request(filename: &str, body: &[u8]) -> UploadRequest<Cursor<Vec<u8>>> {
        UploadRequest::new(owner(), filename, "transcript", Cursor::new(body.to_vec()))
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x ^ y) % 256) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_rejected_extension_touches_nothing() {
        let pipeline = pipeline(
            &IntakeConfig::default(),
            MockDocumentStore::new(),
            MockMetadataRecorder::new(),
        );

        let err = pipeline.ingest(request("virus.exe", b"MZ")).await.unwrap_err();
        assert!(matches!(err, IngestError::RejectedExtension { filename } if filename == "virus.exe"));
    }

    #[tokio::test]
    async fn test_oversized_upload_touches_nothing() {
        let mut config = IntakeConfig::default();
        config.upload.max_bytes = 16;
        let pipeline = pipeline(&config, MockDocumentStore::new(), MockMetadataRecorder::new());

        let err = pipeline.ingest(request("big.pdf", &[0u8; 17])).await.unwrap_err();
        assert!(matches!(err, IngestError::OversizedUpload { size: 17, limit: 16 }));
    }

    #[tokio::test]
    async fn test_limit_is_inclusive() {
        let mut config = IntakeConfig::default();
        config.upload.max_bytes = PDF.len() as u64;

        let mut store = store_with_dir();
        store
            .expect_save()
            .times(1)
            .returning(|_, _, _| Ok("a.pdf".to_string()));
        let mut recorder = MockMetadataRecorder::new();
        recorder.expect_record().times(1).returning(|_| Ok(1));

        let receipt = pipeline(&config, store, recorder)
            .ingest(request("exact.pdf", PDF))
            .await
            .unwrap();
        assert_eq!(receipt.document.original_size, PDF.len() as u64);
    }

    #[tokio::test]
    async fn test_pdf_stored_verbatim() {
        let mut store = store_with_dir();
        store
            .expect_save()
            .withf(|data, dir, name| {
                data.as_slice() == PDF && dir == Path::new(OWNER_DIR) && name == "WAEC result.PDF"
            })
            .times(1)
            .returning(|_, _, _| Ok("0b6c.pdf".to_string()));

        let mut recorder = MockMetadataRecorder::new();
        recorder
            .expect_record()
            .withf(|record| {
                record.category == "transcript"
                    && record.form_id == Some(3)
                    && record.original_filename == "WAEC result.PDF"
                    && record.stored.path == Path::new(OWNER_DIR).join("0b6c.pdf")
            })
            .times(1)
            .returning(|_| Ok(41));

        let receipt = pipeline(&IntakeConfig::default(), store, recorder)
            .ingest(request("WAEC result.PDF", PDF).with_form_id(3))
            .await
            .unwrap();

        assert_eq!(receipt.document_id, 41);
        assert!(!receipt.document.is_compressed);
        assert_eq!(receipt.document.original_size, receipt.document.final_size);
        assert_eq!(receipt.document.mime_type, "application/pdf");
        assert_eq!(receipt.compression_ratio_display(), "0.0%");
    }

    #[tokio::test]
    async fn test_png_is_recompressed() {
        let original = png(64, 64);
        let original_len = original.len() as u64;

        let mut store = store_with_dir();
        store
            .expect_save()
            .withf(|data, _, _| data.starts_with(&[0xFF, 0xD8, 0xFF]))
            .times(1)
            .returning(|_, _, _| Ok("c1.png".to_string()));
        let mut recorder = MockMetadataRecorder::new();
        recorder.expect_record().times(1).returning(|_| Ok(2));

        let receipt = pipeline(&IntakeConfig::default(), store, recorder)
            .ingest(request("photo.png", &original))
            .await
            .unwrap();

        assert!(receipt.document.is_compressed);
        assert_eq!(receipt.document.original_size, original_len);
        assert_eq!(receipt.document.mime_type, "image/jpeg");
        assert_eq!(receipt.document.stored_filename, "c1.png");
    }

    #[tokio::test]
    async fn test_compression_disabled_stores_original() {
        let original = png(16, 16);
        let mut config = IntakeConfig::default();
        config.compression.enabled = false;

        let expected = original.clone();
        let mut store = store_with_dir();
        store
            .expect_save()
            .withf(move |data, _, _| *data == expected)
            .times(1)
            .returning(|_, _, _| Ok("d.png".to_string()));
        let mut recorder = MockMetadataRecorder::new();
        recorder.expect_record().times(1).returning(|_| Ok(3));

        let receipt = pipeline(&config, store, recorder)
            .ingest(request("d.png", &original))
            .await
            .unwrap();
        assert!(!receipt.document.is_compressed);
        assert_eq!(receipt.document.mime_type, "image/png");
    }

    #[tokio::test]
    async fn test_undecodable_image_degrades_to_original() {
        let garbage = b"definitely not a jpeg".to_vec();
        let expected = garbage.clone();

        let mut store = store_with_dir();
        store
            .expect_save()
            .withf(move |data, _, _| *data == expected)
            .times(1)
            .returning(|_, _, _| Ok("e.jpg".to_string()));
        let mut recorder = MockMetadataRecorder::new();
        recorder.expect_record().times(1).returning(|_| Ok(4));

        let receipt = pipeline(&IntakeConfig::default(), store, recorder)
            .ingest(request("scan.jpg", &garbage))
            .await
            .unwrap();
        assert!(!receipt.document.is_compressed);
        assert_eq!(receipt.document.final_size, garbage.len() as u64);
    }

    #[tokio::test]
    async fn test_store_failure_skips_recorder() {
        let mut store = store_with_dir();
        store.expect_save().times(1).returning(|_, dir, _| {
            Err(StorageError::Write {
                path: dir.join(".x.partial"),
                source: std::io::Error::other("disk full"),
            })
        });
        let mut recorder = MockMetadataRecorder::new();
        recorder.expect_record().times(0);

        let err = pipeline(&IntakeConfig::default(), store, recorder)
            .ingest(request("a.pdf", PDF))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::StorageWrite(_)));
    }

    #[tokio::test]
    async fn test_recorder_failure_removes_document() {
        let mut store = store_with_dir();
        store
            .expect_save()
            .times(1)
            .returning(|_, _, _| Ok("f.pdf".to_string()));
        store
            .expect_delete()
            .withf(|path| path == Path::new(OWNER_DIR).join("f.pdf"))
            .times(1)
            .returning(|_| Ok(()));
        let mut recorder = MockMetadataRecorder::new();
        recorder
            .expect_record()
            .times(1)
            .returning(|_| Err(RecordError::Rejected("constraint violation".to_string())));

        let err = pipeline(&IntakeConfig::default(), store, recorder)
            .ingest(request("a.pdf", PDF))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MetadataPersist(_)));
    }

    #[tokio::test]
    async fn test_download_and_purge_delegate() {
        let mut store = MockDocumentStore::new();
        store
            .expect_read()
            .returning(|_| Err(StorageError::NotFound("gone.pdf".to_string())));
        store.expect_delete().times(1).returning(|_| Ok(()));
        let pipeline = pipeline(&IntakeConfig::default(), store, MockMetadataRecorder::new());

        let err = pipeline
            .download(Path::new("/uploads/applicant_1/gone.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err.0, StorageError::NotFound(_)));

        pipeline
            .purge(Path::new("/uploads/applicant_1/gone.pdf"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_receipt_response_body() {
        let receipt = IngestReceipt {
            document_id: 9,
            document: StoredDocument {
                stored_filename: "x.jpg".to_string(),
                path: PathBuf::from("/uploads/applicant_1/x.jpg"),
                original_size: 8000,
                final_size: 1000,
                is_compressed: true,
                mime_type: "image/jpeg".to_string(),
            },
        };
        assert_eq!(receipt.compression_ratio_display(), "87.5%");

        let response = receipt.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["document_id"], 9);
        assert_eq!(body["original_size"], 8000);
        assert_eq!(body["compressed_size"], 1000);
        assert_eq!(body["is_compressed"], true);
        assert_eq!(body["compression_ratio"], "87.5%");
        assert_eq!(body["stored_filename"], "x.jpg");
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(IngestStage::CompressionFailed.to_string(), "compression_failed");
        assert_eq!(IngestStage::MetadataRecorded.as_str(), "metadata_recorded");
    }
}

//! Core types for document storage

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during document store operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Document not found in storage
    #[error("Document not found: {0}")]
    NotFound(String),

    /// I/O error during a storage operation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Path lies outside the configured storage root, or is not an owner directory
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Writing a document failed; any partial file has already been removed
    #[error("Failed to write {path}: {source}")]
    Write {
        /// Destination that could not be written
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Maximum length of an owner identifier
pub const MAX_OWNER_ID_LEN: usize = 64;

/// Error returned when an owner identifier cannot be used as a directory name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid owner id {0:?}: expected 1-64 characters from [A-Za-z0-9_-]")]
pub struct InvalidOwnerId(pub String);

/// Identifier of the principal that owns a set of documents
///
/// The value ends up as part of a directory name, so it is restricted to
/// ASCII alphanumerics, `-` and `_`.
///
/// # Examples
///
/// ```rust
/// use admissions_intake::storage::OwnerId;
///
/// let owner: OwnerId = "42".parse().unwrap();
/// assert_eq!(owner.as_str(), "42");
///
/// assert!("../42".parse::<OwnerId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Creates an owner id after checking its character set and length
    ///
    /// # Errors
    ///
    /// Returns `InvalidOwnerId` if the value is empty, too long, or contains
    /// characters outside `[A-Za-z0-9_-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidOwnerId> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= MAX_OWNER_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if valid {
            Ok(Self(value))
        } else {
            Err(InvalidOwnerId(value))
        }
    }

    /// Returns the id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OwnerId {
    type Err = InvalidOwnerId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = InvalidOwnerId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OwnerId> for String {
    fn from(owner: OwnerId) -> Self {
        owner.0
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A document that has been written to the store
///
/// Created once per successful upload and never modified afterwards.
/// `final_size` may equal `original_size` when compression was skipped or
/// failed; it may even exceed it for tiny images that re-encode larger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredDocument {
    /// System-generated name on disk
    pub stored_filename: String,

    /// Full path of the stored file (root / owner dir / stored filename)
    pub path: PathBuf,

    /// Size of the upload as received, in bytes
    pub original_size: u64,

    /// Size of the bytes actually written, in bytes
    pub final_size: u64,

    /// Whether the stored bytes are a re-encoding of the upload
    pub is_compressed: bool,

    /// MIME type detected for the stored bytes
    pub mime_type: String,
}

impl StoredDocument {
    /// Percentage of bytes saved by compression, `0.0` for empty uploads
    ///
    /// # Examples
    ///
    /// ```rust
    /// use admissions_intake::storage::StoredDocument;
    /// use std::path::PathBuf;
    ///
    /// let doc = StoredDocument {
    ///     stored_filename: "a.jpg".to_string(),
    ///     path: PathBuf::from("/uploads/applicant_1/a.jpg"),
    ///     original_size: 1000,
    ///     final_size: 250,
    ///     is_compressed: true,
    ///     mime_type: "image/jpeg".to_string(),
    /// };
    /// assert!((doc.compression_ratio() - 75.0).abs() < f64::EPSILON);
    /// ```
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        (1.0 - self.final_size as f64 / self.original_size as f64) * 100.0
    }
}

impl fmt::Display for StoredDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoredDocument(name={}, original={}, final={}, compressed={})",
            self.stored_filename, self.original_size, self.final_size, self.is_compressed
        )
    }
}

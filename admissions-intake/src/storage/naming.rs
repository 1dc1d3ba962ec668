//! Collision-free names for stored documents
//!
//! The only piece of the declared filename that survives is its extension,
//! and only when it is a short run of ASCII alphanumerics. Everything else
//! comes from a random v4 UUID, which keeps traversal sequences, separators
//! and user-chosen names off the disk.

use super::validation::extension_of;
use uuid::Uuid;

/// Extension used when the declared one is missing or unusable
pub const FALLBACK_EXTENSION: &str = "bin";

/// Longest extension carried over from the declared filename
pub const MAX_EXTENSION_LEN: usize = 10;

/// Generates stored filenames
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageNamer;

impl StorageNamer {
    /// Creates a namer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates a fresh stored filename for a document declared as `original`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use admissions_intake::storage::naming::StorageNamer;
    ///
    /// let name = StorageNamer::new().name_for("evil/../../etc/passwd.PNG");
    /// assert!(name.ends_with(".png"));
    /// assert!(!name.contains('/'));
    /// assert!(!name.contains(".."));
    /// ```
    #[must_use]
    pub fn name_for(&self, original: &str) -> String {
        format!("{}.{}", Uuid::new_v4().hyphenated(), Self::safe_extension(original))
    }

    /// The extension a stored file will carry for a declared filename
    #[must_use]
    pub fn safe_extension(original: &str) -> String {
        extension_of(original)
            .filter(|ext| {
                !ext.is_empty()
                    && ext.len() <= MAX_EXTENSION_LEN
                    && ext.bytes().all(|b| b.is_ascii_alphanumeric())
            })
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
    }
}

//! Filename extension validation and MIME detection
//!
//! The extension check is a cheap first gate applied to the declared
//! filename before any bytes are read. It does **not** look at content, so a
//! `.png` that is really a shell script passes. Safety on disk comes from the
//! [`StorageNamer`](super::naming::StorageNamer), which never reuses the
//! declared name.
//!
//! # Examples
//!
//! ```rust
//! use admissions_intake::storage::validation::{extension_of, ExtensionValidator};
//!
//! let validator = ExtensionValidator::default();
//! assert!(validator.is_allowed("Transcript.PDF"));
//! assert!(!validator.is_allowed("payload.exe"));
//! assert!(!validator.is_allowed("README"));
//!
//! assert_eq!(extension_of("photo.JPeG").as_deref(), Some("jpeg"));
//! ```

use std::collections::BTreeSet;

/// Extensions accepted by default
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "doc", "docx"];

/// MIME type used when nothing better can be determined
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// Returns the lowercase substring after the last `.` of `filename`
///
/// Returns `None` when the name contains no `.` at all. A trailing dot
/// yields `Some("")`, which no allow-list contains.
#[must_use]
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Allow-list check on declared filenames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionValidator {
    allowed: BTreeSet<String>,
}

impl Default for ExtensionValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_EXTENSIONS.iter().copied())
    }
}

impl ExtensionValidator {
    /// Creates a validator for the given extensions (case-insensitive, leading dots ignored)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use admissions_intake::storage::validation::ExtensionValidator;
    ///
    /// let validator = ExtensionValidator::new([".PDF", "png"]);
    /// assert!(validator.is_allowed("scan.pdf"));
    /// assert!(!validator.is_allowed("scan.jpg"));
    /// ```
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed }
    }

    /// Returns the lowercase extension if it is on the allow-list
    #[must_use]
    pub fn validate(&self, filename: &str) -> Option<String> {
        extension_of(filename).filter(|ext| self.allowed.contains(ext))
    }

    /// Whether `filename` carries an allowed extension
    #[must_use]
    pub fn is_allowed(&self, filename: &str) -> bool {
        self.validate(filename).is_some()
    }

    /// Iterates the allowed extensions in sorted order
    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }
}

/// Determines the MIME type of stored bytes
///
/// Magic-number detection wins; the declared extension is only consulted
/// when the content has no recognizable signature (plain-text formats, old
/// `.doc` files on some platforms).
#[must_use]
pub fn detect_mime(data: &[u8], extension: Option<&str>) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    extension
        .and_then(|ext| mime_guess::from_ext(ext).first())
        .map_or_else(|| FALLBACK_MIME.to_string(), |mime| mime.essence_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a.pdf").as_deref(), Some("pdf"));
        assert_eq!(extension_of("archive.tar.GZ").as_deref(), Some("gz"));
        assert_eq!(extension_of("trailing.").as_deref(), Some(""));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of(""), None);
    }

    #[test]
    fn test_default_allow_list() {
        let validator = ExtensionValidator::default();
        for name in ["a.pdf", "a.jpg", "a.JPEG", "a.png", "a.doc", "a.DocX"] {
            assert!(validator.is_allowed(name), "{name} should be allowed");
        }
        for name in ["a.gif", "a.exe", "a.pdf.exe", "pdf", "a.", ""] {
            assert!(!validator.is_allowed(name), "{name} should be rejected");
        }
    }

    #[test]
    fn test_traversal_name_passes_extension_check_only() {
        let validator = ExtensionValidator::default();
        assert_eq!(
            validator.validate("evil/../../etc/passwd.png").as_deref(),
            Some("png")
        );
    }

    #[test]
    fn test_custom_allow_list_normalizes() {
        let validator = ExtensionValidator::new([".TXT", "", "csv"]);
        assert_eq!(validator.allowed().collect::<Vec<_>>(), vec!["csv", "txt"]);
    }

    #[test]
    fn test_detect_mime_prefers_content() {
        let png_magic = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        assert_eq!(detect_mime(&png_magic, Some("pdf")), "image/png");
        assert_eq!(detect_mime(b"%PDF-1.7\n", None), "application/pdf");
    }

    #[test]
    fn test_detect_mime_falls_back_to_extension() {
        assert_eq!(detect_mime(b"plain words", Some("pdf")), "application/pdf");
        assert_eq!(detect_mime(b"plain words", Some("nope")), FALLBACK_MIME);
        assert_eq!(detect_mime(b"", None), FALLBACK_MIME);
    }

    proptest! {
        #[test]
        fn prop_names_without_dot_are_rejected(name in "[^.]{0,40}") {
            prop_assert!(!ExtensionValidator::default().is_allowed(&name));
        }

        #[test]
        fn prop_case_does_not_matter(stem in "[a-zA-Z0-9_/ -]{0,20}", upper in any::<bool>()) {
            let ext = if upper { "PDF" } else { "pdf" };
            let name = format!("{stem}.{ext}");
            prop_assert!(ExtensionValidator::default().is_allowed(&name));
        }
    }
}

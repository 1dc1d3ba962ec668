//! Document store trait definition

use super::types::{OwnerId, StorageResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Abstraction over where uploaded documents live
///
/// Implementations must:
/// - Generate the stored filename themselves (never from the declared name)
/// - Leave no partial file behind when `save` fails
/// - Treat deleting an absent file as success
/// - Tolerate concurrent `save` calls into the same directory
///
/// Authorization is the caller's job: `read` and `delete` trust the path
/// they are given as long as it lies inside the store.
///
/// # Examples
///
/// ```rust,no_run
/// use admissions_intake::storage::{DocumentStore, LocalDocumentStore, OwnerId};
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = LocalDocumentStore::open("/var/uploads").await?;
/// let owner: OwnerId = "42".parse()?;
///
/// let dir = store.owner_dir(&owner);
/// let name = store.save(b"%PDF-1.7".to_vec(), &dir, "transcript.pdf").await?;
///
/// let bytes = store.read(&dir.join(&name)).await?;
/// store.delete(&dir.join(&name)).await?;
/// # Ok(())
/// # }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Directory that holds all documents of `owner`
    fn owner_dir(&self, owner: &OwnerId) -> PathBuf;

    /// Writes `data` into `directory` under a freshly generated name
    ///
    /// `original_filename` is consulted for its extension only. The
    /// directory is created if missing; its ancestors are not.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` if `directory` is not an owner
    /// directory of this store, and `StorageError::Write` if the bytes could
    /// not be made durable.
    async fn save(
        &self,
        data: Vec<u8>,
        directory: &Path,
        original_filename: &str,
    ) -> StorageResult<String>;

    /// Reads a stored document
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the file is missing and
    /// `StorageError::InvalidPath` if `path` lies outside the store.
    async fn read(&self, path: &Path) -> StorageResult<Vec<u8>>;

    /// Removes a stored document; absent files are not an error
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` if `path` lies outside the store,
    /// or `StorageError::Io` if removal fails for another reason.
    async fn delete(&self, path: &Path) -> StorageResult<()>;
}

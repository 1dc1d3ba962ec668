//! Local filesystem document store

use super::naming::StorageNamer;
use super::traits::DocumentStore;
use super::types::{OwnerId, StorageError, StorageResult};
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::task::{self, JoinHandle};

/// Default prefix of owner directory names
pub const DEFAULT_OWNER_DIR_PREFIX: &str = "applicant_";

/// Local filesystem document store
///
/// Every owner gets one flat directory directly under the root. Files are
/// written to a hidden temporary name, synced, and renamed into place, so a
/// visible stored filename always refers to complete, durable bytes.
///
/// # Directory Structure
///
/// ```text
/// /var/uploads/
/// ├── applicant_17/
/// │   ├── 550e8400-e29b-41d4-a716-446655440000.pdf
/// │   └── a3bb189e-8bf9-4a9a-b5c7-9f9c3b8e5d7a.png
/// └── applicant_18/
///     └── 0f4c1a52-5b0e-4b5e-9d8b-0d1c9a7e2f11.docx
/// ```
///
/// # Examples
///
/// ```rust,no_run
/// use admissions_intake::storage::{DocumentStore, LocalDocumentStore};
///
/// # async fn example() -> anyhow::Result<()> {
/// let store = LocalDocumentStore::open("/var/uploads").await?;
/// let dir = store.owner_dir(&"17".parse()?);
/// let stored = store.save(vec![1, 2, 3], &dir, "scan.png").await?;
/// println!("Stored at: {}", dir.join(stored).display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalDocumentStore {
    /// Canonical root directory
    root: PathBuf,
    /// Prefix prepended to owner ids to form directory names
    owner_dir_prefix: String,
    namer: StorageNamer,
}

impl LocalDocumentStore {
    /// Opens a store rooted at `root`, creating the root if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `root` exists but is not a directory
    /// - The root cannot be created or canonicalized
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::open_with_prefix(root, DEFAULT_OWNER_DIR_PREFIX).await
    }

    /// Opens a store with a custom owner directory prefix
    ///
    /// # Errors
    ///
    /// Same as [`LocalDocumentStore::open`], plus `InvalidPath` if the
    /// prefix contains path separators or dots.
    pub async fn open_with_prefix(
        root: impl Into<PathBuf>,
        owner_dir_prefix: impl Into<String>,
    ) -> StorageResult<Self> {
        let root = root.into();
        let owner_dir_prefix = owner_dir_prefix.into();

        if !owner_dir_prefix
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(StorageError::InvalidPath(format!(
                "owner directory prefix {owner_dir_prefix:?} may only contain [A-Za-z0-9_-]"
            )));
        }

        match fs::metadata(&root).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(StorageError::InvalidPath(format!(
                    "{} is not a directory",
                    root.display()
                )));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => fs::create_dir_all(&root).await?,
            Err(e) => return Err(e.into()),
        }

        let root = fs::canonicalize(&root).await?;
        tracing::debug!(root = %root.display(), "document store opened");

        Ok(Self {
            root,
            owner_dir_prefix,
            namer: StorageNamer::new(),
        })
    }

    /// The canonical root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Checks that `directory` is a direct child of the root
    fn check_owner_dir(&self, directory: &Path) -> StorageResult<()> {
        let relative = directory
            .strip_prefix(&self.root)
            .map_err(|_| Self::outside(directory))?;

        let mut components = relative.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(()),
            _ => Err(Self::outside(directory)),
        }
    }

    /// Checks that `path` names a file inside an owner directory
    fn check_document_path(&self, path: &Path) -> StorageResult<()> {
        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| Self::outside(path))?;

        let components: Vec<Component<'_>> = relative.components().collect();
        match components.as_slice() {
            [Component::Normal(_), Component::Normal(_)] => Ok(()),
            _ => Err(Self::outside(path)),
        }
    }

    fn outside(path: &Path) -> StorageError {
        StorageError::InvalidPath(format!(
            "{} is not inside an owner directory of the store",
            path.display()
        ))
    }

    /// Creates `directory` unless it already exists
    ///
    /// Two uploads for a brand-new owner may race here; both must succeed.
    async fn ensure_directory(directory: &Path) -> std::io::Result<()> {
        match fs::create_dir(directory).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if fs::metadata(directory).await?.is_dir() {
                    Ok(())
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Writes `data` to `directory/stored_filename` through a temporary file
    ///
    /// The write runs on the blocking pool and is owned by a [`PendingWrite`]
    /// until it has completed, so dropping this future never leaves a
    /// temporary or unconfirmed file behind.
    pub(crate) async fn save_as(
        &self,
        data: Vec<u8>,
        directory: &Path,
        stored_filename: &str,
    ) -> StorageResult<()> {
        self.check_owner_dir(directory)?;

        let final_path = directory.join(stored_filename);
        let write_error = |source: std::io::Error| StorageError::Write {
            path: final_path.clone(),
            source,
        };

        Self::ensure_directory(directory).await.map_err(write_error)?;

        let temp_path = directory.join(format!(".{stored_filename}.partial"));
        let size = data.len();
        let mut pending = PendingWrite::spawn(data, temp_path, final_path.clone());
        if let Err(e) = pending.wait().await {
            tracing::warn!(
                path = %final_path.display(),
                error = %e,
                "document write failed, partial file removed"
            );
            return Err(write_error(e));
        }

        tracing::debug!(path = %final_path.display(), size, "document written");
        Ok(())
    }
}

/// A durable write in flight on the blocking pool
///
/// Dropped before [`PendingWrite::wait`] returns (the caller was
/// cancelled), it lets the write finish and then removes both the temporary
/// and the final file.
struct PendingWrite {
    handle: Option<JoinHandle<std::io::Result<()>>>,
    temp_path: PathBuf,
    final_path: PathBuf,
}

impl PendingWrite {
    fn spawn(data: Vec<u8>, temp_path: PathBuf, final_path: PathBuf) -> Self {
        let (temp, target) = (temp_path.clone(), final_path.clone());
        let handle = task::spawn_blocking(move || {
            let result = write_durably(&temp, &data, &target);
            if result.is_err() {
                discard(&temp);
            }
            result
        });
        Self {
            handle: Some(handle),
            temp_path,
            final_path,
        }
    }

    async fn wait(&mut self) -> std::io::Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let result = handle
            .await
            .unwrap_or_else(|e| Err(std::io::Error::other(e.to_string())));
        self.handle = None;
        if result.is_err() {
            discard(&self.temp_path);
        }
        result
    }
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let temp_path = std::mem::take(&mut self.temp_path);
        let final_path = std::mem::take(&mut self.final_path);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            tracing::warn!(path = %final_path.display(), "document write cancelled, scheduling removal");
            runtime.spawn(async move {
                let _ = handle.await;
                let _ = task::spawn_blocking(move || {
                    discard(&temp_path);
                    discard(&final_path);
                })
                .await;
            });
        } else {
            tracing::error!(path = %final_path.display(), "no runtime to remove cancelled document write");
        }
    }
}

/// Creates `temp_path` exclusively, syncs it, and renames it to `final_path`
fn write_durably(temp_path: &Path, data: &[u8], final_path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;
    file.write_all(data)?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(temp_path, final_path)
}

/// Removes `path`, ignoring files that are already gone
fn discard(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            tracing::error!(path = %path.display(), error = %e, "failed to remove file");
        }
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    fn owner_dir(&self, owner: &OwnerId) -> PathBuf {
        self.root.join(format!("{}{owner}", self.owner_dir_prefix))
    }

    async fn save(
        &self,
        data: Vec<u8>,
        directory: &Path,
        original_filename: &str,
    ) -> StorageResult<String> {
        let stored_filename = self.namer.name_for(original_filename);
        self.save_as(data, directory, &stored_filename).await?;
        Ok(stored_filename)
    }

    async fn read(&self, path: &Path) -> StorageResult<Vec<u8>> {
        self.check_document_path(path)?;
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &Path) -> StorageResult<()> {
        self.check_document_path(path)?;
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "document deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Document storage building blocks
//!
//! Each piece of the intake pipeline lives in its own module:
//! - [`validation`]: declared-filename extension allow-list and MIME detection
//! - [`probe`]: exact size of a seekable upload without consuming it
//! - [`processing`]: adaptive JPEG re-encoding towards a byte ceiling
//! - [`naming`]: random, traversal-free stored filenames
//! - [`DocumentStore`] / [`LocalDocumentStore`]: per-owner durable storage
//!
//! The [`pipeline`](crate::pipeline) module wires them together.
//!
//! # Examples
//!
//! ```rust,no_run
//! use admissions_intake::storage::{DocumentStore, LocalDocumentStore, OwnerId};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = LocalDocumentStore::open("/var/uploads").await?;
//! let owner: OwnerId = "17".parse()?;
//!
//! let dir = store.owner_dir(&owner);
//! let stored = store.save(b"%PDF-1.4".to_vec(), &dir, "waec.pdf").await?;
//!
//! let bytes = store.read(&dir.join(&stored)).await?;
//! store.delete(&dir.join(&stored)).await?;
//! # Ok(())
//! # }
//! ```

mod local;
pub mod naming;
pub mod probe;
pub mod processing;
mod traits;
mod types;
pub mod validation;

pub use local::{LocalDocumentStore, DEFAULT_OWNER_DIR_PREFIX};
pub use naming::StorageNamer;
pub use processing::{CompressionError, CompressionOutcome, ImageCompressor, QualitySearch};
#[cfg(test)]
pub use traits::MockDocumentStore;
pub use traits::DocumentStore;
pub use types::{InvalidOwnerId, OwnerId, StorageError, StorageResult, StoredDocument};
pub use validation::ExtensionValidator;

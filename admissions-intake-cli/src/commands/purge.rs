//! `intake purge`

use super::SUCCESS;
use admissions_intake::config::IntakeConfig;
use admissions_intake::storage::{DocumentStore, LocalDocumentStore};
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::path::{Path, PathBuf};

/// Delete a stored document
#[derive(Debug, Args)]
pub struct PurgeCommand {
    /// Path of the stored document
    pub path: PathBuf,
}

impl PurgeCommand {
    /// Removes the document from the store; absent documents are not an error
    ///
    /// # Errors
    ///
    /// Returns an error if the path lies outside the configured store or the
    /// file cannot be removed.
    pub async fn execute(&self, config: &IntakeConfig) -> Result<()> {
        let store = LocalDocumentStore::open_with_prefix(
            &config.storage.root,
            &config.storage.owner_dir_prefix,
        )
        .await
        .context("Failed to open document store")?;

        let path = resolve(&self.path).await?;
        store.delete(&path).await?;
        tracing::info!(path = %path.display(), "document purged");

        println!("{SUCCESS} Purged {}", style(path.display()).cyan());
        Ok(())
    }
}

/// Canonicalizes the parent directory so paths compare against the canonical root
async fn resolve(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = tokio::fs::canonicalize(parent)
        .await
        .with_context(|| format!("{} does not exist", parent.display()))?;
    Ok(parent.join(file_name))
}

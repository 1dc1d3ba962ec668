//! `intake ingest`

use super::{format_bytes, INFO, SUCCESS};
use admissions_intake::prelude::*;
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;
use std::sync::Arc;

/// Store a document for an owner and record its metadata
#[derive(Debug, Args)]
pub struct IngestCommand {
    /// Owner (applicant) id
    #[arg(long)]
    pub owner: String,

    /// Document category, e.g. `transcript`
    #[arg(long)]
    pub category: String,

    /// Application form the document belongs to
    #[arg(long)]
    pub form_id: Option<i64>,

    /// File to ingest; its name is recorded as the original filename
    pub file: PathBuf,
}

impl IngestCommand {
    /// Runs the document through the full pipeline
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `database.url` is not configured
    /// - The owner id or file is invalid
    /// - The pipeline rejects or fails to store the document
    pub async fn execute(&self, config: &IntakeConfig) -> Result<()> {
        let url = config
            .database
            .url
            .as_deref()
            .context("database.url is not configured (set INTAKE_DATABASE__URL)")?;
        let owner: OwnerId = self.owner.parse()?;
        let filename = self
            .file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", self.file.display()))?;

        let store = LocalDocumentStore::open_with_prefix(
            &config.storage.root,
            &config.storage.owner_dir_prefix,
        )
        .await
        .context("Failed to open document store")?;
        let recorder = PgMetadataRecorder::connect(url, config.database.max_connections)
            .await
            .context("Failed to connect to the metadata database")?;
        let pipeline = DocumentPipeline::new(config, Arc::new(store), Arc::new(recorder));

        let body = tokio::fs::File::open(&self.file)
            .await
            .with_context(|| format!("Failed to open {}", self.file.display()))?;
        let mut request = UploadRequest::new(owner, filename, &self.category, body);
        if let Some(form_id) = self.form_id {
            request = request.with_form_id(form_id);
        }

        println!("\n{INFO} Ingesting {}", style(self.file.display()).cyan());
        let receipt = pipeline.ingest(request).await?;
        let document = &receipt.document;

        println!("{SUCCESS} Stored as document {}", style(receipt.document_id).bold());
        println!("  path:        {}", document.path.display());
        println!("  mime type:   {}", document.mime_type);
        println!(
            "  size:        {} -> {}",
            format_bytes(document.original_size),
            format_bytes(document.final_size)
        );
        if document.is_compressed {
            println!("  compression: {}", style(receipt.compression_ratio_display()).green());
        } else {
            println!("  compression: {}", style("none").dim());
        }

        Ok(())
    }
}

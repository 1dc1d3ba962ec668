//! `intake compress`

use super::{format_bytes, INFO, SUCCESS};
use admissions_intake::config::IntakeConfig;
use admissions_intake::storage::probe::probe_len_blocking;
use admissions_intake::storage::{CompressionOutcome, ImageCompressor, QualitySearch};
use anyhow::{bail, Context, Result};
use clap::Args;
use console::style;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Preview image compression without storing anything
#[derive(Debug, Args)]
pub struct CompressCommand {
    /// Image to compress
    pub file: PathBuf,

    /// Target size in bytes; defaults to `compression.target_bytes`
    #[arg(long)]
    pub target: Option<u64>,

    /// Use binary search over the quality grid
    #[arg(long)]
    pub binary: bool,

    /// Write the kept encoding here
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompressCommand {
    /// Runs the compressor and prints every trial
    ///
    /// # Errors
    ///
    /// Returns an error if the file is over `upload.max_bytes` or cannot be
    /// read or decoded.
    pub async fn execute(&self, config: &IntakeConfig) -> Result<()> {
        let mut settings = config.compression.clone();
        if let Some(target) = self.target {
            settings.target_bytes = target;
        }
        if self.binary {
            settings.strategy = QualitySearch::Binary;
        }
        let compressor = settings.compressor();

        let path = self.file.clone();
        let limit = config.upload.max_bytes;
        let outcome =
            tokio::task::spawn_blocking(move || compress_file(&compressor, &path, limit)).await??;

        println!(
            "\n{INFO} {} ({}), target {}",
            style(self.file.display()).cyan(),
            format_bytes(outcome.original_size),
            format_bytes(settings.target_bytes)
        );
        for trial in &outcome.trials {
            println!(
                "  quality {:>3}: {} (kept {})",
                trial.quality,
                format_bytes(trial.size as u64),
                format_bytes(trial.kept_size as u64)
            );
        }

        let verdict = if outcome.reached_target {
            style("within target").green()
        } else {
            style("above target").yellow()
        };
        println!(
            "{SUCCESS} Kept quality {}: {} ({verdict})",
            outcome.quality,
            format_bytes(outcome.final_size)
        );

        if let Some(output) = &self.output {
            tokio::fs::write(output, &outcome.data)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("  written to {}", output.display());
        }

        Ok(())
    }
}

/// Reads `path` unless it is over `limit` bytes, then compresses it
fn compress_file(compressor: &ImageCompressor, path: &Path, limit: u64) -> Result<CompressionOutcome> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let size = probe_len_blocking(&mut file)?;
    if size > limit {
        bail!(
            "{} is {}, over the {} upload limit",
            path.display(),
            format_bytes(size),
            format_bytes(limit)
        );
    }

    let mut data = Vec::with_capacity(usize::try_from(size).unwrap_or_default());
    file.read_to_end(&mut data)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(compressor.compress(&data)?)
}

//! Archive command implementation.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use colored::Colorize;
use smriti_core::{ResultArchiver, ARCHIVE_FILE_NAME};
use tracing::info;

use crate::utils::{config_for, connect, load_progress};

/// Execute the archive command.
pub async fn execute(output: Option<PathBuf>, state: &Path, quiet: bool) -> Result<()> {
    let progress = load_progress(state)?;
    if progress.matches.is_empty() {
        bail!("No matched photos to archive yet");
    }

    let pipeline = connect(config_for(&progress)?).await?;
    let archiver = ResultArchiver::new(
        pipeline.store.clone(),
        progress.bucket.clone(),
        pipeline.config.archive_concurrency,
    );
    let output = output.unwrap_or_else(|| PathBuf::from(ARCHIVE_FILE_NAME));
    let file = File::create(&output)
        .with_context(|| format!("Failed to write archive: {}", output.display()))?;
    let written = archiver
        .write_archive(&progress.sorted_matches(), file)
        .await
        .context("Failed to build archive")?;
    let size = written
        .sink
        .metadata()
        .with_context(|| format!("Failed to write archive: {}", output.display()))?
        .len();
    info!(path = %output.display(), added = written.added.len(), "Archive written");

    if !quiet {
        println!();
        println!("{}", "Archive ready".green().bold());
        println!();
        println!("   {} {}", "Saved:".dimmed(), output.display());
        println!("   {} {}", "Photos:".dimmed(), written.added.len());
        println!("   {} {} bytes", "Size:".dimmed(), size);
        for key in &written.skipped {
            eprintln!("   {} {} (could not be fetched)", "left out".yellow(), key);
        }
    }

    Ok(())
}

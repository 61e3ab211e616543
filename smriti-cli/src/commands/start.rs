//! Start command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use smriti_core::{SearchNotice, SmritiError};
use tracing::info;

use crate::utils::{connect, load_config, save_progress};

/// Execute the start command.
pub async fn execute(selfie: PathBuf, state: &Path, quiet: bool) -> Result<()> {
    let reference = std::fs::read(&selfie)
        .with_context(|| format!("Failed to read selfie: {}", selfie.display()))?;
    info!(path = %selfie.display(), bytes = reference.len(), "Read selfie");

    let pipeline = connect(load_config()?).await?;
    let progress = pipeline
        .scheduler
        .prepare(&reference)
        .await
        .context("Failed to start search")?;

    if progress.notice == Some(SearchNotice::NoFaceDetected) {
        return Err(SmritiError::NoFaceDetected).context(SearchNotice::NoFaceDetected.message());
    }

    save_progress(state, &progress)?;

    if !quiet {
        println!();
        println!("{}", "Search started".green().bold());
        println!();
        println!("   {} {}", "Event folder:".dimmed(), progress.prefix);
        println!("   {} {}", "Photos:".dimmed(), progress.total());
        println!(
            "   {} {}",
            "Batches:".dimmed(),
            progress.total().div_ceil(pipeline.config.batch_size)
        );
        println!("   {} {}", "Progress file:".dimmed(), state.display());
        if let Some(notice) = progress.notice {
            println!();
            println!("{}", notice.message().yellow());
        } else {
            println!();
            println!("Run {} to search the photos.", "smriti step --all".bold());
        }
    }

    Ok(())
}

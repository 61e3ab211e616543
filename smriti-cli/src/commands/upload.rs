//! Upload command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use smriti_core::PhotoUploader;

use crate::utils::{connect, load_config};

/// Execute the upload command.
pub async fn execute(files: Vec<PathBuf>, quiet: bool) -> Result<()> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read photo: {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        uploads.push((name, bytes, None));
    }

    let pipeline = connect(load_config()?).await?;
    let uploader = PhotoUploader::new(pipeline.store.clone(), pipeline.config.bucket.clone());
    let report = uploader
        .upload_all(&pipeline.config.prefix, uploads, None)
        .await;

    if !quiet {
        for file in &report.files {
            match (&file.key, &file.error) {
                (Some(key), _) => println!("   {} {}", "uploaded".green(), key),
                (None, Some(error)) => eprintln!("   {} {}: {}", "failed".red(), file.filename, error),
                (None, None) => {}
            }
        }
        println!();
        println!("{} uploaded, {} failed", report.uploaded, report.failed);
    }

    if report.uploaded == 0 && report.failed > 0 {
        bail!("No photos were uploaded");
    }
    Ok(())
}

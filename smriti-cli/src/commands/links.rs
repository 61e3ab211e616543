//! Links command implementation.

use std::path::Path;

use anyhow::Result;
use smriti_core::matched_links;

use crate::utils::{config_for, connect, load_progress};

/// Execute the links command: print a display URL per matched photo.
pub async fn execute(state: &Path) -> Result<()> {
    let progress = load_progress(state)?;
    let pipeline = connect(config_for(&progress)?).await?;

    let links = matched_links(
        pipeline.store.as_ref(),
        &progress,
        pipeline.config.url_expiry,
    )
    .await;
    for link in &links {
        println!("{}\t{}", link.name, link.url);
    }
    Ok(())
}

//! List command implementation.

use anyhow::{Context, Result};
use smriti_core::ObjectLister;

use crate::utils::{connect, load_config};

/// Execute the list command: print every searchable photo in the event folder.
pub async fn execute(quiet: bool) -> Result<()> {
    let pipeline = connect(load_config()?).await?;
    let lister = ObjectLister::new(pipeline.store.clone());
    let keys = lister
        .list_candidates(&pipeline.config.bucket, &pipeline.config.prefix)
        .await
        .context("Failed to list event photos")?;

    for key in &keys {
        println!("{key}");
    }
    if !quiet {
        eprintln!("{} photo(s) under {}", keys.len(), pipeline.config.prefix);
    }
    Ok(())
}

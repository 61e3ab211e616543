//! Step command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use smriti_core::{SearchState, SmritiError};
use tracing::{info, warn};

use crate::utils::{config_for, connect, load_progress, progress_bar, save_progress};

/// How many batches to run.
#[derive(Debug, Clone, Copy)]
pub enum StepLimit {
    Steps(usize),
    All,
}

/// Execute the step command.
///
/// Progress is saved after every batch, so an interrupted run loses at most
/// the batch in flight.
pub async fn execute(limit: StepLimit, state: &Path, quiet: bool) -> Result<()> {
    let mut progress = load_progress(state)?;
    if progress.last_error.is_some() {
        warn!(error = ?progress.last_error, "Resuming after a failed batch");
        progress.resume().context("Failed to resume search")?;
    }

    match progress.state {
        SearchState::Searching => {}
        SearchState::Exhausted => {
            if !quiet {
                println!(
                    "{} {} photo(s) found",
                    "Search complete:".green().bold(),
                    progress.matches.len()
                );
            }
            return Ok(());
        }
        other => return Err(SmritiError::SearchNotActive(other.to_string()).into()),
    }

    let pipeline = connect(config_for(&progress)?).await?;
    let mut steps = 0;

    while progress.state == SearchState::Searching {
        if let StepLimit::Steps(n) = limit {
            if steps >= n {
                break;
            }
        }

        let result = pipeline.scheduler.step(&mut progress).await;
        // The failed batch stays pending; keep the error on disk for status
        save_progress(state, &progress)?;
        let report = result.context("Batch failed, run `smriti step` again to retry it")?;
        steps += 1;

        if !quiet {
            println!(
                "{} {}/{} photos, {} new match(es)",
                progress_bar(progress.percent_complete(), 30),
                report.cursor,
                report.total,
                report.new_matches.len()
            );
            for skipped in &report.skipped {
                eprintln!(
                    "   {} {} ({})",
                    "skipped".yellow(),
                    skipped.key,
                    skipped.reason
                );
            }
        }
    }

    info!(steps, cursor = progress.cursor, matches = progress.matches.len(), "Steps finished");

    if !quiet {
        println!();
        if progress.is_exhausted() {
            println!(
                "{} {} photo(s) found",
                "Search complete:".green().bold(),
                progress.matches.len()
            );
        } else {
            println!(
                "{} {} photo(s) left, {} found so far",
                "Paused:".bold(),
                progress.remaining(),
                progress.matches.len()
            );
        }
    }

    Ok(())
}

//! Status command implementation. Reads the progress file only.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use smriti_core::SearchState;

use crate::utils::{format_timestamp, load_progress, progress_bar};

/// Execute the status command.
pub fn execute(state: &Path, show_matches: bool) -> Result<()> {
    let progress = load_progress(state)?;

    let state_label = match progress.state {
        SearchState::Exhausted => progress.state.to_string().green(),
        SearchState::Searching => progress.state.to_string().cyan(),
        SearchState::Idle | SearchState::Preparing => progress.state.to_string().yellow(),
    };

    println!();
    println!("   {} {}", "State:".dimmed(), state_label);
    println!("   {} {}", "Event folder:".dimmed(), progress.prefix);
    println!("   {} {}", "Collection:".dimmed(), progress.collection_id);
    println!(
        "   {} {} {}/{} ({:.1}%)",
        "Searched:".dimmed(),
        progress_bar(progress.percent_complete(), 20),
        progress.cursor,
        progress.total(),
        progress.percent_complete()
    );
    println!("   {} {}", "Matches:".dimmed(), progress.matches.len());
    println!("   {} {}", "Skipped:".dimmed(), progress.skipped);
    println!("   {} {}", "Started:".dimmed(), format_timestamp(progress.started_at));
    println!("   {} {}", "Updated:".dimmed(), format_timestamp(progress.updated_at));

    if let Some(notice) = progress.notice {
        println!();
        println!("   {}", notice.message().yellow());
    }
    if let Some(error) = &progress.last_error {
        println!();
        println!("   {} {}", "Last error:".red(), error);
        println!("   Run {} to retry the failed batch.", "smriti step".bold());
    }

    if show_matches && !progress.matches.is_empty() {
        println!();
        for key in progress.sorted_matches() {
            println!("   {key}");
        }
    }

    Ok(())
}

//! Subcommand implementations.

pub mod archive;
pub mod links;
pub mod list;
pub mod start;
pub mod status;
pub mod step;
pub mod upload;

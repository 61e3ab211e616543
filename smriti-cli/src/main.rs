//! Smriti CLI - find yourself in an event's photos.
//!
//! Each invocation is short-lived: the search state lives in a CBOR progress
//! file between runs, so a search can be stepped, interrupted and resumed.

use std::path::PathBuf;
use std::process;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use commands::step::StepLimit;
use exit_codes::ExitCode;

const AFTER_HELP: &str = "\
Configuration is read from the environment:
  S3_BUCKET_NAME, S3_WEDDING_PHOTOS_FOLDER (required)
  REKOGNITION_COLLECTION_ID, FACE_MATCH_THRESHOLD, BATCH_SIZE, MAX_WORKERS
  AWS_REGION, AWS_ENDPOINT_URL, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY

Exit codes:
  0   Success
  64  Usage or configuration error
  65  Data error (no face in selfie, unusable image, corrupt progress file)
  66  Input file not found
  69  Object store or recognition service unavailable
  74  Cannot write output file";

#[derive(Parser)]
#[command(name = "smriti")]
#[command(author, version, about = "Find every event photo you appear in from a single selfie", long_about = None)]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Progress file holding the current search
    #[arg(long, global = true, value_name = "PATH", default_value = "smriti-progress.cbor")]
    state: PathBuf,

    /// Show debug logs (-v) or trace logs (-vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print results and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// When to use colored output
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn apply(self) {
        match self {
            Self::Auto => {}
            Self::Always => colored::control::set_override(true),
            Self::Never => colored::control::set_override(false),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Register a selfie and snapshot the event's photos
    Start {
        /// Path to the selfie (JPEG or PNG)
        #[arg(value_name = "SELFIE")]
        selfie: PathBuf,
    },

    /// Search the next batch(es) of photos
    #[command(group(ArgGroup::new("limit").args(["all", "steps"])))]
    Step {
        /// Keep going until every photo is searched
        #[arg(long)]
        all: bool,

        /// Number of batches to run
        #[arg(long, value_name = "N", default_value_t = 1)]
        steps: usize,
    },

    /// Show the saved search (works offline)
    Status {
        /// Also print every matched photo
        #[arg(long)]
        matches: bool,
    },

    /// Download the matched photos as a zip
    Archive {
        /// Output file (defaults to smriti_matched_moments.zip)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List the searchable photos in the event folder
    List,

    /// Print display links for the matched photos
    Links,

    /// Upload photos to the event folder
    Upload {
        /// Photos to upload
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "smriti=debug,smriti_core=debug,warn",
        (false, _) => "smriti=trace,smriti_core=trace,info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = cli.state.as_path();
    let quiet = cli.quiet;

    match cli.command {
        Commands::Start { selfie } => commands::start::execute(selfie, state, quiet).await,
        Commands::Step { all, steps } => {
            let limit = if all {
                StepLimit::All
            } else {
                StepLimit::Steps(steps)
            };
            commands::step::execute(limit, state, quiet).await
        }
        Commands::Status { matches } => commands::status::execute(state, matches),
        Commands::Archive { output } => commands::archive::execute(output, state, quiet).await,
        Commands::List => commands::list::execute(quiet).await,
        Commands::Links => commands::links::execute(state).await,
        Commands::Upload { files } => commands::upload::execute(files, quiet).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    cli.color.apply();
    init_tracing(cli.verbose, cli.quiet);

    let exit = match run(cli).await {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {}", "Error:".red().bold(), message);
    }
    process::exit(exit.code);
}

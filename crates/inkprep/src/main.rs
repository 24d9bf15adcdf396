//! Inkprep CLI - configurable image preprocessing for OCR.
//!
//! Runs an ordered list of image steps (grayscale, threshold, deskew, ...)
//! over every image in a directory, validating each step and writing the
//! processed images plus a JSON report to `<dir>/output/`.
//!
//! # Usage
//!
//! ```bash
//! # Process a directory with the default config file
//! inkprep run ./scans
//!
//! # Use a specific pipeline and keep per-step snapshots
//! inkprep --config pipeline.toml run ./scans --save-intermediate
//!
//! # Write a starter config
//! inkprep config init
//!
//! # List available steps
//! inkprep steps
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Inkprep - configurable image preprocessing for OCR.
#[derive(Parser, Debug)]
#[command(name = "inkprep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Pipeline config file (defaults to the platform config location)
    #[arg(short, long, global = true, env = "INKPREP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the configured steps over a directory of images
    Run(cli::run::RunArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),

    /// List the registered step names
    Steps(cli::steps::StepsArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config problems go straight to stderr.
    let config = cli::load_config(cli.config.as_deref())?;
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Inkprep v{}", inkprep_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config),
        Commands::Config(args) => cli::config::execute(args, config, cli.config.as_deref()),
        Commands::Steps(args) => cli::steps::execute(args),
    }
}

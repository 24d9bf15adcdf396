//! The `inkprep run` command: process a directory of images.

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use inkprep_core::{Config, ImageStatus, PipelineRunner, RunSummary};

/// Report formats selectable on the command line.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ReportFormat {
    /// Single JSON document
    Json,
    /// One JSON object per image (newline-delimited)
    Jsonl,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Jsonl => write!(f, "jsonl"),
        }
    }
}

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Directory containing the images to process
    #[arg(required = true)]
    pub input: PathBuf,

    /// Write a PNG snapshot after every step
    #[arg(long)]
    pub save_intermediate: bool,

    /// Report format (overrides the config file)
    #[arg(long, value_enum)]
    pub report_format: Option<ReportFormat>,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Apply command-line overrides on top of the loaded config.
fn apply_overrides(mut config: Config, args: &RunArgs) -> Config {
    if args.save_intermediate {
        config.save_intermediate = true;
    }
    if let Some(format) = args.report_format {
        config.report.format = format.to_string();
    }
    config
}

/// Execute the run command.
pub fn execute(args: RunArgs, config: Config) -> anyhow::Result<()> {
    if !args.input.is_dir() {
        anyhow::bail!("Input is not a directory: {}", args.input.display());
    }

    let config = apply_overrides(config, &args);
    if config.steps.is_empty() {
        tracing::warn!("No steps configured; images will be copied unchanged");
    }

    let runner = PipelineRunner::new(config);
    let progress = if args.no_progress {
        ProgressBar::hidden()
    } else {
        create_progress_bar()
    };

    let outcome = runner.run_with_progress(&args.input, |event| {
        progress.set_length(event.total as u64);
        progress.set_position(event.index as u64);
        progress.set_message(event.file_name.to_string());
        if event.status == ImageStatus::Skipped {
            progress.println(format!("  {} {}", style("skipped").yellow(), event.file_name));
        }
    })?;
    progress.finish_and_clear();

    print_summary(&outcome.summary);
    Ok(())
}

/// Create a progress bar; its length is set once discovery has run.
fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_message("discovering...");
    pb
}

/// Print a formatted summary table to stderr.
fn print_summary(summary: &RunSummary) {
    let seconds = summary.elapsed.as_secs_f64();
    let rate = if seconds > 0.0 {
        summary.processed as f64 / seconds
    } else {
        0.0
    };

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               {}", style("Summary").bold());
    eprintln!("  ====================================");
    eprintln!("    Processed:    {:>8}", style(summary.processed).green());
    if summary.skipped > 0 {
        eprintln!("    Skipped:      {:>8}", style(summary.skipped).yellow());
    }
    eprintln!("    Steps passed: {:>8}", summary.steps_succeeded);
    if summary.steps_failed > 0 {
        eprintln!("    Steps failed: {:>8}", style(summary.steps_failed).red());
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Discovered:   {:>8}", summary.discovered);
    eprintln!("    Duration:     {:>7.1}s", seconds);
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  ====================================");
    match &summary.report_path {
        Some(path) => eprintln!("  Report: {}", path.display()),
        None => eprintln!("  {}", style("Report could not be written").red()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            input: PathBuf::from("scans"),
            save_intermediate: false,
            report_format: None,
            no_progress: true,
        }
    }

    #[test]
    fn test_overrides_leave_config_alone_by_default() {
        let config = apply_overrides(Config::default(), &args());
        assert!(!config.save_intermediate);
        assert_eq!(config.report.format, "json");
    }

    #[test]
    fn test_overrides_apply() {
        let args = RunArgs {
            save_intermediate: true,
            report_format: Some(ReportFormat::Jsonl),
            ..args()
        };
        let config = apply_overrides(Config::default(), &args);
        assert!(config.save_intermediate);
        assert_eq!(config.report.format, "jsonl");
    }

    #[test]
    fn test_execute_rejects_missing_dir() {
        let err = execute(args(), Config::default()).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}

//! dumac - Fast Disk Usage
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use dumac::config::{CliArgs, SizeFormat, UsageConfig};
use dumac::progress::{format_blocks, print_summary, ProgressReporter};
use dumac::{UsageError, UsageStats, UsageWalker};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // A root that can't be read is reported like du does
            match e.downcast_ref::<UsageError>() {
                Some(err) if matches!(err, UsageError::RootUnreadable { .. }) => {
                    eprintln!("dumac: {}", err)
                }
                _ => eprintln!("dumac: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    let config = UsageConfig::from_args(args).context("Invalid configuration")?;

    setup_logging(config.verbose)?;

    let root = config.root.clone();
    let walker = UsageWalker::new(config.clone());

    let stats = if config.show_progress {
        run_with_progress(&walker, &config)?
    } else {
        walker.run(&root)?
    };

    let size = match config.size_format {
        SizeFormat::Human => format_blocks(stats.blocks),
        SizeFormat::Blocks => stats.blocks.to_string(),
    };
    println!("{}\t{}", size, root.display());

    if config.show_stats {
        print_summary(&root, &stats);
    }

    if stats.errors > 0 {
        info!(errors = stats.errors, "Walk completed with errors");
    }

    Ok(())
}

fn run_with_progress(walker: &UsageWalker, config: &UsageConfig) -> Result<UsageStats> {
    let progress = ProgressReporter::new();
    let result = walker.run_with_progress(&config.root, |p| progress.update(&p));
    progress.finish_and_clear();
    Ok(result?)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ if verbose => EnvFilter::new("dumac=debug,warn"),
        _ => EnvFilter::new("dumac=warn"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

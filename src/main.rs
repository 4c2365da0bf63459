//! dchmod - Parallel Group and Permission Changes for Large Trees
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use dchmod::catalog::{read_cache, write_cache, Catalog};
use dchmod::chmod::run_chmod_with_levels;
use dchmod::config::{ChmodConfig, CliArgs, Source};
use dchmod::group::SystemGroups;
use dchmod::mutator::SystemOps;
use dchmod::progress::{print_header, print_level, print_summary, print_walk, ProgressReporter};
use dchmod::walker::LocalWalker;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Usage errors and -h both exit 1; only --version succeeds
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<()> {
    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = ChmodConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &source_name(&config.source),
            config.worker_count,
            config.group.as_deref(),
            config.mode_expr.as_deref(),
        );
    }

    let catalog = load_catalog(&config)?;

    let show_levels = config.show_progress && config.verbose;
    let report = run_chmod_with_levels(
        catalog,
        &config.run_options(),
        &SystemGroups,
        &SystemOps,
        |level| {
            if show_levels {
                print_level(level);
            }
        },
    )
    .context("Run failed")?;

    if config.show_progress {
        print_summary(&report);
    }

    if report.errors > 0 {
        info!(errors = report.errors, "Run completed with errors");
    }

    Ok(())
}

/// Walk the roots or read the cache, saving the walk if asked to
fn load_catalog(config: &ChmodConfig) -> Result<Catalog> {
    let progress = config.show_progress.then(ProgressReporter::new);

    match &config.source {
        Source::Cache(path) => {
            if let Some(ref p) = progress {
                p.set_status(&format!("Reading {}...", path.display()));
            }
            let catalog = read_cache(path)
                .with_context(|| format!("Failed to read cache {}", path.display()))?;
            if let Some(ref p) = progress {
                p.finish_and_clear();
            }
            Ok(catalog)
        }
        Source::Walk(roots) => {
            let walker = LocalWalker::new(config.walk_options());
            let output = match progress {
                Some(ref p) => {
                    let display = p.clone();
                    let output = walker
                        .run_with_progress(roots, move |progress| display.update(&progress))
                        .context("Walk failed")?;
                    p.finish_and_clear();
                    output
                }
                None => walker.run(roots).context("Walk failed")?,
            };

            if config.show_progress {
                print_walk(&output.stats);
            }

            if let Some(path) = &config.output {
                write_cache(path, &output.catalog, roots)
                    .with_context(|| format!("Failed to write cache {}", path.display()))?;
            }

            Ok(output.catalog)
        }
    }
}

fn source_name(source: &Source) -> String {
    match source {
        Source::Walk(roots) => roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(" "),
        Source::Cache(path) => format!("{} (cache)", path.display()),
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("dchmod=debug,warn")
    } else {
        EnvFilter::new("dchmod=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

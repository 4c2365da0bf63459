//! Configuration types for dchmod
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::chmod::RunOptions;
use crate::error::ConfigError;
use crate::filter::{compile_pattern, FilterMode, MatchOn};
use crate::mode::{self, ModeSpec};
use crate::walker::WalkOptions;
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Parallel chgrp/chmod over large directory trees
#[derive(Parser, Debug, Clone)]
#[command(
    name = "dchmod",
    version,
    about = "Parallel chgrp/chmod over large directory trees",
    long_about = "Changes group ownership and permission bits of every entry under the\n\
                  given paths.\n\n\
                  Entries are processed one depth level at a time, deepest first, by a group of\n\
                  worker threads that wait for each other between levels.\n\n\
                  MODE is octal (755, 2770) or comma-separated symbolic clauses: one or more of\n\
                  u, g, a (a = other; o also accepted), then +, - or =, then r, w, x, X\n\
                  for + and - or exactly one of u, g, a for = (copy that class's bits).",
    after_help = "EXAMPLES:\n    \
        dchmod -g research -m g+rwX,a-rwx /data/project\n    \
        dchmod -m 755 -e '\\.snapshot' /scratch/shared\n    \
        dchmod -o tree.db -m u+rw /data/big     # also save the walk\n    \
        dchmod -i tree.db -g staff -n -a '\\.h5$'  # reuse a saved walk",
    disable_help_flag = true
)]
pub struct CliArgs {
    /// Paths to walk
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Read the entry list from a cache file instead of walking
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Save the walked entry list to a cache file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Change group to NAME
    #[arg(short = 'g', long, value_name = "NAME")]
    pub group: Option<String>,

    /// Change permissions to MODE
    #[arg(short = 'm', long, value_name = "MODE")]
    pub mode: Option<String>,

    /// Skip entries matching REGEX (wins over --match)
    #[arg(short = 'e', long, value_name = "REGEX")]
    pub exclude: Option<String>,

    /// Only change entries matching REGEX
    #[arg(short = 'a', long = "match", value_name = "REGEX")]
    pub match_pattern: Option<String>,

    /// Match patterns against the base name instead of the full path
    #[arg(short = 'n', long)]
    pub name: bool,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Quiet mode - suppress progress and summary
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (per-level timing, debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print help
    #[arg(short = 'h', long, action = clap::ArgAction::Help)]
    pub help: Option<bool>,
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Where the entry list comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Walk these roots
    Walk(Vec<PathBuf>),
    /// Read a cache file written by an earlier run
    Cache(PathBuf),
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct ChmodConfig {
    /// Entry list source
    pub source: Source,

    /// Cache file to save the walk to
    pub output: Option<PathBuf>,

    /// Group name to apply
    pub group: Option<String>,

    /// Mode expression as typed, for display
    pub mode_expr: Option<String>,

    /// Compiled mode expression
    pub mode: Option<ModeSpec>,

    /// Regex filter, after exclude/match precedence
    pub filter: FilterMode,

    /// Test patterns against the base name
    pub match_on: MatchOn,

    /// Number of worker threads
    pub worker_count: usize,

    /// Show progress and summary
    pub show_progress: bool,

    /// Verbose logging and per-level reports
    pub verbose: bool,

    /// Walk must give directories u+rx to descend into them
    pub requires_owner_rx: bool,

    /// Walk must lstat entries for mode and group
    pub collect_stat: bool,
}

impl ChmodConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        let source = match (args.input, args.paths.is_empty()) {
            (Some(_), false) => return Err(ConfigError::ConflictingInput),
            (Some(input), true) => Source::Cache(input),
            (None, false) => Source::Walk(args.paths),
            (None, true) => return Err(ConfigError::MissingInput),
        };

        // Validate output path
        if let Some(output) = &args.output {
            if matches!(source, Source::Cache(_)) {
                return Err(ConfigError::OutputWithoutWalk);
            }
            if let Some(parent) = output.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(ConfigError::InvalidOutputPath {
                        path: output.clone(),
                        reason: format!("Parent directory '{}' does not exist", parent.display()),
                    });
                }
            }
        }

        let mode = args
            .mode
            .as_deref()
            .map(|expr| {
                mode::compile(expr).map_err(|source| ConfigError::InvalidMode {
                    expr: expr.to_string(),
                    source,
                })
            })
            .transpose()?;

        if let (Some(exclude), Some(matching)) = (&args.exclude, &args.match_pattern) {
            warn!(
                "Both --exclude '{}' and --match '{}' given; ignoring --match",
                exclude, matching
            );
        }
        let filter = FilterMode::from_options(args.exclude, args.match_pattern);
        if let Some(pattern) = filter.pattern() {
            compile_pattern(pattern)?;
        }

        let requires_owner_rx = mode::requires_owner_rx(mode.as_ref());
        // A saved walk may be replayed with any mode or group, so it always needs
        // real ownership and permission bits
        let collect_stat = args.output.is_some()
            || !(mode.as_ref().is_some_and(ModeSpec::is_octal) && args.group.is_none());

        Ok(Self {
            source,
            output: args.output,
            group: args.group,
            mode_expr: args.mode,
            mode,
            filter,
            match_on: if args.name {
                MatchOn::BaseName
            } else {
                MatchOn::FullPath
            },
            worker_count: args.workers,
            show_progress: !args.quiet,
            verbose: args.verbose,
            requires_owner_rx,
            collect_stat,
        })
    }

    /// Options for the walker
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            collect_stat: self.collect_stat,
            requires_owner_rx: self.requires_owner_rx,
            workers: self.worker_count,
        }
    }

    /// Options for the mutation run
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            workers: self.worker_count,
            spec: self.mode.clone(),
            group: self.group.clone(),
            filter: self.filter.clone(),
            match_on: self.match_on,
            report_levels: self.verbose,
        }
    }
}

//! Progress reporting
//!
//! A spinner while the entry list is being built, then console-styled
//! header, per-level lines and a final summary.

use crate::mutator::{LevelStats, MutationReport};
use crate::walker::{WalkProgress, WalkStats};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while walking or reading a cache
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the display from walker counters
    pub fn update(&self, progress: &WalkProgress) {
        let mut msg = format!(
            "Dirs: {} | Files: {} | Rate: {:.0}/s",
            format_number(progress.dirs),
            format_number(progress.files),
            progress.entries_per_second(),
        );
        if progress.errors > 0 {
            msg.push_str(&format!(" | Errors: {}", format_number(progress.errors)));
        }

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the run
pub fn print_header(source: &str, workers: usize, group: Option<&str>, mode: Option<&str>) {
    println!();
    println!(
        "{} {}",
        style("dchmod").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), source);
    println!("  {} {}", style("Workers:").bold(), workers);
    if let Some(group) = group {
        println!("  {} {}", style("Group:").bold(), group);
    }
    if let Some(mode) = mode {
        println!("  {} {}", style("Mode:").bold(), mode);
    }
    println!();
}

/// Print one depth level's figures as soon as it completes
pub fn print_level(level: &LevelStats) {
    println!(
        "  {} {:>3}  min {:>10}  max {:>10}  sum {:>12}  {:>10.0}/s  {:.3}s",
        style("level").dim(),
        level.depth,
        format_number(level.min),
        format_number(level.max),
        format_number(level.sum),
        level.rate,
        level.secs,
    );
}

/// Print walk figures, once the entry list is built
pub fn print_walk(stats: &WalkStats) {
    println!(
        "  {} {} dirs, {} files in {:.1}s",
        style("Walked:").bold(),
        format_number(stats.dirs),
        format_number(stats.files),
        stats.duration.as_secs_f64(),
    );
    if stats.errors > 0 {
        println!(
            "  {} {}",
            style("Walk errors:").yellow().bold(),
            format_number(stats.errors)
        );
    }
}

/// Print a summary of the run
pub fn print_summary(report: &MutationReport) {
    println!();
    println!("{}", style("Run Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Entries:").bold(), format_number(report.count));
    if report.chowned > 0 || report.skipped > 0 {
        println!(
            "  {} {} ({} not permitted)",
            style("Group changed:").bold(),
            format_number(report.chowned),
            format_number(report.skipped)
        );
    }
    if report.chmodded > 0 {
        println!(
            "  {} {}",
            style("Mode changed:").bold(),
            format_number(report.chmodded)
        );
    }
    println!(
        "  {} {:.3}s ({:.0} entries/sec)",
        style("Duration:").bold(),
        report.elapsed.as_secs_f64(),
        report.rate
    );
    if report.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(report.errors)
        );
    }
    println!();
}

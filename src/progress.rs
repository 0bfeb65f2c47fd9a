//! Progress reporting and output formatting
//!
//! Everything here writes to stderr so that stdout carries only the
//! `<size>\t<path>` result line.

use crate::attr::BLOCK_SIZE;
use crate::walker::{UsageStats, WalkProgress};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Spinner showing walk status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let spinner = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(spinner);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &WalkProgress) {
        let msg = format!(
            "Dirs: {} | Files: {} | Size: {} | Rate: {:.0}/s | Workers: {}/{}",
            format_number(progress.dirs),
            format_number(progress.files),
            format_size(progress.bytes(), BINARY),
            progress.files_per_second(),
            progress.active_workers,
            progress.total_workers,
        );

        self.bar.set_message(msg);
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

/// Format a block count the way `du -h` does
///
/// Whole values print without a fraction ("4K"), others with one decimal
/// ("1.5M"). Bytes below 1K are printed exactly.
pub fn format_blocks(blocks: u64) -> String {
    const UNITS: [&str; 4] = ["K", "M", "G", "T"];

    let bytes = blocks.saturating_mul(BLOCK_SIZE);
    if bytes < 1024 {
        return format!("{}B", bytes);
    }

    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value.fract() == 0.0 {
        format!("{}{}", value as u64, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

/// Print a summary of the walk results
pub fn print_summary(root: &Path, stats: &UsageStats) {
    let duration_secs = stats.duration.as_secs_f64();

    eprintln!();
    eprintln!("{}", style("Walk Complete").green().bold());
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Root:").bold(), root.display());
    eprintln!("  {} {}", style("Directories:").bold(), format_number(stats.dirs));
    eprintln!("  {} {}", style("Files:").bold(), format_number(stats.files));
    eprintln!(
        "  {} {}",
        style("Unique inodes:").bold(),
        format_number(stats.inodes)
    );
    eprintln!(
        "  {} {} ({} blocks)",
        style("Disk usage:").bold(),
        format_size(stats.bytes(), BINARY),
        format_number(stats.blocks)
    );
    eprintln!(
        "  {} {:.2}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        stats.files_per_second()
    );
    if stats.errors > 0 {
        eprintln!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(stats.errors)
        );
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_format_blocks_small() {
        assert_eq!(format_blocks(0), "0B");
        assert_eq!(format_blocks(1), "512B");
    }

    #[test]
    fn test_format_blocks_units() {
        assert_eq!(format_blocks(2), "1K");
        assert_eq!(format_blocks(3), "1.5K");
        assert_eq!(format_blocks(8), "4K");
        assert_eq!(format_blocks(2048), "1M");
        assert_eq!(format_blocks(3072), "1.5M");
        assert_eq!(format_blocks(2 * 1024 * 1024), "1G");
        assert_eq!(format_blocks(2 * 1024 * 1024 * 1024), "1T");
        // Terabytes are the largest unit
        assert_eq!(format_blocks(2 * 1024 * 1024 * 1024 * 1024), "1024T");
    }

    #[test]
    fn test_format_blocks_rounds_to_one_decimal() {
        // 1000 KiB is still below 1M
        assert_eq!(format_blocks(2000), "1000K");
        assert_eq!(format_blocks(5), "2.5K");
        assert_eq!(format_blocks(2049), "1.0M");
    }
}

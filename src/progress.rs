//! Progress bar and logging utilities for the album loop.
//!
//! In log-only mode the bar is hidden and progress goes to the log at
//! fixed intervals instead, which keeps piped/tailed output readable.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Global flag for log-only mode (set from args in main)
pub static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

pub fn is_log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Format duration in human-readable format
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let mins = secs / 60.0;
        format!("{:.1}m", mins)
    }
}

/// Create a progress bar with consistent styling.
/// In log-only mode, the progress bar is hidden.
pub fn create_progress_bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if is_log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        match ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} (ETA: {eta})")
        {
            Ok(style) => pb.set_style(style.progress_chars("=> ")),
            Err(_) => pb.set_draw_target(ProgressDrawTarget::hidden()),
        }
    }
    pb.set_message(msg.to_string());
    pb
}

/// Whether `current` is a reporting point for `interval` (always true at the end).
pub fn should_log_progress(current: u64, total: u64, interval: u64) -> bool {
    interval > 0 && (current % interval == 0 || current == total)
}

/// Log progress periodically for tail-friendly output.
/// Only logs when in log-only mode and at specified intervals.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if is_log_only() && should_log_progress(current, total, interval) {
        let pct = if total == 0 { 100.0 } else { 100.0 * current as f64 / total as f64 };
        info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}

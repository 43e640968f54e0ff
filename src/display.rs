//! Display formatting module.
//!
//! Renders usage against the quota for the terminal, with colors and a
//! progress bar. Colors are dropped when `NO_COLOR` is set.

use chrono::NaiveDate;

use crate::config::DisplayConfig;
use crate::counters::InterfaceSelector;

/// ANSI color codes for terminal output.
pub struct Colors;

impl Colors {
    /// Check if colors are enabled (respects NO_COLOR env var)
    pub fn enabled() -> bool {
        std::env::var("NO_COLOR").is_err()
    }

    fn get(code: &'static str) -> &'static str {
        if Self::enabled() {
            code
        } else {
            ""
        }
    }

    pub fn reset() -> &'static str {
        Self::get("\x1b[0m")
    }
    pub fn red() -> &'static str {
        Self::get("\x1b[31m")
    }
    pub fn green() -> &'static str {
        Self::get("\x1b[32m")
    }
    pub fn yellow() -> &'static str {
        Self::get("\x1b[33m")
    }
    pub fn cyan() -> &'static str {
        Self::get("\x1b[36m")
    }
    pub fn gray() -> &'static str {
        Self::get("\x1b[90m")
    }
}

/// Usage against quota at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub used_bytes: u64,
    pub limit_bytes: u64,
    pub interface: InterfaceSelector,
    pub interface_live: bool,
    pub next_reset: NaiveDate,
}

impl UsageReport {
    /// Percentage of the quota used (may exceed 100).
    pub fn percent_used(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 / self.limit_bytes as f64 * 100.0
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.limit_bytes.saturating_sub(self.used_bytes)
    }

    pub fn over_quota(&self) -> bool {
        self.used_bytes > self.limit_bytes
    }
}

/// Human-readable binary size: `512 B`, `1.50 KB`, `12.34 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

fn usage_color(percent: f64, config: &DisplayConfig) -> &'static str {
    if percent >= config.critical_threshold {
        Colors::red()
    } else if percent >= config.warning_threshold {
        Colors::yellow()
    } else {
        Colors::green()
    }
}

/// `[█████░░░░░]`, filled in proportion to `percent` (capped at full).
pub fn progress_bar(percent: f64, width: usize) -> String {
    let ratio = (percent / 100.0).clamp(0.0, 1.0);
    let filled = ((ratio * width as f64).round() as usize).min(width);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(width - filled))
}

/// One-line summary:
/// `wlan0 12.34 GB / 50.00 GB [████░░░░] 24.7% · 37.66 GB left · resets 2025-04-01`
pub fn format_report(report: &UsageReport, config: &DisplayConfig) -> String {
    let percent = report.percent_used();
    let color = usage_color(percent, config);

    let mut out = String::new();
    out.push_str(&format!("{}{}{} ", Colors::cyan(), report.interface, Colors::reset()));
    if !report.interface_live {
        out.push_str(&format!("{}(offline){} ", Colors::gray(), Colors::reset()));
    }

    out.push_str(&format!(
        "{}{}{} / {} {}{}{} {:.1}%",
        color,
        format_bytes(report.used_bytes),
        Colors::reset(),
        format_bytes(report.limit_bytes),
        color,
        progress_bar(percent, config.progress_bar_width),
        Colors::reset(),
        percent
    ));

    if report.over_quota() {
        out.push_str(&format!(
            " · {}{} over{}",
            Colors::red(),
            format_bytes(report.used_bytes - report.limit_bytes),
            Colors::reset()
        ));
    } else {
        out.push_str(&format!(" · {} left", format_bytes(report.remaining_bytes())));
    }

    out.push_str(&format!(
        " · {}resets {}{}",
        Colors::gray(),
        report.next_reset.format("%Y-%m-%d"),
        Colors::reset()
    ));
    out
}

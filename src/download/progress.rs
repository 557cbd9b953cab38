//! Progress line parsing, ETA smoothing and display formatting.

use crate::models::DownloadProgressSample;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Marker used in the fetcher's `--progress-template`
pub const PROGRESS_MARKER: &str = "TF_PROGRESS|";

/// Progress as presented to the consumer side of the channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub fraction: f64,
    pub speed: Option<String>,
    pub eta: Option<Duration>,
}

impl ProgressUpdate {
    pub fn percent(&self) -> f64 {
        self.fraction * 100.0
    }

    pub fn status_text(&self) -> String {
        format!("Downloading: {:.1}%", self.percent())
    }

    pub fn eta_text(&self) -> String {
        self.eta.map(format_time_remaining).unwrap_or_default()
    }
}

/// Remaining time assuming the average rate so far holds.
pub fn estimate_remaining(elapsed: Duration, fraction: f64) -> Option<Duration> {
    if !fraction.is_finite() || fraction <= 0.0 {
        return None;
    }
    if fraction >= 1.0 {
        return Some(Duration::ZERO);
    }
    let total = elapsed.as_secs_f64() / fraction;
    Duration::try_from_secs_f64(total * (1.0 - fraction)).ok()
}

/// Turns raw samples into display updates. The ETA is only recomputed when
/// the fraction strictly increases, so stalls and restarts reported by the
/// fetcher don't make it jump around.
#[derive(Debug)]
pub struct EtaTracker {
    started: Instant,
    last_fraction: f64,
    eta: Option<Duration>,
}

impl EtaTracker {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            last_fraction: 0.0,
            eta: None,
        }
    }

    pub fn observe(&mut self, sample: &DownloadProgressSample) -> ProgressUpdate {
        if sample.fraction > self.last_fraction {
            let elapsed = sample.at.saturating_duration_since(self.started);
            self.eta = estimate_remaining(elapsed, sample.fraction);
            self.last_fraction = sample.fraction;
        }

        ProgressUpdate {
            fraction: self.last_fraction,
            speed: sample.speed.as_deref().and_then(normalize_speed),
            eta: self.eta,
        }
    }
}

/// Parses one line of fetcher output. Understands the `TF_PROGRESS|pct|speed`
/// template and the default `[download]  42.0% of ... at 1.2MiB/s` line.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgressSample> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix(PROGRESS_MARKER) {
        let mut fields = rest.split('|');
        let fraction = parse_percent(fields.next()?)?;
        let speed = fields
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        return Some(DownloadProgressSample::new(fraction, speed));
    }

    let rest = line.strip_prefix("[download]")?;
    let mut tokens = rest.split_whitespace();
    let fraction = parse_percent(tokens.next()?)?;
    let speed = rest
        .split_whitespace()
        .skip_while(|token| *token != "at")
        .nth(1)
        .map(String::from);
    Some(DownloadProgressSample::new(fraction, speed))
}

fn parse_percent(text: &str) -> Option<f64> {
    let value: f64 = text.trim().strip_suffix('%')?.trim().parse().ok()?;
    value.is_finite().then(|| (value / 100.0).clamp(0.0, 1.0))
}

/// Normalizes fetcher speed text (`1.23MiB/s`, `512KiB/s`) to `1.23 MB/s`.
/// Unknown or unparseable speeds yield `None`.
pub fn normalize_speed(text: &str) -> Option<String> {
    let text = text.trim();
    let per_second = text.strip_suffix("/s")?.trim();

    let split_at = per_second
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(per_second.len());
    let (number, unit) = per_second.split_at(split_at);
    let value: f64 = number.parse().ok()?;

    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "b" | "" => 1.0,
        "kib" | "kb" | "k" => 1024.0,
        "mib" | "mb" | "m" => 1024.0 * 1024.0,
        "gib" | "gb" | "g" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };

    Some(format!("{}/s", format_file_size(value * multiplier)))
}

pub fn format_file_size(bytes: f64) -> String {
    const SIZES: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes.max(0.0);
    let mut order = 0;
    while value >= 1024.0 && order < SIZES.len() - 1 {
        order += 1;
        value /= 1024.0;
    }

    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, SIZES[order])
}

pub fn format_time_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

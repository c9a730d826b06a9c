//! Dashboard computations over a service response.
//!
//! Builds the views the terminal UI draws: risk score, severity breakdown,
//! per-source violation counts and the violations table. The error view for
//! failed requests lives here too.

use crate::eta;
use crate::summary::{Severity, SummaryResponse, Violation};
use colored::Colorize;
use std::fmt::Write;

/// Per-violation hazard weights, `-ln(1 - p)` for p = 10%, 5% and 1%
const HIGH_WEIGHT: f64 = 0.1053605;
const MEDIUM_WEIGHT: f64 = 0.051293;
const LOW_WEIGHT: f64 = 0.0100503;

/// Shown when a URL has no usable host
const FALLBACK_SITE_NAME: &str = "this service";

/// Risk score in percent, rounded to two decimals.
///
/// Saturates towards 100 as violations accumulate and is exactly 0 with none.
pub fn risk_score(high: u64, medium: u64, low: u64) -> f64 {
    let weighted = HIGH_WEIGHT * high as f64 + MEDIUM_WEIGHT * medium as f64 + LOW_WEIGHT * low as f64;
    let score = 100.0 * (1.0 - (-weighted).exp());
    (score * 100.0).round() / 100.0
}

/// Host of `url` without a leading `www.`
pub fn site_name(url: &str) -> String {
    let parsed = url::Url::parse(url).or_else(|_| url::Url::parse(&format!("https://{url}")));
    parsed
        .ok()
        .and_then(|u| u.host_str().map(|host| host.trim_start_matches("www.").to_string()))
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| FALLBACK_SITE_NAME.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

impl SeverityCounts {
    pub fn as_bars(&self) -> [(&'static str, u64); 3] {
        [("High", self.high), ("Medium", self.medium), ("Low", self.low)]
    }
}

/// Everything the dashboard shows for one analysis
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub site_name: String,
    pub summary: String,
    pub risk_score: f64,
    pub total_violations: u64,
    pub severity: SeverityCounts,
    /// Violations per source, in order of first appearance
    pub sources: Vec<(String, u64)>,
    pub violations: Vec<Violation>,
}

impl DashboardView {
    pub fn new(response: &SummaryResponse, page_url: &str) -> Self {
        let aggregations = &response.aggregations;
        let severity = SeverityCounts {
            high: aggregations.high_severity,
            medium: aggregations.medium_severity,
            low: aggregations.low_severity,
        };

        Self {
            site_name: site_name(page_url),
            summary: response.summary.clone(),
            risk_score: risk_score(severity.high, severity.medium, severity.low),
            total_violations: aggregations.total_violations,
            severity,
            sources: count_sources(&response.violations),
            violations: response.violations.clone(),
        }
    }
}

fn count_sources(violations: &[Violation]) -> Vec<(String, u64)> {
    let mut counts: Vec<(String, u64)> = Vec::new();
    for violation in violations {
        match counts.iter_mut().find(|(source, _)| *source == violation.source) {
            Some((_, count)) => *count += 1,
            None => counts.push((violation.source.clone(), 1)),
        }
    }
    counts
}

/// Presentation for a failed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorView {
    pub explanation: String,
    pub reasons: Vec<String>,
    pub timed_out: bool,
}

impl ErrorView {
    /// `elapsed_secs` is how long the request ran before failing, when known
    pub fn new(document_length: Option<usize>, elapsed_secs: Option<u64>) -> Self {
        let timed_out = elapsed_secs.is_some_and(eta::is_likely_timeout);
        if timed_out {
            let length = document_length
                .map(|len| len.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Self {
                explanation: format!(
                    "Your request has timed out by reaching the maximum duration of {} seconds. To prevent this, you could:",
                    eta::TIMEOUT_SECS
                ),
                reasons: vec![
                    format!(
                        "Attempt summarisation on a document with lower character count (this document was {length} characters)"
                    ),
                    "Ensure the document you are summarising is in English.".to_string(),
                    "Ensure the document you are summarising is either the terms and conditions or privacy policy for the service".to_string(),
                ],
                timed_out,
            };
        }

        Self {
            explanation: "Something went wrong while summarising this page. This may be because:"
                .to_string(),
            reasons: vec![
                "The summarisation service is unreachable or returned an error.".to_string(),
                "The page is not a terms and conditions or privacy policy document.".to_string(),
                "The document is not in English.".to_string(),
            ],
            timed_out,
        }
    }
}

fn colour_severity(severity: Severity) -> colored::ColoredString {
    let label = severity.to_string();
    match severity {
        Severity::High => label.red().bold(),
        Severity::Medium => label.yellow().bold(),
        Severity::Low => label.green().bold(),
    }
}

/// Plain-text dashboard, used when the terminal cannot be drawn to
pub fn render_plain(view: &DashboardView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== {} ===\n", view.site_name.bold());
    let _ = writeln!(out, "Risk score: {} %", view.risk_score);
    let _ = writeln!(
        out,
        "Violations: {} (high {}, medium {}, low {})\n",
        view.total_violations, view.severity.high, view.severity.medium, view.severity.low
    );
    let _ = writeln!(out, "Summary:\n  {}\n", view.summary);

    if !view.sources.is_empty() {
        let _ = writeln!(out, "By source:");
        for (source, count) in &view.sources {
            let _ = writeln!(out, "  {source}: {count}");
        }
        let _ = writeln!(out);
    }

    for violation in &view.violations {
        let _ = writeln!(
            out,
            "[{}] {}\n    rule: {}\n    source: {}",
            colour_severity(violation.severity),
            violation.violating_rule,
            violation.actual_rule,
            violation.source
        );
    }
    out
}

pub fn render_error_plain(view: &ErrorView) -> String {
    let mut out = format!("{}\n\n{}\n", "Summarisation failed".red().bold(), view.explanation);
    for reason in &view.reasons {
        let _ = writeln!(out, "  • {reason}");
    }
    out
}

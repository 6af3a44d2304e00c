//! Derived figures shared by the human-readable reports: failure
//! classification and response-time statistics.

use crate::runner::state::{Outcome, RunSummary};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const FAILURE_CATEGORIES: [&str; 7] = [
    "Bad Request (400)",
    "Unauthorized (401)",
    "Not Found (404)",
    "Server Error (500)",
    "Timeout",
    "False Positives (200)",
    "Other Errors",
];

const TIMEOUT: &str = FAILURE_CATEGORIES[4];
const FALSE_POSITIVE: &str = FAILURE_CATEGORIES[5];
const OTHER: &str = FAILURE_CATEGORIES[6];

fn status_category(status: u16) -> Option<&'static str> {
    match status {
        400 => Some(FAILURE_CATEGORIES[0]),
        401 => Some(FAILURE_CATEGORIES[1]),
        404 => Some(FAILURE_CATEGORIES[2]),
        500..=599 => Some(FAILURE_CATEGORIES[3]),
        200..=299 => Some(FALSE_POSITIVE),
        _ => None,
    }
}

/// Category of a failed or errored outcome. The last HTTP status seen wins,
/// so a failure on a 2xx answer is a false positive; otherwise the message
/// text decides.
pub fn classify(outcome: &Outcome) -> &'static str {
    if let Some(last) = outcome.timings.last() {
        match last.status {
            Some(status) => {
                if let Some(category) = status_category(status) {
                    return category;
                }
            }
            None if last
                .error
                .as_deref()
                .map_or(false, |e| e.contains("timed out") || e.contains("timeout")) =>
            {
                return TIMEOUT
            }
            None => {}
        }
    }
    classify_message(outcome.status.message().unwrap_or(""))
}

struct MessagePatterns {
    got: Regex,
    code: Regex,
}

fn message_patterns() -> Option<&'static MessagePatterns> {
    static PATTERNS: OnceLock<Option<MessagePatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(MessagePatterns {
                got: Regex::new(r"\bgot (\d{3})\b").ok()?,
                code: Regex::new(r"\b(400|401|404|5\d{2})\b").ok()?,
            })
        })
        .as_ref()
}

/// Status codes count only as whole words: "1400ms" is not a 400.
pub fn classify_message(message: &str) -> &'static str {
    if let Some(patterns) = message_patterns() {
        let code = patterns
            .got
            .captures(message)
            .or_else(|| patterns.code.captures(message))
            .and_then(|c| c[1].parse::<u16>().ok());
        if let Some(category) = code.and_then(status_category) {
            return category;
        }
    }
    if message.contains("Timeout") || message.contains("timed out") {
        TIMEOUT
    } else {
        OTHER
    }
}

/// Count per category, every category listed even when zero
pub fn failure_breakdown(summary: &RunSummary) -> Vec<(&'static str, u32)> {
    let mut counts: Vec<(&'static str, u32)> =
        FAILURE_CATEGORIES.iter().map(|c| (*c, 0)).collect();
    for outcome in summary.outcomes.iter().filter(|o| o.status.is_problem()) {
        let category = classify(outcome);
        if let Some(entry) = counts.iter_mut().find(|(c, _)| *c == category) {
            entry.1 += 1;
        }
    }
    counts
}

/// Failed or errored units whose last answer was a 2xx
pub fn false_positives(summary: &RunSummary) -> u32 {
    summary
        .outcomes
        .iter()
        .filter(|o| o.status.is_problem() && classify(o) == FALSE_POSITIVE)
        .count() as u32
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseStats {
    pub count: usize,
    pub average_ms: f64,
    pub median_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub p90_ms: u64,
    pub p95_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointStats {
    pub endpoint: String,
    pub count: usize,
    pub average_ms: f64,
    pub max_ms: u64,
}

/// Statistics over every completed HTTP attempt; None when nothing was sent
pub fn response_stats(summary: &RunSummary) -> Option<ResponseStats> {
    let mut durations: Vec<u64> = summary
        .timings()
        .filter(|t| t.status.is_some())
        .map(|t| t.duration_ms)
        .collect();
    if durations.is_empty() {
        return None;
    }
    durations.sort_unstable();

    let count = durations.len();
    let sum: u64 = durations.iter().sum();
    let median_ms = if count % 2 == 0 {
        (durations[count / 2 - 1] + durations[count / 2]) as f64 / 2.0
    } else {
        durations[count / 2] as f64
    };

    Some(ResponseStats {
        count,
        average_ms: sum as f64 / count as f64,
        median_ms,
        min_ms: durations[0],
        max_ms: durations[count - 1],
        p90_ms: percentile(&durations, 90),
        p95_ms: percentile(&durations, 95),
    })
}

/// Nearest-rank percentile over sorted values
fn percentile(sorted: &[u64], p: usize) -> u64 {
    let rank = (p * sorted.len() + 99) / 100;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub fn endpoint_stats(summary: &RunSummary) -> Vec<EndpointStats> {
    let mut by_endpoint: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for timing in summary.timings().filter(|t| t.status.is_some()) {
        let key = format!("{} /{}", timing.method, timing.endpoint);
        by_endpoint.entry(key).or_default().push(timing.duration_ms);
    }

    by_endpoint
        .into_iter()
        .map(|(endpoint, durations)| EndpointStats {
            count: durations.len(),
            average_ms: durations.iter().sum::<u64>() as f64 / durations.len() as f64,
            max_ms: durations.iter().copied().max().unwrap_or(0),
            endpoint,
        })
        .collect()
}

/// Completed attempts per endpoint, in the order they were sent
pub fn response_series(summary: &RunSummary) -> Vec<(String, Vec<u64>)> {
    let mut by_endpoint: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for timing in summary.timings().filter(|t| t.status.is_some()) {
        let key = format!("{} /{}", timing.method, timing.endpoint);
        by_endpoint.entry(key).or_default().push(timing.duration_ms);
    }
    by_endpoint.into_iter().collect()
}

pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let minutes = ms / 60000;
        let seconds = (ms % 60000) as f64 / 1000.0;
        format!("{}m {:.0}s", minutes, seconds)
    }
}

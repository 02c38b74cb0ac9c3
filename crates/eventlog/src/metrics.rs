//! Aggregate metrics over decoded events.

use crate::{LogEvent, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Count of events per normalized status. Statuses with no events are absent.
pub type StatusCounts = BTreeMap<Status, usize>;

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Latency {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Totals, success rate, and latency over a set of events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Percentage of successes, rounded to two decimals.
    pub success_rate: f64,
    pub latency_ms: Latency,
}

impl SummaryMetrics {
    /// Summarizes `events` using each event's normalized outcome.
    ///
    /// Percentiles cover every event, failures included.
    pub fn from_events<'a, E, I>(events: I) -> Self
    where
        E: LogEvent + 'a,
        I: IntoIterator<Item = &'a E>,
    {
        let mut total = 0;
        let mut failure_count = 0;
        let mut durations = Vec::new();
        for event in events {
            total += 1;
            if event.is_failure() {
                failure_count += 1;
            }
            durations.push(event.duration_ms());
        }
        durations.sort_unstable();

        let success_count = total - failure_count;
        let success_rate = if total == 0 {
            0.0
        } else {
            round2(success_count as f64 / total as f64 * 100.0)
        };

        Self {
            total,
            success_count,
            failure_count,
            success_rate,
            latency_ms: Latency {
                p50: percentile(&durations, 50.0),
                p95: percentile(&durations, 95.0),
                p99: percentile(&durations, 99.0),
            },
        }
    }
}

/// Tallies events by normalized outcome.
pub fn status_counts<'a, E, I>(events: I) -> StatusCounts
where
    E: LogEvent + 'a,
    I: IntoIterator<Item = &'a E>,
{
    let mut counts = StatusCounts::new();
    for event in events {
        *counts.entry(event.outcome()).or_insert(0) += 1;
    }
    counts
}

/// Percentile of ascending `sorted` values by linear interpolation between
/// closest ranks.
///
/// Empty input yields `0.0`; a single value is returned as is.
pub fn percentile(sorted: &[u64], pct: f64) -> f64 {
    match sorted {
        [] => 0.0,
        [only] => *only as f64,
        _ => {
            let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
            let lower = rank.floor();
            let upper = rank.ceil();
            if lower == upper {
                return sorted[lower as usize] as f64;
            }
            let weight = rank - lower;
            let interpolated =
                sorted[lower as usize] as f64 * (1.0 - weight) + sorted[upper as usize] as f64 * weight;
            round2(interpolated)
        }
    }
}

/// Arithmetic mean rounded to two decimals; `0.0` for no values.
pub fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    round2(sum / values.len() as f64)
}

/// Rounds to two decimal places from the exact decimal expansion of `value`.
pub fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuildEvent, ParseEvent, Timestamp};

    fn parse(status: Status, has_errors: bool, duration_ms: u64) -> ParseEvent {
        ParseEvent {
            timestamp: Timestamp::from("2026-01-01T00:00:00"),
            grammar: "a".to_string(),
            status,
            duration_ms,
            grammar_version: "unknown".to_string(),
            source_file: "input.json".into(),
            node_count: 1,
            has_errors,
            root_node_type: "document".to_string(),
            error_code: None,
            stderr_excerpt: None,
            diagnostics: vec![],
        }
    }

    #[test]
    fn test_percentile_interpolates() {
        assert_eq!(percentile(&[10, 20, 30, 40], 50.0), 25.0);
        assert_eq!(percentile(&[10, 20, 30, 40], 95.0), 38.5);
        assert_eq!(percentile(&[10, 20, 30, 40], 99.0), 39.7);
    }

    #[test]
    fn test_percentile_exact_rank() {
        assert_eq!(percentile(&[1, 2, 3], 50.0), 2.0);
        assert_eq!(percentile(&[1, 2, 3], 100.0), 3.0);
        assert_eq!(percentile(&[1, 2, 3], 0.0), 1.0);
    }

    #[test]
    fn test_percentile_degenerate_inputs() {
        assert_eq!(percentile(&[], 50.0), 0.0);
        assert_eq!(percentile(&[7], 99.0), 7.0);
    }

    #[test]
    fn test_percentile_rounds_to_two_decimals() {
        // rank = 0.99 * 2 = 1.98 -> 10 * 0.02 + 20 * 0.98, with float noise
        assert_eq!(percentile(&[0, 10, 20], 99.0), 19.8);
        assert_eq!(percentile(&[0, 1, 2, 3, 4, 5, 6], 95.0), 5.7);
    }

    #[test]
    fn test_empty_summary() {
        let events: Vec<BuildEvent> = Vec::new();
        let metrics = SummaryMetrics::from_events(&events);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.success_count, 0);
        assert_eq!(metrics.failure_count, 0);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.latency_ms, Latency::default());
    }

    #[test]
    fn test_parse_summary_counts_error_trees_as_failures() {
        let events = vec![
            parse(Status::Success, false, 10),
            parse(Status::Success, true, 30),
            parse(Status::Failure, false, 20),
        ];
        let metrics = SummaryMetrics::from_events(&events);
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 2);
        assert_eq!(metrics.success_rate, 33.33);
        assert_eq!(metrics.latency_ms.p50, 20.0);

        let counts = status_counts(&events);
        assert_eq!(counts.get(&Status::Success), Some(&1));
        assert_eq!(counts.get(&Status::Failure), Some(&2));
    }

    #[test]
    fn test_status_counts_omit_absent_statuses() {
        let events = vec![parse(Status::Success, false, 1)];
        let counts = status_counts(&events);
        assert_eq!(counts.len(), 1);
        assert!(!counts.contains_key(&Status::Failure));
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[5, 15, 25]), 15.0);
        assert_eq!(mean(&[1, 2]), 1.5);
        assert_eq!(mean(&[1, 1, 2]), 1.33);
    }

    #[test]
    fn test_metrics_serialize_with_latency_keys() {
        let metrics = SummaryMetrics::from_events(&[parse(Status::Success, false, 4)]);
        let value = serde_json::to_value(&metrics).unwrap();
        assert_eq!(value["latency_ms"]["p50"], 4.0);
        assert_eq!(value["success_rate"], 100.0);
    }
}

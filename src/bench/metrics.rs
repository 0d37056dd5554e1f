//! Aggregate metrics computation
//!
//! Pure functions over a session's recorded results. Every statistic has a
//! well-defined zero value on empty input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Session, TestCaseStatus};

/// Latency distribution over completed results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Aggregated outcome of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateMetrics {
    pub total_test_cases: u32,
    pub completed_test_cases: u32,
    pub failed_test_cases: u32,
    pub skipped_test_cases: u32,
    /// Completed results with every validation passed, over the total
    pub success_rate: f64,
    pub latency: LatencyStats,
    /// Pass rate per validation kind; a kind never exercised scores 0
    pub quality: BTreeMap<String, f64>,
}

/// Compute aggregate metrics for a session
pub fn compute_metrics(session: &Session) -> AggregateMetrics {
    let total = session.progress.total_test_cases;

    let successes = session
        .results
        .iter()
        .filter(|r| r.status == TestCaseStatus::Completed && r.all_validations_passed())
        .count();
    let success_rate = if total == 0 {
        0.0
    } else {
        successes as f64 / f64::from(total)
    };

    let mut durations: Vec<f64> = session
        .results
        .iter()
        .filter(|r| r.status == TestCaseStatus::Completed)
        .filter_map(|r| r.duration_ms)
        .map(|ms| ms as f64)
        .collect();
    durations.sort_by(|a, b| a.total_cmp(b));

    let mut by_kind: BTreeMap<String, (u32, u32)> = BTreeMap::new();
    for result in &session.results {
        for check in &result.validation_results {
            let entry = by_kind.entry(check.kind.clone()).or_default();
            entry.1 += 1;
            if check.passed {
                entry.0 += 1;
            }
        }
    }
    let quality = by_kind
        .into_iter()
        .map(|(kind, (passed, total))| {
            let rate = if total == 0 {
                0.0
            } else {
                f64::from(passed) / f64::from(total)
            };
            (kind, rate)
        })
        .collect();

    AggregateMetrics {
        total_test_cases: total,
        completed_test_cases: session.progress.completed_test_cases,
        failed_test_cases: session.progress.failed_test_cases,
        skipped_test_cases: session.progress.skipped_test_cases,
        success_rate,
        latency: latency_stats(&durations),
        quality,
    }
}

/// Latency statistics over an ascending-sorted value set
pub fn latency_stats(sorted: &[f64]) -> LatencyStats {
    if sorted.is_empty() {
        return LatencyStats::default();
    }
    LatencyStats {
        mean_ms: mean(sorted),
        median_ms: median(sorted),
        p95_ms: percentile(sorted, 0.95),
        p99_ms: percentile(sorted, 0.99),
        min_ms: sorted[0],
        max_ms: sorted[sorted.len() - 1],
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of an ascending-sorted set; the average of the two central values
/// for an even count
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Percentile of an ascending-sorted set at index `ceil(n * p) - 1`,
/// clamped to the valid range
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let index = ((n as f64 * p).ceil() as i64 - 1).clamp(0, n as i64 - 1);
    sorted[index as usize]
}

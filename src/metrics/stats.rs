//! Aggregates over a slice of metric records

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::metrics::ModelMetrics;

/// Aggregates computed over the records returned by a query.
///
/// Duration and throughput statistics ignore non-positive samples;
/// standard deviation over fewer than two samples is zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStats {
    pub average_duration: f64,
    pub median_duration: f64,
    pub max_duration: f64,
    pub min_duration: f64,
    pub std_duration: f64,

    pub average_tokens_per_second: f64,
    pub median_tokens_per_second: f64,
    pub max_tokens_per_second: f64,
    pub min_tokens_per_second: f64,
    pub std_tokens_per_second: f64,

    /// Share of records with a 2xx status, in percent
    pub percent_success: f64,
    /// Frequency table of observed status codes
    pub status_counter: HashMap<u16, u64>,
    pub average_internal_retries: f64,
    pub total_requests: u64,
}

pub(crate) fn compute_stats(records: &[ModelMetrics]) -> LogStats {
    if records.is_empty() {
        return LogStats::default();
    }

    let durations: Vec<f64> = records
        .iter()
        .map(|r| r.call_duration)
        .filter(|d| *d > 0.0)
        .collect();
    let throughputs: Vec<f64> = records
        .iter()
        .map(|r| r.tokens_per_second)
        .filter(|t| *t > 0.0)
        .collect();
    let retries: Vec<f64> = records.iter().map(|r| r.internal_retries as f64).collect();

    let successes = records
        .iter()
        .filter(|r| r.status_code.is_some_and(|code| (200..300).contains(&code)))
        .count();
    let mut status_counter: HashMap<u16, u64> = HashMap::new();
    for record in records {
        if let Some(code) = record.status_code {
            *status_counter.entry(code).or_default() += 1;
        }
    }

    LogStats {
        average_duration: mean(&durations),
        median_duration: median(&durations),
        max_duration: max_or_zero(&durations),
        min_duration: min_or_zero(&durations),
        std_duration: std_dev(&durations),
        average_tokens_per_second: mean(&throughputs),
        median_tokens_per_second: median(&throughputs),
        max_tokens_per_second: max_or_zero(&throughputs),
        min_tokens_per_second: min_or_zero(&throughputs),
        std_tokens_per_second: std_dev(&throughputs),
        percent_success: successes as f64 / records.len() as f64 * 100.0,
        status_counter,
        average_internal_retries: mean(&retries),
        total_requests: records.len() as u64,
    }
}

fn max_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().copied().fold(f64::MIN, f64::max)
    }
}

fn min_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().copied().fold(f64::INFINITY, f64::min)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Sample standard deviation; zero for fewer than two samples
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

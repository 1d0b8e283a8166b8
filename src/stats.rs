// src/stats.rs
//
// Status-code buckets and the arithmetic every metric shares. Handlers must
// go through these helpers so that a percentage is rounded the same way
// everywhere.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

// Status codes (outboundmaster_detail.Status / outboundmaster.Status)

/// Detail statuses that mean the call never connected.
pub const NOT_CONNECTED: &[&str] = &["R", "D", "Q"];
/// Detail status for a dropped / failed call.
pub const DROPPED: &str = "F";
/// Detail status for a completed claim lookup.
pub const COMPLETED: &str = "C";
/// Detail statuses counted as a successful attempt.
pub const SUCCESS: &[&str] = &["S", "C"];
/// Detail statuses counted as a failed attempt in the reattempt funnel.
pub const FAILURE: &[&str] = &["F", "R", "E", "G"];
/// Detail statuses counted as system errors.
pub const ERROR: &[&str] = &["F", "G", "E", "R"];
/// Detail statuses that leave a claim incomplete.
pub const INCOMPLETE: &[&str] = &["I", "F", "E", "G", "R"];

/// Batch status: pending (in progress / queued for transcription).
pub const BATCH_PENDING: &str = "P";
/// Batch status: transcribed.
pub const BATCH_TRANSCRIBED: &str = "T";

/// Nominal line capacity, only used for utilization percentages.
pub const CAPACITY: i32 = 500;

pub const TOP_DROP_RATE: usize = 15;
pub const TOP_DROPPED: usize = 10;
pub const TOP_FILTER_INSURANCES: usize = 50;

/// Vendor label for the single transcription pipeline.
pub const TRANSCRIPTION_VENDOR: &str = "Auto Service";

/// Call type of every row in outboundmaster.
pub const CALL_TYPE_OUTBOUND: &str = "Outbound";

/// SQL list literal for a fixed code set, e.g. `('F','G','E','R')`.
///
/// Only ever called with the constants above, never with request input.
pub fn sql_code_list(codes: &[&str]) -> String {
    let quoted: Vec<String> = codes.iter().map(|c| format!("'{c}'")).collect();
    format!("({})", quoted.join(","))
}

// Arithmetic

/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// `part / whole * 100` rounded to `decimals`; 0 when `whole` is 0.
pub fn pct(part: i64, whole: i64, decimals: i32) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round_to(part as f64 / whole as f64 * 100.0, decimals)
}

/// Percent change between the last two buckets, rounded to 1 decimal.
/// 0 with fewer than two buckets or when the previous bucket is 0.
pub fn trend(values: &[i64]) -> f64 {
    match values {
        [.., prev, last] if *prev != 0 => round_to((last - prev) as f64 / *prev as f64 * 100.0, 1),
        _ => 0.0,
    }
}

/// One-decimal string form used by `total-calls` and `drop-rate`.
pub fn trend_label(value: f64) -> String {
    format!("{value:.1}")
}

// Thresholds

/// Traffic-light state of a dashboard value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Green,
    Yellow,
    Red,
    /// No value to judge.
    Neutral,
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Health::Green => "green",
            Health::Yellow => "yellow",
            Health::Red => "red",
            Health::Neutral => "neutral",
        })
    }
}

/// Values that carry a threshold on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gauge {
    /// Percent.
    ConnectionRate,
    /// Percent.
    DropRate,
    /// Percent.
    ErrorRate,
    /// Percent.
    FirstAttempt,
    /// Percent.
    ClaimCompletion,
    /// Batches waiting.
    TranscriptionQueue,
    /// Seconds.
    TranscriptionP90,
    /// Utilization percent.
    Capacity,
}

pub const CONNECTION_RATE_GREEN: f64 = 95.0;
pub const CONNECTION_RATE_YELLOW: f64 = 90.0;
/// Drop and error rates above this are red; above half of it, yellow.
pub const FAILURE_RATE_WARNING: f64 = 10.0;
pub const FIRST_ATTEMPT_WARNING: f64 = 85.0;
pub const CLAIM_COMPLETION_WARNING: f64 = 80.0;
/// Yellow band below the first-attempt and completion targets.
pub const TARGET_MARGIN: f64 = 5.0;
pub const TRANSCRIPTION_QUEUE_WARNING: f64 = 100.0;
pub const TRANSCRIPTION_P90_WARNING_SECS: f64 = 4.0;
pub const CAPACITY_WARNING: f64 = 90.0;

// Green cutoffs of the lower-is-better gauges: half the queue warning, 70 % of
// the p90 and capacity warnings.
const QUEUE_GREEN: f64 = 50.0;
const P90_GREEN_SECS: f64 = 2.8;
const CAPACITY_GREEN: f64 = 63.0;

fn higher_is_better(value: f64, green: f64, yellow: f64) -> Health {
    if value >= green {
        Health::Green
    } else if value >= yellow {
        Health::Yellow
    } else {
        Health::Red
    }
}

fn lower_is_better(value: f64, green: f64, yellow: f64) -> Health {
    if value <= green {
        Health::Green
    } else if value <= yellow {
        Health::Yellow
    } else {
        Health::Red
    }
}

/// Threshold colour of `value` for `gauge`. Non-finite values are neutral.
pub fn classify(gauge: Gauge, value: f64) -> Health {
    if !value.is_finite() {
        return Health::Neutral;
    }
    match gauge {
        Gauge::ConnectionRate => higher_is_better(value, CONNECTION_RATE_GREEN, CONNECTION_RATE_YELLOW),
        Gauge::DropRate | Gauge::ErrorRate => {
            if value > FAILURE_RATE_WARNING {
                Health::Red
            } else if value > FAILURE_RATE_WARNING / 2.0 {
                Health::Yellow
            } else {
                Health::Green
            }
        }
        Gauge::FirstAttempt => {
            higher_is_better(value, FIRST_ATTEMPT_WARNING, FIRST_ATTEMPT_WARNING - TARGET_MARGIN)
        }
        Gauge::ClaimCompletion => {
            higher_is_better(value, CLAIM_COMPLETION_WARNING, CLAIM_COMPLETION_WARNING - TARGET_MARGIN)
        }
        Gauge::TranscriptionQueue => lower_is_better(value, QUEUE_GREEN, TRANSCRIPTION_QUEUE_WARNING),
        Gauge::TranscriptionP90 => lower_is_better(value, P90_GREEN_SECS, TRANSCRIPTION_P90_WARNING_SECS),
        Gauge::Capacity => lower_is_better(value, CAPACITY_GREEN, CAPACITY_WARNING),
    }
}

/// Count-weighted mean of per-group averages.
pub fn weighted_mean(groups: impl IntoIterator<Item = (f64, i64)>) -> Option<f64> {
    let (sum, n) = groups
        .into_iter()
        .fold((0.0, 0i64), |(s, n), (avg, count)| (s + avg * count as f64, n + count));
    (n > 0).then(|| sum / n as f64)
}

// Labels

/// "Jun 10" style label for a `YYYY-MM-DD` bucket; the raw text is kept when
/// it does not parse.
pub fn short_date(day: &str) -> String {
    match NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d") {
        Ok(d) => d.format("%b %d").to_string(),
        Err(_) => day.to_string(),
    }
}

/// "07:00" style label for an hour of day.
pub fn hour_label(hour: i32) -> String {
    format!("{hour:02}:00")
}

// src/models/mod.rs
//
// One row type per query shape. Column aliases in the SQL match the field
// names below; dates come back as `YYYY-MM-DD` text and counts as INT.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Daily buckets
#[derive(Debug, Clone, FromRow)]
pub struct DailyCount {
    pub call_date: String,
    pub call_count: i32,
}

/// Per-day total plus the number of rows that satisfied the metric's predicate
/// (connected, first-attempt success, error ...).
#[derive(Debug, Clone, FromRow)]
pub struct DailyRatio {
    pub call_date: String,
    pub total: i32,
    pub hits: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyLatency {
    pub call_date: String,
    pub batch_count: i32,
    pub avg_latency_min: Option<f64>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DailyUsage {
    pub usage_date: String,
    pub transcribed: i32,
    pub total_claims: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct HourlyBucket {
    pub call_date: String,
    pub hour: Option<i32>,
    pub concurrent: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct HourWeekday {
    pub hour: Option<i32>,
    pub day_of_week: Option<String>,
    pub call_count: i32,
}

// Grouped breakdowns
#[derive(Debug, Clone, FromRow)]
pub struct InsuranceDrops {
    pub insurance: Option<String>,
    pub total: i32,
    pub dropped: i32,
}

/// Status code with its `outboundCallStatus` description.
#[derive(Debug, Clone, FromRow)]
pub struct StatusCount {
    pub status_code: Option<String>,
    pub label: Option<String>,
    pub count: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct AttemptBucket {
    pub attempts: i32,
    pub batch_count: i32,
    pub succeeded: i32,
    pub failed: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct DurationStats {
    pub insurance: String,
    pub avg_duration: Option<f64>,
    pub min_duration: Option<i32>,
    pub max_duration: Option<i32>,
    pub call_count: i32,
    pub median: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
}

// Snapshots / scalars
#[derive(Debug, Clone, FromRow)]
pub struct Count {
    pub n: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct QueueSnapshot {
    pub pending: i32,
    pub wait_seconds: Option<i32>,
}

#[derive(Debug, Clone, FromRow)]
pub struct TextValue {
    pub val: Option<String>,
}

// Operations log
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CallLogRow {
    #[serde(rename = "CallID")]
    pub call_id: i32,
    #[serde(rename = "CallDate")]
    pub call_date: Option<String>,
    #[serde(rename = "CallInTime")]
    pub call_in_time: Option<String>,
    #[serde(rename = "DNIS")]
    pub dnis: Option<String>,
    #[serde(rename = "AscendExt")]
    pub ascend_ext: Option<String>,
    /// Filled from `unique_id` after the fetch.
    #[serde(rename = "Insurance")]
    #[sqlx(default)]
    pub insurance: Option<String>,
    #[serde(rename = "Practice")]
    pub practice: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "StatusDescription")]
    pub status_description: Option<String>,
    #[serde(rename = "ClaimNo")]
    pub claim_no: Option<String>,
    #[serde(rename = "NoOfClaims")]
    pub no_of_claims: Option<i32>,
    #[serde(rename = "UniqueId")]
    pub unique_id: Option<String>,
    #[serde(rename = "BatchStatus")]
    pub batch_status: Option<String>,
    #[serde(rename = "TranscriptionPreview")]
    pub transcription_preview: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CallDetailRow {
    #[serde(rename = "CallID")]
    pub call_id: i32,
    #[serde(rename = "CallDate")]
    pub call_date: Option<String>,
    #[serde(rename = "CallInTime")]
    pub call_in_time: Option<String>,
    #[serde(rename = "DNIS")]
    pub dnis: Option<String>,
    #[serde(rename = "AscendExt")]
    pub ascend_ext: Option<String>,
    #[serde(rename = "Insurance")]
    #[sqlx(default)]
    pub insurance: Option<String>,
    #[serde(rename = "Practice")]
    pub practice: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "StatusDescription")]
    pub status_description: Option<String>,
    #[serde(rename = "ClaimNo")]
    pub claim_no: Option<String>,
    #[serde(rename = "NoOfClaims")]
    pub no_of_claims: Option<i32>,
    #[serde(rename = "UniqueId")]
    pub unique_id: Option<String>,
    #[serde(rename = "BatchStatus")]
    pub batch_status: Option<String>,
    #[serde(rename = "BatchRemarks")]
    pub batch_remarks: Option<String>,
    #[serde(rename = "Transcription")]
    pub transcription: Option<String>,
}

/// One `outboundmaster_detail_data` name/value pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct DetailAttribute {
    pub prompt_id: String,
    pub value: Option<String>,
}

// Schema explorer
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub schema: String,
    pub table: String,
    pub row_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub column: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub max_length: i32,
    pub nullable: bool,
    pub identity: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ColumnMatch {
    pub schema: String,
    pub table: String,
    pub column: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

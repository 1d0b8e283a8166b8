// src/routes/dashboard/infrastructure.rs
//
// Transcription pipeline, concurrency and system error metrics.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::query_as;

use super::{sum_i64, TrendPoint, CALL_DAY, FROM_BATCH_DETAIL, JOIN_STATUS};
use crate::error::ApiResult;
use crate::filters::{FilterQuery, WhereClause};
use crate::models::{DailyCount, DailyLatency, DailyRatio, DailyUsage, HourlyBucket, QueueSnapshot, StatusCount};
use crate::stats::{self, hour_label, pct, short_date, sql_code_list, weighted_mean};
use crate::AppState;

// transcription-queue

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuePoint {
    pub time: String,
    pub value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionQueue {
    pub current: i64,
    pub avg_wait_seconds: i64,
    pub history: Vec<QueuePoint>,
}

impl TranscriptionQueue {
    /// `history` must already be chronological.
    pub fn from_rows(snapshot: &QueueSnapshot, history: &[DailyCount]) -> Self {
        Self {
            current: snapshot.pending.into(),
            avg_wait_seconds: snapshot.wait_seconds.map(i64::from).unwrap_or(0).max(0),
            history: history
                .iter()
                .map(|r| QueuePoint { time: short_date(&r.call_date), value: r.call_count.into() })
                .collect(),
        }
    }
}

/// GET /api/dashboard/transcription-queue
///
/// Live snapshot; ignores filters.
pub async fn transcription_queue(State(state): State<AppState>) -> ApiResult<Json<TranscriptionQueue>> {
    let pending = sql_code_list(&[stats::BATCH_PENDING]);
    let snapshot_sql = format!(
        "SELECT CAST(COUNT(*) AS INT) AS pending,
                DATEDIFF(SECOND, MIN(CallInTime), GETDATE()) AS wait_seconds
         FROM outboundmaster
         WHERE RTRIM(Status) IN {pending}"
    );
    let history_sql = format!(
        "SELECT CONVERT(VARCHAR(10), CAST(CallDate AS DATE), 23) AS call_date,
                CAST(COUNT(*) AS INT) AS call_count
         FROM outboundmaster
         WHERE RTRIM(Status) IN {pending}
         GROUP BY CAST(CallDate AS DATE)
         ORDER BY call_date"
    );

    let (snapshot, history) = tokio::try_join!(
        query_as::<_, QueueSnapshot>(&snapshot_sql).fetch_one(&state.pool),
        query_as::<_, DailyCount>(&history_sql).fetch_all(&state.pool),
    )?;
    Ok(Json(TranscriptionQueue::from_rows(&snapshot, &history)))
}

// transcription-time

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorLatency {
    pub vendor: String,
    pub avg_ms: i64,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionTime {
    pub overall_avg_ms: i64,
    pub by_vendor: Vec<VendorLatency>,
}

impl TranscriptionTime {
    pub fn from_rows(rows: &[DailyLatency]) -> Self {
        let count = sum_i64(rows, |r| r.batch_count);
        let avg_min = weighted_mean(
            rows.iter()
                .map(|r| (r.avg_latency_min.unwrap_or(0.0), i64::from(r.batch_count))),
        )
        .map(|m| m.round() as i64)
        .unwrap_or(0);
        let avg_ms = avg_min * 60_000;
        Self {
            overall_avg_ms: avg_ms,
            by_vendor: vec![VendorLatency {
                vendor: stats::TRANSCRIPTION_VENDOR.to_string(),
                avg_ms,
                count,
            }],
        }
    }
}

/// GET /api/dashboard/transcription-time
///
/// Only the date bounds apply; the pipeline is tracked per batch.
pub async fn transcription_time(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<TranscriptionTime>> {
    let w = WhereClause::dates_only("om.CallDate", &q.parse()?);
    let sql = format!(
        "SELECT {CALL_DAY} AS call_date,
                CAST(COUNT(*) AS INT) AS batch_count,
                CAST(AVG(CAST(DATEDIFF(MINUTE, om.CallInTime, GETDATE()) AS FLOAT)) AS FLOAT) AS avg_latency_min
         FROM outboundmaster om
         WHERE RTRIM(om.Status) IN {transcribed} {and_sql}
         GROUP BY {CALL_DAY}
         ORDER BY call_date",
        transcribed = sql_code_list(&[stats::BATCH_TRANSCRIBED]),
        and_sql = w.and_sql()
    );
    let rows = w.bind(query_as::<_, DailyLatency>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(TranscriptionTime::from_rows(&rows)))
}

// transcription-api-usage

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct UsagePoint {
    pub date: String,
    pub calls: i64,
    pub chars: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorUsage {
    pub vendor: String,
    pub daily: Vec<UsagePoint>,
    pub total_calls: i64,
    pub total_chars: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionApiUsage {
    pub vendors: Vec<VendorUsage>,
}

impl TranscriptionApiUsage {
    pub fn from_rows(rows: &[DailyUsage]) -> Self {
        Self {
            vendors: vec![VendorUsage {
                vendor: stats::TRANSCRIPTION_VENDOR.to_string(),
                daily: rows
                    .iter()
                    .map(|r| UsagePoint {
                        date: short_date(&r.usage_date),
                        calls: r.transcribed.into(),
                        chars: r.total_claims.into(),
                    })
                    .collect(),
                total_calls: sum_i64(rows, |r| r.transcribed),
                total_chars: sum_i64(rows, |r| r.total_claims),
            }],
        }
    }
}

/// GET /api/dashboard/transcription-api-usage
///
/// `chars` is the number of claims (detail rows) in the transcribed batches.
pub async fn transcription_api_usage(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<TranscriptionApiUsage>> {
    let w = WhereClause::dates_only("om.CallDate", &q.parse()?);
    let sql = format!(
        "SELECT {CALL_DAY} AS usage_date,
                CAST(COUNT(*) AS INT) AS transcribed,
                CAST(ISNULL(SUM(od_count.detail_count), 0) AS INT) AS total_claims
         FROM outboundmaster om
         CROSS APPLY (
            SELECT COUNT(*) AS detail_count
            FROM outboundmaster_detail od
            WHERE od.OID = om.ID
         ) od_count
         WHERE RTRIM(om.Status) IN {transcribed} {and_sql}
         GROUP BY {CALL_DAY}
         ORDER BY usage_date",
        transcribed = sql_code_list(&[stats::BATCH_TRANSCRIBED]),
        and_sql = w.and_sql()
    );
    let rows = w.bind(query_as::<_, DailyUsage>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(TranscriptionApiUsage::from_rows(&rows)))
}

// concurrent-peaks

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyLoad {
    pub date: String,
    pub hour: Option<String>,
    pub concurrent: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConcurrentPeaks {
    pub peak: Option<HourlyLoad>,
    pub capacity: i32,
    pub hourly: Vec<HourlyLoad>,
}

impl ConcurrentPeaks {
    pub fn from_rows(rows: &[HourlyBucket]) -> Self {
        let hourly: Vec<HourlyLoad> = rows
            .iter()
            .map(|r| HourlyLoad {
                date: short_date(&r.call_date),
                hour: r.hour.map(hour_label),
                concurrent: r.concurrent.into(),
            })
            .collect();

        // first bucket holding the strict maximum; all-zero data has no peak
        let mut peak: Option<&HourlyLoad> = None;
        for h in &hourly {
            if h.concurrent > peak.map_or(0, |p| p.concurrent) {
                peak = Some(h);
            }
        }

        Self {
            peak: peak.cloned(),
            capacity: stats::CAPACITY,
            hourly,
        }
    }
}

/// GET /api/dashboard/concurrent-peaks
pub async fn concurrent_peaks(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<ConcurrentPeaks>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let sql = format!(
        "SELECT {CALL_DAY} AS call_date,
                DATEPART(HOUR, om.CallInTime) AS hour,
                CAST(COUNT(od.ID) AS INT) AS concurrent
         {FROM_BATCH_DETAIL}
         {where_sql}
         GROUP BY {CALL_DAY}, DATEPART(HOUR, om.CallInTime)
         ORDER BY call_date, hour",
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, HourlyBucket>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(ConcurrentPeaks::from_rows(&rows)))
}

// error-rate

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorType {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRate {
    pub rate: f64,
    pub total_errors: i64,
    pub total_calls: i64,
    pub trend_data: Vec<TrendPoint<f64>>,
    pub breakdown: Vec<ErrorType>,
}

impl ErrorRate {
    pub fn from_rows(daily: &[DailyRatio], breakdown: &[StatusCount]) -> Self {
        let total = sum_i64(daily, |r| r.total);
        let errors = sum_i64(daily, |r| r.hits);
        Self {
            rate: pct(errors, total, 2),
            total_errors: errors,
            total_calls: total,
            trend_data: daily
                .iter()
                .map(|r| TrendPoint {
                    date: short_date(&r.call_date),
                    value: pct(r.hits.into(), r.total.into(), 2),
                })
                .collect(),
            breakdown: breakdown
                .iter()
                .map(|r| ErrorType {
                    kind: r
                        .label
                        .clone()
                        .or_else(|| r.status_code.clone())
                        .unwrap_or_default(),
                    count: r.count.into(),
                })
                .collect(),
        }
    }
}

/// GET /api/dashboard/error-rate
pub async fn error_rate(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<ErrorRate>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let errors = sql_code_list(stats::ERROR);

    let daily_sql = format!(
        "SELECT {CALL_DAY} AS call_date,
                CAST(COUNT(od.ID) AS INT) AS total,
                CAST(SUM(CASE WHEN RTRIM(od.Status) IN {errors} THEN 1 ELSE 0 END) AS INT) AS hits
         {FROM_BATCH_DETAIL}
         {where_sql}
         GROUP BY {CALL_DAY}
         ORDER BY call_date",
        where_sql = w.sql()
    );

    let mut bw = w.clone();
    bw.push_condition(format!("RTRIM(od.Status) IN {errors}"));
    let breakdown_sql = format!(
        "SELECT RTRIM(od.Status) AS status_code,
                COALESCE(ocs.Description, RTRIM(od.Status)) AS label,
                CAST(COUNT(od.ID) AS INT) AS [count]
         {FROM_BATCH_DETAIL}
         {JOIN_STATUS}
         {where_sql}
         GROUP BY RTRIM(od.Status), COALESCE(ocs.Description, RTRIM(od.Status))
         ORDER BY COUNT(od.ID) DESC",
        where_sql = bw.sql()
    );

    let (daily, breakdown) = tokio::try_join!(
        w.bind(query_as::<_, DailyRatio>(&daily_sql)).fetch_all(&state.pool),
        bw.bind(query_as::<_, StatusCount>(&breakdown_sql)).fetch_all(&state.pool),
    )?;
    Ok(Json(ErrorRate::from_rows(&daily, &breakdown)))
}

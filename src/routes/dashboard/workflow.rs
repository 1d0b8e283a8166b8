// src/routes/dashboard/workflow.rs
//
// Claim workflow metrics: outcome breakdowns, completion, reattempts.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::query_as;

use super::{merge_by_label, sum_i64, TrendPoint, CALL_DAY, FROM_BATCH_DETAIL, JOIN_STATUS};
use crate::error::ApiResult;
use crate::filters::{FilterQuery, WhereClause};
use crate::models::{AttemptBucket, DailyRatio, StatusCount};
use crate::stats::{self, pct, short_date, sql_code_list};
use crate::AppState;

/// Status code, its description (or a fallback built from the code), and the
/// row count, ordered by count descending.
fn status_breakdown_sql(w: &WhereClause, fallback_prefix: &str) -> String {
    let label = format!("COALESCE(ocs.Description, '{fallback_prefix}' + RTRIM(od.Status))");
    format!(
        "SELECT RTRIM(od.Status) AS status_code,
                {label} AS label,
                CAST(COUNT(od.ID) AS INT) AS [count]
         {FROM_BATCH_DETAIL}
         {JOIN_STATUS}
         {where_sql}
         GROUP BY RTRIM(od.Status), {label}
         ORDER BY COUNT(od.ID) DESC",
        where_sql = w.sql()
    )
}

fn label_of(r: &StatusCount) -> String {
    r.label
        .clone()
        .or_else(|| r.status_code.clone())
        .unwrap_or_default()
}

// initiation-source

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub label: String,
    pub value: i64,
    pub pct: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiationSource {
    pub sources: Vec<Source>,
}

impl InitiationSource {
    pub fn from_rows(rows: &[StatusCount]) -> Self {
        let total = sum_i64(rows, |r| r.count);
        Self {
            sources: rows
                .iter()
                .map(|r| Source {
                    id: r.status_code.clone().unwrap_or_default(),
                    label: label_of(r),
                    value: r.count.into(),
                    pct: pct(r.count.into(), total, 1),
                })
                .collect(),
        }
    }
}

/// GET /api/dashboard/initiation-source
pub async fn initiation_source(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<InitiationSource>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let sql = status_breakdown_sql(&w, "Status: ");
    let rows = w.bind(query_as::<_, StatusCount>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(InitiationSource::from_rows(&rows)))
}

// claim-completion

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct ClaimStatus {
    pub status: String,
    pub count: i64,
    pub pct: f64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCompletion {
    pub completion_rate: f64,
    pub total: i64,
    pub statuses: Vec<ClaimStatus>,
}

impl ClaimCompletion {
    pub fn from_rows(rows: &[StatusCount]) -> Self {
        let total = sum_i64(rows, |r| r.count);
        let completed = sum_i64(rows, |r| {
            if r.status_code.as_deref() == Some(stats::COMPLETED) {
                r.count
            } else {
                0
            }
        });
        Self {
            completion_rate: pct(completed, total, 1),
            total,
            statuses: rows
                .iter()
                .map(|r| ClaimStatus {
                    status: label_of(r),
                    count: r.count.into(),
                    pct: pct(r.count.into(), total, 1),
                })
                .collect(),
        }
    }
}

/// GET /api/dashboard/claim-completion
pub async fn claim_completion(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<ClaimCompletion>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let sql = status_breakdown_sql(&w, "");
    let rows = w.bind(query_as::<_, StatusCount>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(ClaimCompletion::from_rows(&rows)))
}

// reattempt-funnel

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct FunnelStage {
    pub attempt: i32,
    pub total: i64,
    pub succeeded: i64,
    pub failed: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReattemptFunnel {
    pub funnel: Vec<FunnelStage>,
}

impl ReattemptFunnel {
    pub fn from_rows(rows: &[AttemptBucket]) -> Self {
        Self {
            funnel: rows
                .iter()
                .map(|r| FunnelStage {
                    attempt: r.attempts,
                    total: r.batch_count.into(),
                    succeeded: r.succeeded.into(),
                    failed: r.failed.into(),
                })
                .collect(),
        }
    }
}

/// GET /api/dashboard/reattempt-funnel
pub async fn reattempt_funnel(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<ReattemptFunnel>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let sql = format!(
        "SELECT attempts,
                CAST(COUNT(*) AS INT) AS batch_count,
                CAST(SUM(succeeded) AS INT) AS succeeded,
                CAST(SUM(failed) AS INT) AS failed
         FROM (
            SELECT om.ID,
                   COUNT(od.ID) AS attempts,
                   SUM(CASE WHEN RTRIM(od.Status) IN {success} THEN 1 ELSE 0 END) AS succeeded,
                   SUM(CASE WHEN RTRIM(od.Status) IN {failure} THEN 1 ELSE 0 END) AS failed
            {FROM_BATCH_DETAIL}
            {where_sql}
            GROUP BY om.ID
         ) per_batch
         GROUP BY attempts
         ORDER BY attempts",
        success = sql_code_list(stats::SUCCESS),
        failure = sql_code_list(stats::FAILURE),
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, AttemptBucket>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(ReattemptFunnel::from_rows(&rows)))
}

// first-attempt-rate

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstAttemptRate {
    pub rate: f64,
    pub total: i64,
    pub first_attempt_success: i64,
    pub trend_data: Vec<TrendPoint<f64>>,
}

impl FirstAttemptRate {
    pub fn from_rows(rows: &[DailyRatio]) -> Self {
        let total = sum_i64(rows, |r| r.total);
        let success = sum_i64(rows, |r| r.hits);
        Self {
            rate: pct(success, total, 1),
            total,
            first_attempt_success: success,
            trend_data: rows
                .iter()
                .map(|r| TrendPoint {
                    date: short_date(&r.call_date),
                    value: pct(r.hits.into(), r.total.into(), 1),
                })
                .collect(),
        }
    }
}

/// GET /api/dashboard/first-attempt-rate
pub async fn first_attempt_rate(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<FirstAttemptRate>> {
    let w = WhereClause::for_filters(&q.parse()?);
    // One row per batch: its lowest-id detail is the first attempt. The
    // filters apply through EXISTS so batches are not multiplied by details.
    let sql = format!(
        "SELECT {CALL_DAY} AS call_date,
                CAST(COUNT(*) AS INT) AS total,
                CAST(SUM(CASE WHEN first_detail.Status IN {success} THEN 1 ELSE 0 END) AS INT) AS hits
         FROM outboundmaster om
         CROSS APPLY (
            SELECT TOP 1 RTRIM(od2.Status) AS Status
            FROM outboundmaster_detail od2
            WHERE od2.OID = om.ID
            ORDER BY od2.ID ASC
         ) first_detail
         WHERE EXISTS (
            SELECT 1 FROM outboundmaster_detail od
            WHERE od.OID = om.ID {and_sql}
         )
         GROUP BY {CALL_DAY}
         ORDER BY call_date",
        success = sql_code_list(stats::SUCCESS),
        and_sql = w.and_sql()
    );
    let rows = w.bind(query_as::<_, DailyRatio>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(FirstAttemptRate::from_rows(&rows)))
}

// incomplete-steps

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step: String,
    pub count: i64,
    pub pct: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IncompleteSteps {
    pub steps: Vec<Step>,
}

impl IncompleteSteps {
    pub fn from_rows(rows: &[StatusCount]) -> Self {
        let total = sum_i64(rows, |r| r.count);
        let merged = merge_by_label(rows.iter().map(|r| (label_of(r), i64::from(r.count))));
        Self {
            steps: merged
                .into_iter()
                .map(|(step, count)| Step { step, count, pct: pct(count, total, 1) })
                .collect(),
        }
    }
}

/// GET /api/dashboard/incomplete-steps
pub async fn incomplete_steps(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<IncompleteSteps>> {
    let mut w = WhereClause::for_filters(&q.parse()?);
    w.push_condition(format!("RTRIM(od.Status) IN {}", sql_code_list(stats::INCOMPLETE)));
    let sql = status_breakdown_sql(&w, "");
    let rows = w.bind(query_as::<_, StatusCount>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(IncompleteSteps::from_rows(&rows)))
}

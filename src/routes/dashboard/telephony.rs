// src/routes/dashboard/telephony.rs
//
// Call volume, connection and drop metrics.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::query_as;

use super::{sum_i64, TrendPoint, CALL_DAY, FROM_BATCH_DETAIL};
use crate::error::ApiResult;
use crate::filters::{FilterQuery, WhereClause, INS_EXPR};
use crate::models::{Count, DailyCount, DailyRatio, DurationStats, HourWeekday, InsuranceDrops, StatusCount};
use crate::stats::{self, hour_label, pct, round_to, short_date, sql_code_list};
use crate::AppState;

// total-calls

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCalls {
    pub total: i64,
    pub avg_daily: i64,
    pub trend: String,
    pub trend_data: Vec<TrendPoint<i64>>,
}

impl TotalCalls {
    pub fn from_rows(rows: &[DailyCount]) -> Self {
        let values: Vec<i64> = rows.iter().map(|r| i64::from(r.call_count)).collect();
        let total: i64 = values.iter().sum();
        let avg_daily = if values.is_empty() {
            0
        } else {
            (total as f64 / values.len() as f64).round() as i64
        };
        Self {
            total,
            avg_daily,
            trend: stats::trend_label(stats::trend(&values)),
            trend_data: rows
                .iter()
                .map(|r| TrendPoint { date: short_date(&r.call_date), value: i64::from(r.call_count) })
                .collect(),
        }
    }
}

/// GET /api/dashboard/total-calls
pub async fn total_calls(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<TotalCalls>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let sql = format!(
        "SELECT {CALL_DAY} AS call_date, CAST(COUNT(od.ID) AS INT) AS call_count
         {FROM_BATCH_DETAIL}
         {where_sql}
         GROUP BY {CALL_DAY}
         ORDER BY call_date",
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, DailyCount>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(TotalCalls::from_rows(&rows)))
}

// connection-rate

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRate {
    pub current: f64,
    pub trend: f64,
    pub connected: i64,
    pub initiated: i64,
    pub trend_data: Vec<TrendPoint<f64>>,
}

impl ConnectionRate {
    pub fn from_rows(rows: &[DailyRatio]) -> Self {
        let initiated = sum_i64(rows, |r| r.total);
        let connected = sum_i64(rows, |r| r.hits);
        let trend_data: Vec<TrendPoint<f64>> = rows
            .iter()
            .map(|r| TrendPoint {
                date: short_date(&r.call_date),
                value: pct(r.hits.into(), r.total.into(), 1),
            })
            .collect();

        let n = trend_data.len();
        let latest = trend_data.last().map_or(0.0, |p| p.value);
        let prev = if n >= 2 { trend_data[n - 2].value } else { 0.0 };

        Self {
            current: pct(connected, initiated, 1),
            trend: round_to(latest - prev, 1),
            connected,
            initiated,
            trend_data,
        }
    }
}

/// GET /api/dashboard/connection-rate
pub async fn connection_rate(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<ConnectionRate>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let sql = format!(
        "SELECT {CALL_DAY} AS call_date,
                CAST(COUNT(od.ID) AS INT) AS total,
                CAST(SUM(CASE WHEN RTRIM(od.Status) NOT IN {not_connected} THEN 1 ELSE 0 END) AS INT) AS hits
         {FROM_BATCH_DETAIL}
         {where_sql}
         GROUP BY {CALL_DAY}
         ORDER BY call_date",
        not_connected = sql_code_list(stats::NOT_CONNECTED),
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, DailyRatio>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(ConnectionRate::from_rows(&rows)))
}

// drop-rate / top-dropped

fn insurance_label(raw: &Option<String>) -> String {
    match raw.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => "Unknown".to_string(),
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceDropRate {
    pub insurance: String,
    pub drop_rate: f64,
    pub total: i64,
    pub dropped: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRate {
    pub overall: f64,
    /// No time series behind this metric; kept for the card's trend badge.
    pub trend: String,
    pub by_insurance: Vec<InsuranceDropRate>,
}

impl DropRate {
    /// `rows` are already ordered by dropped count, descending.
    pub fn from_rows(rows: &[InsuranceDrops]) -> Self {
        let total = sum_i64(rows, |r| r.total);
        let dropped = sum_i64(rows, |r| r.dropped);
        Self {
            overall: pct(dropped, total, 1),
            trend: stats::trend_label(0.0),
            by_insurance: rows
                .iter()
                .take(stats::TOP_DROP_RATE)
                .map(|r| InsuranceDropRate {
                    insurance: insurance_label(&r.insurance),
                    drop_rate: pct(r.dropped.into(), r.total.into(), 1),
                    total: r.total.into(),
                    dropped: r.dropped.into(),
                })
                .collect(),
        }
    }
}

fn dropped_sum() -> String {
    format!("SUM(CASE WHEN RTRIM(od.Status) = '{}' THEN 1 ELSE 0 END)", stats::DROPPED)
}

/// GET /api/dashboard/drop-rate
pub async fn drop_rate(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<DropRate>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let dropped = dropped_sum();
    let sql = format!(
        "SELECT {INS_EXPR} AS insurance,
                CAST(COUNT(od.ID) AS INT) AS total,
                CAST({dropped} AS INT) AS dropped
         {FROM_BATCH_DETAIL}
         {where_sql}
         GROUP BY {INS_EXPR}
         ORDER BY {dropped} DESC",
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, InsuranceDrops>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(DropRate::from_rows(&rows)))
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroppedInsurance {
    pub insurance: String,
    pub total: i64,
    pub dropped: i64,
    pub drop_pct: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TopDropped {
    pub insurances: Vec<DroppedInsurance>,
}

impl TopDropped {
    pub fn from_rows(rows: &[InsuranceDrops]) -> Self {
        Self {
            insurances: rows
                .iter()
                .filter(|r| r.dropped > 0)
                .take(stats::TOP_DROPPED)
                .map(|r| DroppedInsurance {
                    insurance: insurance_label(&r.insurance),
                    total: r.total.into(),
                    dropped: r.dropped.into(),
                    drop_pct: pct(r.dropped.into(), r.total.into(), 1),
                })
                .collect(),
        }
    }
}

/// GET /api/dashboard/top-dropped
pub async fn top_dropped(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<TopDropped>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let dropped = dropped_sum();
    let sql = format!(
        "SELECT TOP {top} {INS_EXPR} AS insurance,
                CAST(COUNT(od.ID) AS INT) AS total,
                CAST({dropped} AS INT) AS dropped
         {FROM_BATCH_DETAIL}
         {where_sql}
         GROUP BY {INS_EXPR}
         HAVING {dropped} > 0
         ORDER BY dropped DESC",
        top = stats::TOP_DROPPED,
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, InsuranceDrops>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(TopDropped::from_rows(&rows)))
}

// peak-hours

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourCalls {
    pub hour: String,
    pub calls: i64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct HeatCell {
    pub x: String,
    pub y: String,
    pub value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHours {
    pub hourly: Vec<HourCalls>,
    pub peak: HourCalls,
    pub heatmap_data: Vec<HeatCell>,
}

impl PeakHours {
    pub fn from_rows(rows: &[HourWeekday]) -> Self {
        let mut per_hour = [0i64; 24];
        for r in rows {
            if let Some(h) = r.hour.filter(|h| (0..24).contains(h)) {
                per_hour[h as usize] += i64::from(r.call_count);
            }
        }
        let hourly: Vec<HourCalls> = per_hour
            .iter()
            .enumerate()
            .map(|(h, &calls)| HourCalls { hour: hour_label(h as i32), calls })
            .collect();

        // first hour holding the maximum
        let peak = hourly
            .iter()
            .fold(&hourly[0], |max, h| if h.calls > max.calls { h } else { max })
            .clone();

        let heatmap_data = rows
            .iter()
            .filter_map(|r| {
                Some(HeatCell {
                    x: hour_label(r.hour?),
                    y: r.day_of_week.clone()?,
                    value: r.call_count.into(),
                })
            })
            .collect();

        Self { hourly, peak, heatmap_data }
    }
}

/// GET /api/dashboard/peak-hours
pub async fn peak_hours(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<PeakHours>> {
    let w = WhereClause::for_filters(&q.parse()?);
    let sql = format!(
        "SELECT DATEPART(HOUR, om.CallInTime) AS hour,
                DATENAME(WEEKDAY, om.CallDate) AS day_of_week,
                CAST(COUNT(od.ID) AS INT) AS call_count
         {FROM_BATCH_DETAIL}
         {where_sql}
         GROUP BY DATEPART(HOUR, om.CallInTime), DATENAME(WEEKDAY, om.CallDate)
         ORDER BY DATEPART(HOUR, om.CallInTime)",
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, HourWeekday>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(PeakHours::from_rows(&rows)))
}

// active-calls (live, unfiltered)

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusTally {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCalls {
    pub current: i64,
    pub capacity: i32,
    pub utilization_pct: f64,
    pub status_breakdown: Vec<StatusTally>,
    /// Not tracked server side; the client accumulates its own history.
    pub history: Vec<TrendPoint<i64>>,
}

impl ActiveCalls {
    pub fn from_rows(active: i32, breakdown: &[StatusCount]) -> Self {
        Self {
            current: active.into(),
            capacity: stats::CAPACITY,
            utilization_pct: pct(active.into(), stats::CAPACITY.into(), 1),
            status_breakdown: breakdown
                .iter()
                .map(|r| StatusTally {
                    status: r.status_code.clone().unwrap_or_default(),
                    count: r.count.into(),
                })
                .collect(),
            history: Vec::new(),
        }
    }
}

/// GET /api/dashboard/active-calls
pub async fn active_calls(State(state): State<AppState>) -> ApiResult<Json<ActiveCalls>> {
    let pending = stats::BATCH_PENDING;
    let count_sql = format!(
        "SELECT CAST(COUNT(*) AS INT) AS n FROM outboundmaster WHERE RTRIM(Status) = '{pending}'"
    );
    let breakdown_sql = format!(
        "SELECT RTRIM(od.Status) AS status_code,
                RTRIM(od.Status) AS label,
                CAST(COUNT(*) AS INT) AS count
         {FROM_BATCH_DETAIL}
         WHERE RTRIM(om.Status) = '{pending}'
         GROUP BY RTRIM(od.Status)"
    );

    let (active, breakdown) = tokio::try_join!(
        query_as::<_, Count>(&count_sql).fetch_one(&state.pool),
        query_as::<_, StatusCount>(&breakdown_sql).fetch_all(&state.pool),
    )?;
    Ok(Json(ActiveCalls::from_rows(active.n, &breakdown)))
}

// call-duration (inbound CDRs, date filter only)

#[derive(Debug, Serialize, Deserialize)]
pub struct OverallDuration {
    pub avg: f64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct InsuranceDuration {
    pub insurance: String,
    pub avg: f64,
    pub min: Option<i32>,
    pub max: Option<i32>,
    pub count: i64,
    pub median: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallDuration {
    pub overall: OverallDuration,
    pub by_insurance: Vec<InsuranceDuration>,
}

impl CallDuration {
    pub fn from_rows(rows: &[DurationStats]) -> Self {
        let overall = stats::weighted_mean(
            rows.iter()
                .filter_map(|r| Some((r.avg_duration?, i64::from(r.call_count)))),
        )
        .map_or(0.0, |v| round_to(v, 1));

        Self {
            overall: OverallDuration { avg: overall },
            by_insurance: rows
                .iter()
                .map(|r| InsuranceDuration {
                    insurance: r.insurance.clone(),
                    avg: round_to(r.avg_duration.unwrap_or(0.0), 1),
                    min: r.min_duration,
                    max: r.max_duration,
                    count: r.call_count.into(),
                    median: r.median.map(|v| round_to(v, 1)),
                    p90: r.p90.map(|v| round_to(v, 1)),
                    p95: r.p95.map(|v| round_to(v, 1)),
                })
                .collect(),
        }
    }
}

/// GET /api/dashboard/call-duration
pub async fn call_duration(
    State(state): State<AppState>,
    Query(q): Query<FilterQuery>,
) -> ApiResult<Json<CallDuration>> {
    let w = WhereClause::dates_only("cdr.CallDate", &q.parse()?);
    let sql = format!(
        "WITH d AS (
            SELECT COALESCE(app.Insurance, 'Unknown') AS insurance,
                   CAST(cdr.Duration AS FLOAT) AS duration
            FROM cdrmaster cdr
            LEFT JOIN application app ON cdr.AppID = app.AppID
            {where_sql}
         ), p AS (
            SELECT DISTINCT insurance,
                   PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY duration) OVER (PARTITION BY insurance) AS median,
                   PERCENTILE_CONT(0.9) WITHIN GROUP (ORDER BY duration) OVER (PARTITION BY insurance) AS p90,
                   PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY duration) OVER (PARTITION BY insurance) AS p95
            FROM d
         )
         SELECT d.insurance,
                AVG(d.duration) AS avg_duration,
                CAST(MIN(d.duration) AS INT) AS min_duration,
                CAST(MAX(d.duration) AS INT) AS max_duration,
                CAST(COUNT(*) AS INT) AS call_count,
                p.median, p.p90, p.p95
         FROM d
         INNER JOIN p ON p.insurance = d.insurance
         GROUP BY d.insurance, p.median, p.p90, p.p95
         ORDER BY AVG(d.duration) DESC",
        where_sql = w.sql()
    );
    let rows = w.bind(query_as::<_, DurationStats>(&sql)).fetch_all(&state.pool).await?;
    Ok(Json(CallDuration::from_rows(&rows)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: &str, n: i32) -> DailyCount {
        DailyCount { call_date: d.into(), call_count: n }
    }

    fn ins(name: Option<&str>, total: i32, dropped: i32) -> InsuranceDrops {
        InsuranceDrops { insurance: name.map(Into::into), total, dropped }
    }

    #[test]
    fn total_calls_totals_and_trend() {
        let out = TotalCalls::from_rows(&[
            day("2024-06-08", 100),
            day("2024-06-09", 120),
            day("2024-06-10", 150),
        ]);
        assert_eq!(out.total, 370);
        assert_eq!(out.avg_daily, 123);
        assert_eq!(out.trend, "25.0");
        assert_eq!(out.trend_data[2], TrendPoint { date: "Jun 10".into(), value: 150 });
    }

    #[test]
    fn total_calls_empty_and_zero_previous() {
        let empty = TotalCalls::from_rows(&[]);
        assert_eq!((empty.total, empty.avg_daily, empty.trend.as_str()), (0, 0, "0.0"));

        let zero_prev = TotalCalls::from_rows(&[day("2024-06-09", 0), day("2024-06-10", 12)]);
        assert_eq!(zero_prev.trend, "0.0");
    }

    #[test]
    fn connection_rate_uses_daily_rates_for_trend() {
        let rows = vec![
            DailyRatio { call_date: "2024-06-09".into(), total: 10, hits: 8 },
            DailyRatio { call_date: "2024-06-10".into(), total: 4, hits: 1 },
        ];
        let out = ConnectionRate::from_rows(&rows);
        assert_eq!(out.current, 64.3); // 9 / 14
        assert_eq!(out.trend, -55.0); // 25.0 - 80.0
        assert_eq!((out.connected, out.initiated), (9, 14));
        assert_eq!(out.trend_data[0].value, 80.0);
    }

    #[test]
    fn connection_rate_single_day_compares_against_zero() {
        let rows = vec![DailyRatio { call_date: "2024-06-10".into(), total: 3, hits: 2 }];
        let out = ConnectionRate::from_rows(&rows);
        assert_eq!(out.trend, 66.7);
    }

    #[test]
    fn drop_rate_overall_and_truncation() {
        let rows: Vec<InsuranceDrops> = (0..20)
            .map(|i| ins(Some(&format!("Ins{i}")), 100, 20 - i))
            .collect();
        let out = DropRate::from_rows(&rows);

        let total: i64 = 20 * 100;
        let dropped: i64 = (1..=20).sum();
        assert_eq!(out.overall, pct(dropped, total, 1));
        assert_eq!(out.trend, "0.0");
        assert_eq!(out.by_insurance.len(), 15);
        assert!(out.by_insurance.windows(2).all(|w| w[0].dropped >= w[1].dropped));
        assert_eq!(out.by_insurance[0].drop_rate, 20.0);
    }

    #[test]
    fn drop_rate_unknown_insurance_and_zero_totals() {
        let out = DropRate::from_rows(&[ins(None, 0, 0), ins(Some(""), 5, 1)]);
        assert_eq!(out.overall, 20.0);
        assert_eq!(out.by_insurance[0].insurance, "Unknown");
        assert_eq!(out.by_insurance[0].drop_rate, 0.0);
        assert_eq!(out.by_insurance[1].insurance, "Unknown");

        let empty = DropRate::from_rows(&[]);
        assert_eq!(empty.overall, 0.0);
        assert!(empty.by_insurance.is_empty());
    }

    #[test]
    fn top_dropped_limits_to_ten_with_drops() {
        let mut rows: Vec<InsuranceDrops> =
            (0..12).map(|i| ins(Some(&format!("I{i}")), 50, 12 - i)).collect();
        rows.push(ins(Some("Clean"), 50, 0));
        let out = TopDropped::from_rows(&rows);
        assert_eq!(out.insurances.len(), 10);
        assert_eq!(
            out.insurances[0],
            DroppedInsurance { insurance: "I0".into(), total: 50, dropped: 12, drop_pct: 24.0 }
        );
    }

    #[test]
    fn peak_hours_fills_all_hours_and_picks_first_max() {
        let rows = vec![
            HourWeekday { hour: Some(9), day_of_week: Some("Monday".into()), call_count: 30 },
            HourWeekday { hour: Some(9), day_of_week: Some("Tuesday".into()), call_count: 10 },
            HourWeekday { hour: Some(14), day_of_week: Some("Monday".into()), call_count: 40 },
            HourWeekday { hour: None, day_of_week: Some("Monday".into()), call_count: 99 },
        ];
        let out = PeakHours::from_rows(&rows);
        assert_eq!(out.hourly.len(), 24);
        assert_eq!(out.hourly[9].calls, 40);
        assert_eq!(out.peak, HourCalls { hour: "09:00".into(), calls: 40 });
        assert_eq!(out.heatmap_data.len(), 3);
        assert_eq!(out.heatmap_data[2], HeatCell { x: "14:00".into(), y: "Monday".into(), value: 40 });
    }

    #[test]
    fn peak_hours_without_rows_reports_midnight() {
        let out = PeakHours::from_rows(&[]);
        assert_eq!(out.peak, HourCalls { hour: "00:00".into(), calls: 0 });
    }

    #[test]
    fn active_calls_utilization() {
        let breakdown = vec![StatusCount { status_code: Some("Q".into()), label: None, count: 7 }];
        let out = ActiveCalls::from_rows(123, &breakdown);
        assert_eq!(out.capacity, 500);
        assert_eq!(out.utilization_pct, 24.6);
        assert_eq!(out.status_breakdown, vec![StatusTally { status: "Q".into(), count: 7 }]);
        assert!(out.history.is_empty());
    }

    #[test]
    fn call_duration_weighted_overall() {
        let row = |name: &str, avg: f64, n: i32| DurationStats {
            insurance: name.into(),
            avg_duration: Some(avg),
            min_duration: Some(1),
            max_duration: Some(500),
            call_count: n,
            median: Some(avg - 0.04),
            p90: None,
            p95: None,
        };
        let out = CallDuration::from_rows(&[row("Aetna", 120.0, 1), row("Cigna", 60.0, 3)]);
        assert_eq!(out.overall.avg, 75.0);
        assert_eq!(out.by_insurance[0].median, Some(120.0));
        assert_eq!(out.by_insurance[1].count, 3);

        assert_eq!(CallDuration::from_rows(&[]).overall.avg, 0.0);
    }

    #[test]
    fn null_fields_serialize_as_null() {
        let out = CallDuration::from_rows(&[DurationStats {
            insurance: "Unknown".into(),
            avg_duration: None,
            min_duration: None,
            max_duration: None,
            call_count: 0,
            median: None,
            p90: None,
            p95: None,
        }]);
        let v = serde_json::to_value(&out).unwrap();
        assert!(v["byInsurance"][0]["p95"].is_null());
        assert!(v["byInsurance"][0].as_object().unwrap().contains_key("median"));
    }
}

// src/routes/operations.rs
//
// Paginated call log and single-record detail.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::query_as;

use crate::error::{ApiResult, AppError};
use crate::filters::{insurance_name, like_escape, split_csv, FilterQuery, SqlParam, WhereClause, INS_EXPR};
use crate::models::{CallDetailRow, CallLogRow, Count, DetailAttribute};
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Columns of the joined record shared by the log and the detail view.
const RECORD_COLUMNS: &str = "od.ID AS call_id,
        CONVERT(VARCHAR(10), CAST(om.CallDate AS DATE), 23) AS call_date,
        CONVERT(VARCHAR(19), om.CallInTime, 126) AS call_in_time,
        RTRIM(od.IVR_Insurance) AS dnis,
        RTRIM(od.IVR_Ascend) AS ascend_ext,
        RTRIM(od.PracticeCode) AS practice,
        RTRIM(od.Status) AS status,
        CAST(od.ClaimNo AS NVARCHAR(100)) AS claim_no,
        CAST(od.NoOfClaims AS INT) AS no_of_claims,
        RTRIM(od.UniqueIndetifier) AS unique_id,
        RTRIM(om.Status) AS batch_status";

const FROM_RECORD: &str = "FROM outboundmaster om
        INNER JOIN outboundmaster_detail od ON od.OID = om.ID
        LEFT JOIN outboundCallStatus ocs ON RTRIM(od.Status) = RTRIM(ocs.CallStatus)";

// Query parsing

/// Everything arrives as text so that junk in `page`/`size` falls back to the
/// defaults instead of rejecting the request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LogsQuery {
    pub page: Option<String>,
    pub size: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub search: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub insurance: Option<String>,
    pub practice: Option<String>,
    pub dnis: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: i64,
    pub size: i64,
}

impl Paging {
    /// Page ≥ 1, size within 1..=200. Missing, non-numeric or zero values take
    /// the defaults.
    pub fn from_query(page: Option<&str>, size: Option<&str>) -> Self {
        let num = |s: Option<&str>| {
            s.and_then(|v| v.trim().parse::<i64>().ok())
                .filter(|n| *n != 0)
        };
        Self {
            page: num(page).unwrap_or(1).max(1),
            size: num(size).unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> i32 {
        i32::try_from((self.page - 1).saturating_mul(self.size)).unwrap_or(i32::MAX)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.size - 1) / self.size
    }

    /// Rows that fall on this page out of `total`.
    pub fn window_len(&self, total: i64) -> usize {
        let offset = (self.page - 1).saturating_mul(self.size);
        usize::try_from(total.saturating_sub(offset).clamp(0, self.size)).unwrap_or(0)
    }
}

/// Whitelisted sort key → SQL expression. Unknown keys sort by call date.
pub fn sort_expr(key: Option<&str>) -> &'static str {
    match key.unwrap_or_default() {
        "CallInTime" => "om.CallInTime",
        "CallID" => "od.ID",
        "Insurance" => INS_EXPR,
        "DNIS" => "od.IVR_Insurance",
        "Practice" => "od.PracticeCode",
        "Status" => "od.Status",
        "ClaimNo" => "od.ClaimNo",
        "NoOfClaims" => "od.NoOfClaims",
        "UniqueId" => "od.UniqueIndetifier",
        "BatchStatus" => "om.Status",
        _ => "om.CallDate",
    }
}

pub fn sort_dir(dir: Option<&str>) -> &'static str {
    match dir {
        Some(d) if d.eq_ignore_ascii_case("asc") => "ASC",
        _ => "DESC",
    }
}

/// ORDER BY list with `od.ID` as tiebreaker; SQL Server rejects a column
/// listed twice, so sorting by id needs none.
pub fn order_by(sort: Option<&str>, dir: Option<&str>) -> String {
    let (expr, dir) = (sort_expr(sort), sort_dir(dir));
    if expr == "od.ID" {
        format!("od.ID {dir}")
    } else {
        format!("{expr} {dir}, od.ID {dir}")
    }
}

impl LogsQuery {
    fn filter_query(&self) -> FilterQuery {
        FilterQuery {
            from: self.from.clone(),
            to: self.to.clone(),
            insurance: self.insurance.clone(),
            practice: self.practice.clone(),
            dnis: self.dnis.clone(),
            call_type: None,
        }
    }

    /// Shared filters, then status list and free-text search.
    pub fn where_clause(&self) -> Result<WhereClause, AppError> {
        let mut w = WhereClause::for_filters(&self.filter_query().parse()?);
        w.push_in("RTRIM(od.Status)", &split_csv(self.status.as_deref()));

        if let Some(term) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let like = w.push_param(SqlParam::Text(format!("%{}%", like_escape(term))));
            let exact = w.push_param(SqlParam::Text(term.to_string()));
            w.push_condition(format!(
                "(od.ClaimNo LIKE {like} \
                  OR od.UniqueIndetifier LIKE {like} \
                  OR RTRIM(od.IVR_Insurance) LIKE {like} \
                  OR od.Transcription LIKE {like} \
                  OR CAST(od.ID AS VARCHAR(20)) = {exact})"
            ));
        }
        Ok(w)
    }
}

// logs

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub rows: Vec<CallLogRow>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

fn fill_insurance(unique_id: &Option<String>) -> Option<String> {
    unique_id.as_deref().map(|u| insurance_name(u).to_string())
}

impl LogPage {
    /// Envelope for one page of `total` matching rows. Rows beyond the page
    /// window are dropped and each row gets its derived insurance.
    pub fn assemble(paging: Paging, total: i64, mut rows: Vec<CallLogRow>) -> Self {
        rows.truncate(paging.window_len(total));
        for row in &mut rows {
            row.insurance = fill_insurance(&row.unique_id);
        }
        Self {
            rows,
            total,
            page: paging.page,
            page_size: paging.size,
            total_pages: paging.total_pages(total),
        }
    }
}

/// GET /api/operations/logs
pub async fn logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> ApiResult<Json<LogPage>> {
    let paging = Paging::from_query(q.page.as_deref(), q.size.as_deref());
    let w = q.where_clause()?;

    let count_sql = format!(
        "SELECT CAST(COUNT(*) AS INT) AS n
         FROM outboundmaster om
         INNER JOIN outboundmaster_detail od ON od.OID = om.ID
         {where_sql}",
        where_sql = w.sql()
    );

    let mut pw = w.clone();
    let offset = pw.push_param(SqlParam::Int(paging.offset()));
    // size is clamped to MAX_PAGE_SIZE, so it always fits
    let fetch = pw.push_param(SqlParam::Int(paging.size as i32));
    let page_sql = format!(
        "SELECT {RECORD_COLUMNS},
                COALESCE(ocs.Description, 'Status: ' + RTRIM(od.Status)) AS status_description,
                LEFT(od.Transcription, 200) AS transcription_preview
         {FROM_RECORD}
         {where_sql}
         ORDER BY {order}
         OFFSET {offset} ROWS FETCH NEXT {fetch} ROWS ONLY",
        where_sql = pw.sql(),
        order = order_by(q.sort.as_deref(), q.dir.as_deref()),
    );

    let (count, rows) = tokio::try_join!(
        w.bind(query_as::<_, Count>(&count_sql)).fetch_one(&state.pool),
        pw.bind(query_as::<_, CallLogRow>(&page_sql)).fetch_all(&state.pool),
    )?;
    Ok(Json(LogPage::assemble(paging, i64::from(count.n), rows)))
}

// detail

#[derive(Debug, Serialize, Deserialize)]
pub struct CallDetail {
    #[serde(flatten)]
    pub record: CallDetailRow,
    #[serde(rename = "detailData")]
    pub detail_data: Vec<DetailAttribute>,
}

fn record_not_found() -> AppError {
    AppError::NotFound("Record not found".into())
}

/// Numeric id of a detail path segment.
pub fn record_id(raw: &str) -> ApiResult<i32> {
    raw.trim().parse().map_err(|_| record_not_found())
}

/// The looked-up record, or 404 when no row matched.
pub fn found<T>(row: Option<T>) -> ApiResult<T> {
    row.ok_or_else(record_not_found)
}

/// GET /api/operations/detail/:id
///
/// A non-numeric id can never match a record, so it is a 404 as well.
pub async fn detail(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult<Json<CallDetail>> {
    let id = record_id(&raw_id)?;

    let detail_sql = format!(
        "SELECT {RECORD_COLUMNS},
                COALESCE(ocs.Description, RTRIM(od.Status)) AS status_description,
                RTRIM(om.Remarks) AS batch_remarks,
                od.Transcription AS transcription
         {FROM_RECORD}
         WHERE od.ID = @p1"
    );
    let mut record = found(
        query_as::<_, CallDetailRow>(&detail_sql)
            .bind(id)
            .fetch_optional(&state.pool)
            .await?,
    )?;
    record.insurance = fill_insurance(&record.unique_id);

    let detail_data = query_as::<_, DetailAttribute>(
        "SELECT RTRIM(Name) AS prompt_id, Value AS value
         FROM outboundmaster_detail_data
         WHERE DID = @p1
         ORDER BY Name",
    )
    .bind(id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(CallDetail { record, detail_data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_clamps() {
        assert_eq!(Paging::from_query(None, None), Paging { page: 1, size: 50 });
        assert_eq!(Paging::from_query(Some("abc"), Some("lots")), Paging { page: 1, size: 50 });
        assert_eq!(Paging::from_query(Some("-3"), Some("0")), Paging { page: 1, size: 50 });
        assert_eq!(Paging::from_query(Some("4"), Some("1000")), Paging { page: 4, size: 200 });
        assert_eq!(Paging::from_query(Some("2"), Some("-5")), Paging { page: 2, size: 1 });
    }

    #[test]
    fn paging_offsets_and_pages() {
        let p = Paging { page: 3, size: 25 };
        assert_eq!(p.offset(), 50);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(25), 1);
        assert_eq!(p.total_pages(26), 2);
        assert_eq!(Paging { page: i64::MAX, size: 200 }.offset(), i32::MAX);
    }

    #[test]
    fn sort_whitelist() {
        assert_eq!(sort_expr(Some("CallID")), "od.ID");
        assert_eq!(sort_expr(Some("Insurance")), INS_EXPR);
        assert_eq!(sort_expr(Some("UniqueId")), "od.UniqueIndetifier");
        assert_eq!(sort_expr(Some("om.CallDate; DROP TABLE x")), "om.CallDate");
        assert_eq!(sort_expr(None), "om.CallDate");
        assert_eq!(sort_dir(Some("asc")), "ASC");
        assert_eq!(sort_dir(Some("ASC")), "ASC");
        assert_eq!(sort_dir(Some("up")), "DESC");
        assert_eq!(sort_dir(None), "DESC");
    }

    #[test]
    fn order_by_appends_id_tiebreaker_once() {
        assert_eq!(order_by(None, None), "om.CallDate DESC, od.ID DESC");
        assert_eq!(order_by(Some("Status"), Some("asc")), "od.Status ASC, od.ID ASC");
        assert_eq!(order_by(Some("CallID"), Some("asc")), "od.ID ASC");
    }

    #[test]
    fn status_and_search_are_parameterized() {
        let q = LogsQuery {
            practice: Some("P1".into()),
            status: Some("F, R".into()),
            search: Some(" 50%_off ".into()),
            ..Default::default()
        };
        let w = q.where_clause().unwrap();
        let sql = w.sql();
        assert!(sql.starts_with(
            "WHERE RTRIM(od.PracticeCode) IN (@p1) AND RTRIM(od.Status) IN (@p2,@p3) AND (od.ClaimNo LIKE @p4"
        ));
        assert!(sql.ends_with("CAST(od.ID AS VARCHAR(20)) = @p5)"));
        assert!(!sql.contains("off"));
        assert_eq!(
            &w.params()[1..],
            &[
                SqlParam::Text("F".into()),
                SqlParam::Text("R".into()),
                SqlParam::Text("%50[%][_]off%".into()),
                SqlParam::Text("50%_off".into()),
            ]
        );
    }

    #[test]
    fn blank_search_adds_nothing() {
        let q = LogsQuery { search: Some("   ".into()), ..Default::default() };
        assert!(q.where_clause().unwrap().is_empty());
    }

    #[test]
    fn bad_date_is_rejected() {
        let q = LogsQuery { from: Some("yesterday".into()), ..Default::default() };
        assert!(matches!(q.where_clause(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn detail_flattens_record_with_attributes() {
        let record = CallDetailRow {
            call_id: 42,
            call_date: Some("2024-06-10".into()),
            call_in_time: None,
            dnis: Some("8005551234".into()),
            ascend_ext: None,
            insurance: fill_insurance(&Some("Aetna_991".into())),
            practice: Some("P1".into()),
            status: Some("C".into()),
            status_description: Some("Completed".into()),
            claim_no: Some("CLM-1".into()),
            no_of_claims: Some(2),
            unique_id: Some("Aetna_991".into()),
            batch_status: Some("T".into()),
            batch_remarks: None,
            transcription: Some("hello".into()),
        };
        let body = serde_json::to_value(CallDetail {
            record,
            detail_data: vec![DetailAttribute { prompt_id: "DOB".into(), value: Some("1970-01-01".into()) }],
        })
        .unwrap();
        assert_eq!(body["CallID"], 42);
        assert_eq!(body["Insurance"], "Aetna");
        assert_eq!(body["AscendExt"], serde_json::Value::Null);
        assert_eq!(body["detailData"][0], serde_json::json!({"promptId": "DOB", "value": "1970-01-01"}));
    }

    fn log_row(id: i32) -> CallLogRow {
        CallLogRow {
            call_id: id,
            call_date: Some("2024-06-10".into()),
            call_in_time: None,
            dnis: None,
            ascend_ext: None,
            insurance: None,
            practice: None,
            status: Some("C".into()),
            status_description: None,
            claim_no: None,
            no_of_claims: None,
            unique_id: Some(format!("Cigna_{id}")),
            batch_status: None,
            transcription_preview: None,
        }
    }

    /// What OFFSET/FETCH returns for `paging` out of `total` ordered rows.
    fn fetch_page(paging: Paging, total: i32) -> LogPage {
        let all: Vec<CallLogRow> = (1..=total).map(log_row).collect();
        let offset = paging.offset() as usize;
        let rows = all.into_iter().skip(offset).take(paging.size as usize).collect();
        LogPage::assemble(paging, i64::from(total), rows)
    }

    #[test]
    fn second_page_holds_the_next_window() {
        let paging = Paging::from_query(Some("2"), Some("50"));
        for total in [0, 30, 50, 51, 99, 100, 101, 250] {
            let page = fetch_page(paging, total);
            let expected = (total - 50).clamp(0, 50) as usize;
            assert_eq!(page.rows.len(), expected, "total {total}");
            assert_eq!(page.total_pages, (i64::from(total) + 49) / 50, "total {total}");
            assert_eq!(page.page, 2);
            assert_eq!(page.page_size, 50);
        }
        assert_eq!(fetch_page(paging, 120).rows[0].call_id, 51);
    }

    #[test]
    fn last_page_is_partial() {
        let page = fetch_page(Paging { page: 3, size: 25 }, 60);
        assert_eq!(page.rows.len(), 10);
        assert_eq!(page.rows.first().map(|r| r.call_id), Some(51));
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.rows[0].insurance.as_deref(), Some("Cigna"));
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = fetch_page(Paging { page: 9, size: 50 }, 120);
        assert!(page.rows.is_empty());
        assert_eq!(page.total, 120);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn rows_beyond_the_window_are_dropped() {
        let rows = (1..=5).map(log_row).collect();
        let page = LogPage::assemble(Paging { page: 2, size: 3 }, 5, rows);
        assert_eq!(page.rows.len(), 2);
    }

    #[test]
    fn missing_numeric_id_is_record_not_found() {
        assert_eq!(record_id(" 42 ").unwrap(), 42);
        let err = found(None::<CallDetailRow>).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
        assert_eq!(err.public_message(), "Record not found");
        assert_eq!(found(Some(7)).unwrap(), 7);

        let err = record_id("abc").unwrap_err();
        assert_eq!(err.public_message(), "Record not found");
    }
}

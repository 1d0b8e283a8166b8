// src/filters.rs
//
// Dashboard filters: query-string parsing and the shared WHERE builder.
//
// Every query that filters batches/details aliases `outboundmaster` as `om`
// and `outboundmaster_detail` as `od`; the fragments produced here rely on
// those aliases.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use sqlx::mssql::{Mssql, MssqlArguments};
use sqlx::query::QueryAs;

use crate::error::AppError;
use crate::stats::CALL_TYPE_OUTBOUND;

/// Insurance name as stored nowhere: the `UniqueIndetifier` prefix up to the
/// first underscore, or the whole identifier when there is none.
pub const INS_EXPR: &str =
    "LEFT(od.UniqueIndetifier, CHARINDEX(N'_', od.UniqueIndetifier + N'_') - 1)";

/// Rust twin of [`INS_EXPR`].
pub fn insurance_name(unique_id: &str) -> &str {
    match unique_id.split_once('_') {
        Some((prefix, _)) => prefix,
        None => unique_id,
    }
}

// Parsing

/// Raw filter parameters as they arrive on the query string.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub insurance: Option<String>,
    pub practice: Option<String>,
    pub dnis: Option<String>,
    pub call_type: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Filters {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
    pub insurance: Vec<String>,
    pub practice: Vec<String>,
    pub dnis: Vec<String>,
    pub call_type: Vec<String>,
}

impl FilterQuery {
    pub fn parse(&self) -> Result<Filters, AppError> {
        Ok(Filters {
            from: parse_date(self.from.as_deref())?,
            to: parse_date(self.to.as_deref())?,
            insurance: split_csv(self.insurance.as_deref()),
            practice: split_csv(self.practice.as_deref()),
            dnis: split_csv(self.dnis.as_deref()),
            call_type: split_csv(self.call_type.as_deref()),
        })
    }
}

/// Absent or blank → no bound. A bare date means midnight of that day.
pub fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDateTime>, AppError> {
    let s = match raw.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(None),
    };

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d.and_hms_opt(0, 0, 0));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.naive_utc()));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map(Some)
        .map_err(|_| AppError::BadRequest(format!("invalid date '{s}'")))
}

/// Comma-split, trimmed, empties dropped.
pub fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Escape LIKE metacharacters so the value matches literally.
pub fn like_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '[' | '%' | '_' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

// WHERE builder

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i32),
}

/// Parameterized WHERE fragment. Values never reach the SQL text; each one is
/// a positional `@pN` placeholder bound in order by [`WhereClause::bind`].
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Date range, insurance, practice, DNIS and call-type restrictions.
    pub fn for_filters(f: &Filters) -> Self {
        let mut w = Self::dates_only("om.CallDate", f);

        if !f.insurance.is_empty() {
            let ors: Vec<String> = f
                .insurance
                .iter()
                .map(|v| {
                    let p = w.push_param(SqlParam::Text(like_escape(v)));
                    format!("od.UniqueIndetifier LIKE {p} + N'[_]%'")
                })
                .collect();
            w.push_condition(format!("({})", ors.join(" OR ")));
        }
        w.push_in("RTRIM(od.PracticeCode)", &f.practice);
        w.push_in("RTRIM(od.IVR_Insurance)", &f.dnis);
        w.push_in(&format!("N'{CALL_TYPE_OUTBOUND}'"), &f.call_type);
        w
    }

    /// Only the date bounds, against an arbitrary datetime column.
    pub fn dates_only(column: &str, f: &Filters) -> Self {
        let mut w = Self::new();
        if let Some(from) = f.from {
            let p = w.push_param(SqlParam::Text(sql_datetime(from)));
            w.push_condition(format!("{column} >= CONVERT(DATETIME, {p}, 126)"));
        }
        if let Some(to) = f.to {
            let p = w.push_param(SqlParam::Text(sql_datetime(to)));
            w.push_condition(format!("{column} <= CONVERT(DATETIME, {p}, 126)"));
        }
        w
    }

    /// Register a value and return its placeholder.
    pub fn push_param(&mut self, value: SqlParam) -> String {
        self.params.push(value);
        format!("@p{}", self.params.len())
    }

    /// Add a condition built only from constants and placeholders.
    pub fn push_condition(&mut self, condition: impl Into<String>) {
        self.conditions.push(condition.into());
    }

    /// `expr IN (@pN, ...)`; no-op for an empty list.
    pub fn push_in(&mut self, expr: &str, values: &[String]) {
        if values.is_empty() {
            return;
        }
        let names: Vec<String> = values
            .iter()
            .map(|v| self.push_param(SqlParam::Text(v.clone())))
            .collect();
        self.push_condition(format!("{expr} IN ({})", names.join(",")));
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `""` or `WHERE a AND b ...`.
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// `""` or `AND a AND b ...`, for appending to a WHERE the caller owns.
    pub fn and_sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("AND {}", self.conditions.join(" AND "))
        }
    }

    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    pub fn bind<'q, O>(
        &self,
        mut q: QueryAs<'q, Mssql, O, MssqlArguments>,
    ) -> QueryAs<'q, Mssql, O, MssqlArguments> {
        for p in &self.params {
            q = match p {
                SqlParam::Text(s) => q.bind(s.clone()),
                SqlParam::Int(i) => q.bind(*i),
            };
        }
        q
    }
}

fn sql_datetime(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

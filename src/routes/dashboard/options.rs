// src/routes/dashboard/options.rs
//
// Distinct values for the filter dropdowns.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::query_as;

use super::FROM_BATCH_DETAIL;
use crate::error::ApiResult;
use crate::filters::INS_EXPR;
use crate::models::TextValue;
use crate::stats::{self, CALL_TYPE_OUTBOUND};
use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOptions {
    pub insurances: Vec<String>,
    pub practices: Vec<String>,
    pub dnis: Vec<String>,
    pub call_types: Vec<String>,
}

impl FilterOptions {
    pub fn from_rows(insurances: Vec<TextValue>, practices: Vec<TextValue>, dnis: Vec<TextValue>) -> Self {
        Self {
            insurances: non_empty(insurances),
            practices: non_empty(practices),
            dnis: non_empty(dnis),
            call_types: vec![CALL_TYPE_OUTBOUND.to_string()],
        }
    }
}

fn non_empty(rows: Vec<TextValue>) -> Vec<String> {
    rows.into_iter()
        .filter_map(|r| r.val)
        .filter(|v| !v.trim().is_empty())
        .collect()
}

/// GET /api/dashboard/filter-options
pub async fn filter_options(State(state): State<AppState>) -> ApiResult<Json<FilterOptions>> {
    let insurance_sql = format!(
        "SELECT TOP {top} {INS_EXPR} AS val
         {FROM_BATCH_DETAIL}
         WHERE od.UniqueIndetifier IS NOT NULL
         GROUP BY {INS_EXPR}
         ORDER BY COUNT(*) DESC",
        top = stats::TOP_FILTER_INSURANCES
    );
    let practice_sql = "SELECT DISTINCT RTRIM(od.PracticeCode) AS val
         FROM outboundmaster_detail od
         WHERE od.PracticeCode IS NOT NULL AND od.PracticeCode <> ''
         ORDER BY val";
    let dnis_sql = "SELECT DISTINCT RTRIM(od.IVR_Insurance) AS val
         FROM outboundmaster_detail od
         WHERE od.IVR_Insurance IS NOT NULL AND od.IVR_Insurance <> ''
         ORDER BY val";

    let (insurances, practices, dnis) = tokio::try_join!(
        query_as::<_, TextValue>(&insurance_sql).fetch_all(&state.pool),
        query_as::<_, TextValue>(practice_sql).fetch_all(&state.pool),
        query_as::<_, TextValue>(dnis_sql).fetch_all(&state.pool),
    )?;
    Ok(Json(FilterOptions::from_rows(insurances, practices, dnis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tv(v: Option<&str>) -> TextValue {
        TextValue { val: v.map(Into::into) }
    }

    #[test]
    fn empty_values_are_dropped() {
        let out = FilterOptions::from_rows(
            vec![tv(Some("Aetna")), tv(Some("")), tv(None), tv(Some("Cigna"))],
            vec![tv(Some("P1")), tv(Some("  "))],
            vec![],
        );
        assert_eq!(out.insurances, vec!["Aetna", "Cigna"]);
        assert_eq!(out.practices, vec!["P1"]);
        assert!(out.dnis.is_empty());
    }

    #[test]
    fn call_types_are_fixed() {
        let out = FilterOptions::from_rows(vec![], vec![], vec![]);
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["callTypes"], serde_json::json!(["Outbound"]));
    }
}

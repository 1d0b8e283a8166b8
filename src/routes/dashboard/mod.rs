// src/routes/dashboard/mod.rs
//
// GET /api/dashboard/<metric>. Sections mirror the dashboard layout.

use serde::{Deserialize, Serialize};

pub mod infrastructure;
pub mod options;
pub mod telephony;
pub mod workflow;

/// Batch/detail join every filtered metric starts from.
pub(crate) const FROM_BATCH_DETAIL: &str =
    "FROM outboundmaster om INNER JOIN outboundmaster_detail od ON od.OID = om.ID";

/// Status descriptions; detail status codes are padded, so both sides are trimmed.
pub(crate) const JOIN_STATUS: &str =
    "LEFT JOIN outboundCallStatus ocs ON RTRIM(od.Status) = RTRIM(ocs.CallStatus)";

/// Day bucket of a batch as `YYYY-MM-DD`.
pub(crate) const CALL_DAY: &str = "CONVERT(VARCHAR(10), CAST(om.CallDate AS DATE), 23)";

/// One point of a daily series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint<T> {
    pub date: String,
    pub value: T,
}

/// Sum a slice of INT aggregates without overflowing i32.
pub(crate) fn sum_i64<T>(rows: &[T], f: impl Fn(&T) -> i32) -> i64 {
    rows.iter().map(|r| i64::from(f(r))).sum()
}

/// Merge rows that share a label (two status codes can carry the same
/// description), keeping first-seen order, then sort by count descending.
pub(crate) fn merge_by_label(pairs: impl IntoIterator<Item = (String, i64)>) -> Vec<(String, i64)> {
    let mut merged: Vec<(String, i64)> = Vec::new();
    for (label, count) in pairs {
        match merged.iter_mut().find(|(l, _)| *l == label) {
            Some((_, c)) => *c += count,
            None => merged.push((label, count)),
        }
    }
    // stable: ties keep first-seen order
    merged.sort_by(|a, b| b.1.cmp(&a.1));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_by_label_sums_and_sorts() {
        let merged = merge_by_label(vec![
            ("Fail".to_string(), 3),
            ("Redial".to_string(), 5),
            ("Fail".to_string(), 4),
            ("Empty".to_string(), 5),
        ]);
        assert_eq!(
            merged,
            vec![
                ("Fail".to_string(), 7),
                ("Redial".to_string(), 5),
                ("Empty".to_string(), 5),
            ]
        );
    }
}

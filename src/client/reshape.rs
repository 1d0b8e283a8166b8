// src/client/reshape.rs
//
// Payload → chart data conversions shared by every consumer of the API.

use std::collections::BTreeMap;

use serde::Serialize;

use super::ClientError;
use crate::models::CallLogRow;
use crate::routes::dashboard::infrastructure::ErrorType;
use crate::routes::dashboard::telephony::HeatCell;
use crate::stats::round_to;

/// Bars shown per bar chart.
pub const BAR_LIMIT: usize = 8;

pub const WEEKDAYS: [&str; 7] = ["MON", "TUE", "WED", "THU", "FRI", "SAT", "SUN"];

/// Position in [`WEEKDAYS`] of a day name ("Monday", "mon", ...).
fn weekday_index(day: &str) -> Option<usize> {
    let prefix = day.trim().get(..3)?;
    WEEKDAYS.iter().position(|abbr| prefix.eq_ignore_ascii_case(abbr))
}

// Heatmap

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatPoint {
    pub x: String,
    pub y: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySeries {
    pub id: &'static str,
    pub data: Vec<HeatPoint>,
}

/// Pivot `{x: hour, y: weekday, value}` cells into one series per weekday,
/// MON first, each sorted by hour. Duplicate cells are summed; days without
/// data and unrecognised day names are left out.
pub fn heatmap_series(cells: &[HeatCell]) -> Vec<DaySeries> {
    let mut by_day: BTreeMap<usize, BTreeMap<String, i64>> = BTreeMap::new();
    for cell in cells {
        let Some(idx) = weekday_index(&cell.y) else { continue };
        *by_day.entry(idx).or_default().entry(cell.x.clone()).or_insert(0) += cell.value;
    }
    by_day
        .into_iter()
        .map(|(idx, hours)| DaySeries {
            id: WEEKDAYS[idx],
            data: hours.into_iter().map(|(x, y)| HeatPoint { x, y }).collect(),
        })
        .collect()
}

// Bars and shares

/// First [`BAR_LIMIT`] items.
pub fn bar_data<T: Clone>(items: &[T]) -> Vec<T> {
    items.iter().take(BAR_LIMIT).cloned().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorShare {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: i64,
    pub pct: f64,
}

/// Each error type's share of all errors, one decimal.
pub fn error_shares(breakdown: &[ErrorType]) -> Vec<ErrorShare> {
    let total: i64 = breakdown.iter().map(|e| e.count).sum();
    breakdown
        .iter()
        .map(|e| ErrorShare {
            kind: e.kind.clone(),
            count: e.count,
            pct: if total == 0 { 0.0 } else { round_to(e.count as f64 / total as f64 * 100.0, 1) },
        })
        .collect()
}

// Operations table

/// Display label of a detail status code.
pub fn status_label(code: &str) -> Option<&'static str> {
    match code.trim() {
        "S" | "C" => Some("Completed"),
        "D" => Some("Dropped"),
        "F" | "R" | "E" | "G" => Some("Failed"),
        "I" | "Q" | "N" => Some("In Progress"),
        "T" => Some("Transferred"),
        _ => None,
    }
}

/// `CALL-0000042`.
pub fn call_display_id(id: i64) -> String {
    format!("CALL-{id:07}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRowView {
    pub id: String,
    pub timestamp: String,
    pub insurance: String,
    pub practice: String,
    pub dnis: String,
    pub status: String,
    pub last_step: String,
    pub attempts: i32,
    pub errors: u8,
    pub claim_id: Option<String>,
    pub unique_id: Option<String>,
    pub transcription_preview: Option<String>,
}

fn or_dash(v: &Option<String>) -> String {
    v.as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or("-")
        .to_string()
}

/// Row as the operations table shows it.
pub fn log_row_view(row: &CallLogRow) -> LogRowView {
    let code = row.status.as_deref().unwrap_or_default();
    let status = status_label(code)
        .map(str::to_string)
        .or_else(|| row.status_description.clone())
        .or_else(|| row.status.clone().filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "Unknown".to_string());
    LogRowView {
        id: call_display_id(row.call_id.into()),
        timestamp: row
            .call_in_time
            .clone()
            .or_else(|| row.call_date.clone())
            .unwrap_or_else(|| "-".to_string()),
        insurance: or_dash(&row.insurance),
        practice: or_dash(&row.practice),
        dnis: or_dash(&row.dnis),
        status,
        last_step: or_dash(&row.status_description),
        attempts: row.no_of_claims.filter(|n| *n > 0).unwrap_or(1),
        errors: u8::from(matches!(code, "F" | "E" | "G")),
        claim_id: row.claim_no.clone().filter(|c| !c.is_empty()),
        unique_id: row.unique_id.clone(),
        transcription_preview: row.transcription_preview.clone(),
    }
}

/// Columns of the operations table, in display order.
pub const LOG_CSV_HEADERS: [&str; 10] = [
    "Call ID",
    "Timestamp",
    "Insurance",
    "Practice",
    "DNIS",
    "Status",
    "Last Step",
    "Attempts",
    "Errors",
    "Claim ID",
];

/// Operations table rows as CSV, header first. Fields holding a delimiter,
/// quote or line break are quoted with inner quotes doubled.
pub fn export_logs_csv(rows: &[LogRowView]) -> Result<String, ClientError> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(LOG_CSV_HEADERS)?;
    for row in rows {
        let attempts = row.attempts.to_string();
        let errors = row.errors.to_string();
        writer.write_record([
            row.id.as_str(),
            row.timestamp.as_str(),
            row.insurance.as_str(),
            row.practice.as_str(),
            row.dnis.as_str(),
            row.status.as_str(),
            row.last_step.as_str(),
            attempts.as_str(),
            errors.as_str(),
            row.claim_id.as_deref().unwrap_or_default(),
        ])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ClientError::Export(e.error().to_string()))?;
    String::from_utf8(bytes).map_err(|e| ClientError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(x: &str, y: &str, value: i64) -> HeatCell {
        HeatCell { x: x.into(), y: y.into(), value }
    }

    #[test]
    fn heatmap_pivots_by_weekday_then_hour() {
        let series = heatmap_series(&[
            cell("10:00", "Tuesday", 4),
            cell("09:00", "Monday", 2),
            cell("08:00", "Tuesday", 1),
            cell("10:00", "Tuesday", 3),
            cell("09:00", "Funday", 9),
        ]);
        assert_eq!(
            series,
            vec![
                DaySeries { id: "MON", data: vec![HeatPoint { x: "09:00".into(), y: 2 }] },
                DaySeries {
                    id: "TUE",
                    data: vec![
                        HeatPoint { x: "08:00".into(), y: 1 },
                        HeatPoint { x: "10:00".into(), y: 7 },
                    ],
                },
            ]
        );
    }

    #[test]
    fn heatmap_of_nothing_is_empty() {
        assert!(heatmap_series(&[]).is_empty());
    }

    #[test]
    fn bars_are_capped() {
        let items: Vec<i32> = (0..20).collect();
        assert_eq!(bar_data(&items), (0..8).collect::<Vec<_>>());
        assert_eq!(bar_data(&items[..3]), vec![0, 1, 2]);
    }

    #[test]
    fn error_shares_sum_to_about_100() {
        let shares = error_shares(&[
            ErrorType { kind: "Fail".into(), count: 2 },
            ErrorType { kind: "Empty".into(), count: 1 },
        ]);
        assert_eq!(shares[0].pct, 66.7);
        assert_eq!(shares[1].pct, 33.3);
        assert!(error_shares(&[ErrorType { kind: "x".into(), count: 0 }])[0].pct == 0.0);
    }

    #[test]
    fn labels_and_ids() {
        assert_eq!(status_label("C"), Some("Completed"));
        assert_eq!(status_label("R "), Some("Failed"));
        assert_eq!(status_label("N"), Some("In Progress"));
        assert_eq!(status_label("Z"), None);
        assert_eq!(call_display_id(42), "CALL-0000042");
        assert_eq!(call_display_id(123456789), "CALL-123456789");
    }

    #[test]
    fn log_rows_for_display() {
        let row = CallLogRow {
            call_id: 42,
            call_date: Some("2024-06-10".into()),
            call_in_time: None,
            dnis: Some("8005550101".into()),
            ascend_ext: None,
            insurance: Some("Aetna".into()),
            practice: None,
            status: Some("Z".into()),
            status_description: Some("Status: Z".into()),
            claim_no: Some(String::new()),
            no_of_claims: Some(0),
            unique_id: Some("Aetna_1".into()),
            batch_status: Some("T".into()),
            transcription_preview: None,
        };
        let v = log_row_view(&row);
        assert_eq!(v.id, "CALL-0000042");
        assert_eq!(v.timestamp, "2024-06-10");
        assert_eq!(v.practice, "-");
        assert_eq!(v.status, "Status: Z");
        assert_eq!(v.attempts, 1);
        assert_eq!(v.errors, 0);
        assert_eq!(v.claim_id, None);

        let failed = CallLogRow { status: Some("G".into()), ..row };
        let v = log_row_view(&failed);
        assert_eq!(v.status, "Failed");
        assert_eq!(v.errors, 1);
    }

    fn view(practice: &str, last_step: &str) -> LogRowView {
        LogRowView {
            id: call_display_id(7),
            timestamp: "2024-06-10T09:15:00".into(),
            insurance: "Aetna".into(),
            practice: practice.into(),
            dnis: "8005550101".into(),
            status: "Failed".into(),
            last_step: last_step.into(),
            attempts: 2,
            errors: 1,
            claim_id: None,
            unique_id: None,
            transcription_preview: None,
        }
    }

    #[test]
    fn csv_export_quotes_awkward_fields() {
        let csv = export_logs_csv(&[
            view("Smith, Jones & Co", "Said \"no\""),
            view("Unit A", "line one\nline two"),
        ])
        .unwrap();
        assert_eq!(
            csv,
            "Call ID,Timestamp,Insurance,Practice,DNIS,Status,Last Step,Attempts,Errors,Claim ID\n\
             CALL-0000007,2024-06-10T09:15:00,Aetna,\"Smith, Jones & Co\",8005550101,Failed,\"Said \"\"no\"\"\",2,1,\n\
             CALL-0000007,2024-06-10T09:15:00,Aetna,Unit A,8005550101,Failed,\"line one\nline two\",2,1,\n"
        );
    }

    #[test]
    fn csv_export_of_nothing_is_the_header() {
        assert_eq!(
            export_logs_csv(&[]).unwrap(),
            "Call ID,Timestamp,Insurance,Practice,DNIS,Status,Last Step,Attempts,Errors,Claim ID\n"
        );
    }
}

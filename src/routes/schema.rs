// src/routes/schema.rs
//
// Read-only database explorer used while mapping tables to metrics. Mounted
// only when EXPOSE_SCHEMA is on.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{query_as, FromRow, Row};

use crate::error::{ApiResult, AppError};
use crate::filters::like_escape;
use crate::models::{ColumnInfo, ColumnMatch, TableInfo};
use crate::AppState;

pub const DEFAULT_PREVIEW_ROWS: i32 = 50;
pub const MAX_PREVIEW_ROWS: i32 = 500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tables", get(list_tables))
        .route("/tables/:name", get(table_columns))
        .route("/preview/:name", get(preview))
        .route("/search", get(search))
}

/// Keep only `[A-Za-z0-9_.]`.
pub fn sanitize_table_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect()
}

/// `dbo.calls` → `[dbo].[calls]`.
fn quote_table(name: &str) -> String {
    name.split('.')
        .filter(|p| !p.is_empty())
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_ident(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

/// Render any column as text so every preview cell decodes the same way.
fn text_projection(column: &str, type_name: &str) -> String {
    let col = quote_ident(column);
    let expr = match type_name {
        "binary" | "varbinary" | "image" | "timestamp" | "rowversion" => {
            format!("CONVERT(NVARCHAR(4000), CONVERT(VARBINARY(2000), {col}), 1)")
        }
        "geography" | "geometry" | "hierarchyid" => format!("{col}.ToString()"),
        _ => format!("CONVERT(NVARCHAR(4000), {col})"),
    };
    format!("{expr} AS {col}")
}

// tables

/// GET /api/schema/tables
pub async fn list_tables(State(state): State<AppState>) -> ApiResult<Json<Vec<TableInfo>>> {
    let rows = query_as::<_, TableInfo>(
        "SELECT s.name AS [schema],
                t.name AS [table],
                CAST(SUM(p.rows) AS BIGINT) AS row_count
         FROM sys.tables t
         INNER JOIN sys.schemas s ON t.schema_id = s.schema_id
         INNER JOIN sys.partitions p ON t.object_id = p.object_id AND p.index_id IN (0, 1)
         GROUP BY s.name, t.name
         ORDER BY row_count DESC",
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct TableColumns {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
}

/// GET /api/schema/tables/:name
///
/// An unknown table yields an empty column list.
pub async fn table_columns(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<TableColumns>> {
    let columns = query_as::<_, ColumnInfo>(
        "SELECT c.name AS [column],
                ty.name AS type_name,
                CAST(c.max_length AS INT) AS max_length,
                c.is_nullable AS nullable,
                c.is_identity AS [identity],
                CAST(CASE WHEN pk.column_id IS NOT NULL THEN 1 ELSE 0 END AS BIT) AS primary_key
         FROM sys.columns c
         INNER JOIN sys.types ty ON c.user_type_id = ty.user_type_id
         LEFT JOIN (
            SELECT ic.object_id, ic.column_id
            FROM sys.index_columns ic
            INNER JOIN sys.indexes i ON ic.object_id = i.object_id AND ic.index_id = i.index_id
            WHERE i.is_primary_key = 1
         ) pk ON c.object_id = pk.object_id AND c.column_id = pk.column_id
         WHERE c.object_id = OBJECT_ID(@p1)
         ORDER BY c.column_id",
    )
    .bind(sanitize_table_name(&name))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(TableColumns { table: name, columns }))
}

// preview

#[derive(Debug, Default, Deserialize)]
pub struct PreviewQuery {
    pub limit: Option<String>,
}

/// 1..=500, default 50; zero or junk means default.
pub fn preview_limit(raw: Option<&str>) -> i32 {
    raw.and_then(|s| s.trim().parse::<i32>().ok())
        .filter(|n| *n != 0)
        .unwrap_or(DEFAULT_PREVIEW_ROWS)
        .clamp(1, MAX_PREVIEW_ROWS)
}

#[derive(Debug, FromRow)]
struct PreviewColumn {
    name: String,
    type_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePreview {
    pub table: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// GET /api/schema/preview/:name?limit=
pub async fn preview(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(q): Query<PreviewQuery>,
) -> ApiResult<Json<TablePreview>> {
    let table = sanitize_table_name(&name);
    let limit = preview_limit(q.limit.as_deref());

    // Only base tables that actually exist; this also resolves the columns.
    let columns = query_as::<_, PreviewColumn>(
        "SELECT c.name AS name, ty.name AS type_name
         FROM sys.columns c
         INNER JOIN sys.types ty ON c.user_type_id = ty.user_type_id
         WHERE c.object_id = OBJECT_ID(@p1, N'U')
         ORDER BY c.column_id",
    )
    .bind(table.clone())
    .fetch_all(&state.pool)
    .await?;
    if columns.is_empty() {
        return Err(AppError::NotFound(format!("table '{table}' not found")));
    }

    let projection: Vec<String> = columns
        .iter()
        .map(|c| text_projection(&c.name, &c.type_name))
        .collect();
    let sql = format!(
        "SELECT TOP (@p1) {} FROM {}",
        projection.join(", "),
        quote_table(&table)
    );
    let raw_rows = sqlx::query(&sql).bind(limit).fetch_all(&state.pool).await?;

    let mut rows = Vec::with_capacity(raw_rows.len());
    for raw in &raw_rows {
        let mut obj = Map::new();
        for (i, c) in columns.iter().enumerate() {
            let cell: Option<String> = raw.try_get(i)?;
            obj.insert(c.name.clone(), cell.map_or(Value::Null, Value::String));
        }
        rows.push(obj);
    }

    Ok(Json(TablePreview {
        table,
        row_count: rows.len(),
        columns: columns.into_iter().map(|c| c.name).collect(),
        rows,
    }))
}

// search

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

/// GET /api/schema/search?q=
pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<Vec<ColumnMatch>>> {
    let term = match q.q.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(Json(Vec::new())),
    };
    let rows = query_as::<_, ColumnMatch>(
        "SELECT s.name AS [schema],
                t.name AS [table],
                c.name AS [column],
                ty.name AS type_name
         FROM sys.columns c
         INNER JOIN sys.tables t ON c.object_id = t.object_id
         INNER JOIN sys.schemas s ON t.schema_id = s.schema_id
         INNER JOIN sys.types ty ON c.user_type_id = ty.user_type_id
         WHERE c.name LIKE @p1 OR t.name LIKE @p1
         ORDER BY t.name, c.column_id",
    )
    .bind(format!("%{}%", like_escape(term)))
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows))
}

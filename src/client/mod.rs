// src/client/mod.rs
//
// Typed client for the portal API.
//
// [`ApiClient`] talks HTTP, [`Metric`] knows every dashboard endpoint and how
// fresh its data has to be, [`QueryCache`] keeps responses per
// (endpoint, filters) and [`reshape`] turns payloads into chart-ready data.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

use crate::filters::Filters;
use crate::routes::dashboard::options::FilterOptions;
use crate::routes::operations::{CallDetail, LogPage};

pub mod cache;
pub mod reshape;

pub use cache::{CacheKey, Clock, QueryCache, SystemClock};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(Arc<reqwest::Error>),

    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(Arc<serde_json::Error>),

    #[error("csv export failed: {0}")]
    Export(String),
}

impl From<csv::Error> for ClientError {
    fn from(e: csv::Error) -> Self {
        Self::Export(e.to_string())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(Arc::new(e))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(Arc::new(e))
    }
}

// Metrics and refresh policy

/// How long a cached response counts as fresh, and whether it is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub stale_after: Duration,
    pub poll_every: Option<Duration>,
}

pub const LIVE_POLL: Duration = Duration::from_secs(30);
pub const DASHBOARD_STALE: Duration = Duration::from_secs(60);
pub const FILTER_OPTIONS_STALE: Duration = Duration::from_secs(5 * 60);

pub const FILTER_OPTIONS_POLICY: RefreshPolicy = RefreshPolicy {
    stale_after: FILTER_OPTIONS_STALE,
    poll_every: None,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    TotalCalls,
    ConnectionRate,
    DropRate,
    PeakHours,
    ActiveCalls,
    CallDuration,
    TopDropped,
    InitiationSource,
    ClaimCompletion,
    ReattemptFunnel,
    FirstAttemptRate,
    IncompleteSteps,
    TranscriptionQueue,
    TranscriptionTime,
    TranscriptionApiUsage,
    ConcurrentPeaks,
    ErrorRate,
}

impl Metric {
    pub const ALL: [Metric; 17] = [
        Metric::TotalCalls,
        Metric::ConnectionRate,
        Metric::DropRate,
        Metric::PeakHours,
        Metric::ActiveCalls,
        Metric::CallDuration,
        Metric::TopDropped,
        Metric::InitiationSource,
        Metric::ClaimCompletion,
        Metric::ReattemptFunnel,
        Metric::FirstAttemptRate,
        Metric::IncompleteSteps,
        Metric::TranscriptionQueue,
        Metric::TranscriptionTime,
        Metric::TranscriptionApiUsage,
        Metric::ConcurrentPeaks,
        Metric::ErrorRate,
    ];

    /// Path segment under `/api/dashboard/`.
    pub fn path(self) -> &'static str {
        match self {
            Metric::TotalCalls => "total-calls",
            Metric::ConnectionRate => "connection-rate",
            Metric::DropRate => "drop-rate",
            Metric::PeakHours => "peak-hours",
            Metric::ActiveCalls => "active-calls",
            Metric::CallDuration => "call-duration",
            Metric::TopDropped => "top-dropped",
            Metric::InitiationSource => "initiation-source",
            Metric::ClaimCompletion => "claim-completion",
            Metric::ReattemptFunnel => "reattempt-funnel",
            Metric::FirstAttemptRate => "first-attempt-rate",
            Metric::IncompleteSteps => "incomplete-steps",
            Metric::TranscriptionQueue => "transcription-queue",
            Metric::TranscriptionTime => "transcription-time",
            Metric::TranscriptionApiUsage => "transcription-api-usage",
            Metric::ConcurrentPeaks => "concurrent-peaks",
            Metric::ErrorRate => "error-rate",
        }
    }

    /// Live snapshots ignore filters and are polled.
    pub fn is_live(self) -> bool {
        matches!(self, Metric::ActiveCalls | Metric::TranscriptionQueue)
    }

    pub fn policy(self) -> RefreshPolicy {
        if self.is_live() {
            RefreshPolicy { stale_after: Duration::ZERO, poll_every: Some(LIVE_POLL) }
        } else {
            RefreshPolicy { stale_after: DASHBOARD_STALE, poll_every: None }
        }
    }
}

// Query strings

fn iso(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Query pairs for a filter set, in a fixed order; empty filters are omitted.
pub fn filter_pairs(f: &Filters) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    if let Some(from) = f.from {
        pairs.push(("from", iso(from)));
    }
    if let Some(to) = f.to {
        pairs.push(("to", iso(to)));
    }
    for (key, values) in [
        ("insurance", &f.insurance),
        ("practice", &f.practice),
        ("dnis", &f.dnis),
        ("callType", &f.call_type),
    ] {
        if !values.is_empty() {
            pairs.push((key, values.join(",")));
        }
    }
    pairs
}

/// Percent-encoded `a=b&c=d`.
pub fn encode_pairs(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Operations log request.
#[derive(Debug, Clone, Default)]
pub struct LogsRequest {
    pub page: u32,
    pub size: u32,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub search: Option<String>,
    pub status: Vec<String>,
    pub filters: Filters,
}

impl LogsRequest {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.max(1).to_string()), ("size", self.size.to_string())];
        if let Some(sort) = &self.sort {
            pairs.push(("sort", sort.clone()));
        }
        if let Some(dir) = &self.dir {
            pairs.push(("dir", dir.clone()));
        }
        if let Some(search) = self.search.as_ref().filter(|s| !s.is_empty()) {
            pairs.push(("search", search.clone()));
        }
        if !self.status.is_empty() {
            pairs.push(("status", self.status.join(",")));
        }
        pairs.extend(filter_pairs(&self.filters));
        pairs
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    pub db: String,
    pub timestamp: Option<String>,
    pub error: Option<String>,
}

// HTTP

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `http://localhost:5000/api`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn url(&self, path: &str, pairs: &[(&str, String)]) -> String {
        if pairs.is_empty() {
            format!("{}/{path}", self.base_url)
        } else {
            format!("{}/{path}?{}", self.base_url, encode_pairs(pairs))
        }
    }

    async fn get_value(&self, url: &str) -> Result<Value, ClientError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            // error bodies are {"error": "..."}; fall back to the reason phrase
            let message = resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            return Err(ClientError::Status { status: status.as_u16(), message });
        }
        Ok(resp.json::<Value>().await?)
    }

    /// Raw metric payload. Live metrics are requested without filters.
    pub async fn metric_value(&self, metric: Metric, filters: &Filters) -> Result<Value, ClientError> {
        let pairs = if metric.is_live() { Vec::new() } else { filter_pairs(filters) };
        self.get_value(&self.url(&format!("dashboard/{}", metric.path()), &pairs)).await
    }

    pub async fn fetch_metric<T: DeserializeOwned>(
        &self,
        metric: Metric,
        filters: &Filters,
    ) -> Result<T, ClientError> {
        Ok(serde_json::from_value(self.metric_value(metric, filters).await?)?)
    }

    pub async fn fetch_filter_options(&self) -> Result<FilterOptions, ClientError> {
        let v = self.get_value(&self.url("dashboard/filter-options", &[])).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn fetch_logs(&self, req: &LogsRequest) -> Result<LogPage, ClientError> {
        let v = self.get_value(&self.url("operations/logs", &req.query_pairs())).await?;
        Ok(serde_json::from_value(v)?)
    }

    pub async fn fetch_detail(&self, id: i32) -> Result<CallDetail, ClientError> {
        let v = self.get_value(&self.url(&format!("operations/detail/{id}"), &[])).await?;
        Ok(serde_json::from_value(v)?)
    }

    /// Health is answered with a body even on failure, so non-2xx is decoded too.
    pub async fn health(&self) -> Result<Health, ClientError> {
        let resp = self.http.get(self.url("health", &[])).send().await?;
        Ok(resp.json::<Health>().await?)
    }
}

// Cached access

/// [`ApiClient`] behind a [`QueryCache`], applying each metric's policy.
#[derive(Clone)]
pub struct DashboardClient {
    api: ApiClient,
    cache: QueryCache,
}

impl DashboardClient {
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    fn key(metric: Metric, filters: &Filters) -> CacheKey {
        let query = if metric.is_live() { String::new() } else { encode_pairs(&filter_pairs(filters)) };
        CacheKey::new(metric.path(), query)
    }

    /// Cached metric; stale entries are served while a refetch runs.
    pub async fn metric<T: DeserializeOwned>(&self, metric: Metric, filters: &Filters) -> Result<T, ClientError> {
        let api = self.api.clone();
        let owned = filters.clone();
        let value = self
            .cache
            .get(Self::key(metric, filters), metric.policy().stale_after, move || async move {
                api.metric_value(metric, &owned).await
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch now (joining a fetch already in flight) and update the cache.
    pub async fn refresh<T: DeserializeOwned>(&self, metric: Metric, filters: &Filters) -> Result<T, ClientError> {
        let api = self.api.clone();
        let owned = filters.clone();
        let value = self
            .cache
            .refresh(Self::key(metric, filters), move || async move {
                api.metric_value(metric, &owned).await
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn filter_options(&self) -> Result<FilterOptions, ClientError> {
        let api = self.api.clone();
        let value = self
            .cache
            .get(
                CacheKey::new("filter-options", String::new()),
                FILTER_OPTIONS_POLICY.stale_after,
                move || async move { Ok(serde_json::to_value(api.fetch_filter_options().await?)?) },
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Drop every cached response for a metric, whatever the filters.
    pub async fn invalidate(&self, metric: Metric) {
        self.cache.invalidate(metric.path()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn filters() -> Filters {
        crate::filters::FilterQuery {
            from: Some("2024-06-01".into()),
            to: Some("2024-06-30T23:59:59Z".into()),
            insurance: Some("Blue Cross,Aetna".into()),
            call_type: Some("Outbound".into()),
            ..Default::default()
        }
        .parse()
        .unwrap()
    }

    #[test]
    fn every_metric_has_a_distinct_path() {
        let paths: HashSet<_> = Metric::ALL.iter().map(|m| m.path()).collect();
        assert_eq!(paths.len(), 17);
    }

    #[test]
    fn live_metrics_poll_without_staleness() {
        for m in Metric::ALL {
            let p = m.policy();
            if m.is_live() {
                assert_eq!(p, RefreshPolicy { stale_after: Duration::ZERO, poll_every: Some(LIVE_POLL) });
            } else {
                assert_eq!(p.stale_after, Duration::from_secs(60));
                assert_eq!(p.poll_every, None);
            }
        }
        assert_eq!(FILTER_OPTIONS_POLICY.stale_after, Duration::from_secs(300));
    }

    #[test]
    fn filters_encode_as_the_server_parses_them() {
        let q = encode_pairs(&filter_pairs(&filters()));
        assert_eq!(
            q,
            "from=2024-06-01T00%3A00%3A00.000Z&to=2024-06-30T23%3A59%3A59.000Z\
             &insurance=Blue%20Cross%2CAetna&callType=Outbound"
        );

        // and back
        let parsed = crate::filters::FilterQuery {
            from: Some("2024-06-01T00:00:00.000Z".into()),
            insurance: Some("Blue Cross,Aetna".into()),
            ..Default::default()
        }
        .parse()
        .unwrap();
        assert_eq!(parsed.from, filters().from);
        assert_eq!(parsed.insurance, filters().insurance);
    }

    #[test]
    fn urls_join_cleanly() {
        let api = ApiClient::with_client(reqwest::Client::new(), "http://localhost:5000/api/");
        assert_eq!(api.url("health", &[]), "http://localhost:5000/api/health");
        assert_eq!(
            api.url("operations/logs", &[("page", "2".to_string())]),
            "http://localhost:5000/api/operations/logs?page=2"
        );
    }

    #[test]
    fn logs_request_pairs() {
        let req = LogsRequest {
            page: 0,
            size: 25,
            sort: Some("CallID".into()),
            dir: Some("asc".into()),
            search: Some(String::new()),
            status: vec!["F".into(), "R".into()],
            filters: Filters::default(),
        };
        assert_eq!(
            encode_pairs(&req.query_pairs()),
            "page=1&size=25&sort=CallID&dir=asc&status=F%2CR"
        );
    }

    /// Canned API on an ephemeral port; total-calls echoes its query string
    /// in `trend`.
    async fn stub_api() -> String {
        use axum::{extract::{Path, RawQuery}, http::StatusCode, routing::get, Json, Router};
        use serde_json::json;

        let app = Router::new()
            .route(
                "/api/dashboard/total-calls",
                get(|RawQuery(q): RawQuery| async move {
                    Json(json!({"total": 3, "avgDaily": 3, "trend": q.unwrap_or_default(), "trendData": []}))
                }),
            )
            .route(
                "/api/operations/logs",
                get(|| async {
                    Json(json!({
                        "rows": [{"CallID": 7, "UniqueId": "Aetna_1", "Status": "C"}],
                        "total": 1, "page": 1, "pageSize": 50, "totalPages": 1
                    }))
                }),
            )
            .route(
                "/api/operations/detail/:id",
                get(|Path(id): Path<i32>| async move {
                    if id == 7 {
                        Ok(Json(json!({
                            "CallID": 7, "Status": "C",
                            "detailData": [{"promptId": "DOB", "value": "1970-01-01"}]
                        })))
                    } else {
                        Err((StatusCode::NOT_FOUND, Json(json!({"error": "Record not found"}))))
                    }
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    #[tokio::test]
    async fn client_decodes_server_payloads() {
        use crate::routes::dashboard::telephony::TotalCalls;

        let api = ApiClient::new(stub_api().await).unwrap();

        let totals: TotalCalls = api.fetch_metric(Metric::TotalCalls, &filters()).await.unwrap();
        assert_eq!(totals.total, 3);
        assert!(totals.trend.starts_with("from=2024-06-01T00%3A00%3A00.000Z"));

        let page = api.fetch_logs(&LogsRequest { page: 1, size: 50, ..Default::default() }).await.unwrap();
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.rows[0].call_id, 7);
        assert_eq!(page.rows[0].unique_id.as_deref(), Some("Aetna_1"));

        let detail = api.fetch_detail(7).await.unwrap();
        assert_eq!(detail.record.call_id, 7);
        assert_eq!(detail.detail_data[0].prompt_id, "DOB");

        let err = api.fetch_detail(8).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Status { status: 404, ref message } if message == "Record not found"
        ));
    }

    #[test]
    fn live_metrics_share_one_cache_entry() {
        assert_eq!(
            DashboardClient::key(Metric::ActiveCalls, &filters()),
            DashboardClient::key(Metric::ActiveCalls, &Filters::default())
        );
        assert_ne!(
            DashboardClient::key(Metric::TotalCalls, &filters()),
            DashboardClient::key(Metric::TotalCalls, &Filters::default())
        );
    }
}

// src/routes/health.rs

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::db;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResp {
    pub status: &'static str,
    pub db: &'static str,
    pub timestamp: Option<String>,
    pub error: Option<&'static str>,
}

impl HealthResp {
    pub fn up(answered: bool) -> Self {
        Self {
            status: "ok",
            db: if answered { "connected" } else { "error" },
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            error: None,
        }
    }

    pub fn down() -> Self {
        Self {
            status: "error",
            db: "disconnected",
            timestamp: None,
            error: Some("database unavailable"),
        }
    }
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResp>) {
    match db::ping(&state.pool).await {
        Ok(answered) => (StatusCode::OK, Json(HealthResp::up(answered))),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(HealthResp::down()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_body() {
        let v = serde_json::to_value(HealthResp::up(true)).unwrap();
        assert_eq!(v["status"], "ok");
        assert_eq!(v["db"], "connected");
        assert!(v["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(v["error"], serde_json::Value::Null);
    }

    #[test]
    fn failure_body_is_redacted() {
        let v = serde_json::to_value(HealthResp::down()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "status": "error",
                "db": "disconnected",
                "timestamp": null,
                "error": "database unavailable"
            })
        );
    }
}

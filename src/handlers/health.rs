//! Health, readiness and liveness checks

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::Store;
use crate::state::AppState;

const SERVICE_NAME: &str = "fleet-pulse-users";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
    pub version: String,
    pub checks: BTreeMap<String, Check>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Check {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Check {
    fn healthy(message: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            message: Some(message.to_string()),
        }
    }

    fn unhealthy(message: String) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

fn respond(checks: BTreeMap<String, Check>) -> (StatusCode, Json<HealthResponse>) {
    let healthy = checks.values().all(Check::is_healthy);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    };

    (status, Json(body))
}

async fn database_check<S: Store>(store: &S) -> Check {
    match store.health_check().await {
        Ok(()) => Check::healthy("Database connection is healthy"),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            Check::unhealthy(format!("Database ping failed: {}", e))
        }
    }
}

/// GET /health
pub async fn health_check<S: Store>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();
    checks.insert("database".to_string(), database_check(&state.store).await);
    respond(checks)
}

/// GET /ready
pub async fn readiness_check<S: Store>(
    State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthResponse>) {
    health_check(State(state)).await
}

/// GET /live
pub async fn liveness_check() -> (StatusCode, Json<HealthResponse>) {
    let mut checks = BTreeMap::new();
    checks.insert("service".to_string(), Check::healthy("Service is running"));
    respond(checks)
}

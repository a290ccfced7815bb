use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;

use crate::controller::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Healthy,
    Degraded,
}

/// Outcome of checking one dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckResult {
    Healthy { latency_ms: u64 },
    Unhealthy { error: String },
}

impl CheckResult {
    fn is_healthy(&self) -> bool {
        matches!(self, CheckResult::Healthy { .. })
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    status: Readiness,
    timestamp: DateTime<Utc>,
    checks: Checks,
}

#[derive(Debug, Serialize)]
struct Checks {
    storage: CheckResult,
    processes: CheckResult,
    configured_processes: usize,
    /// Live lifecycle stream subscribers
    lifecycle_subscribers: usize,
}

fn readiness(storage: &CheckResult, processes: &CheckResult) -> Readiness {
    if storage.is_healthy() && processes.is_healthy() {
        Readiness::Healthy
    } else {
        Readiness::Degraded
    }
}

/// GET /health - Merge State Store reachability and process configuration
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let storage = match state.repos.merges.ping().await {
        Ok(()) => CheckResult::Healthy {
            latency_ms: started.elapsed().as_millis() as u64,
        },
        Err(e) => CheckResult::Unhealthy { error: e.to_string() },
    };

    let started = Instant::now();
    let (processes, configured_processes) = match state.repos.processes.list().await {
        Ok(list) if list.is_empty() => (
            CheckResult::Unhealthy {
                error: "no processes configured".to_string(),
            },
            0,
        ),
        Ok(list) => (
            CheckResult::Healthy {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            list.len(),
        ),
        Err(e) => (CheckResult::Unhealthy { error: e.to_string() }, 0),
    };

    let status = readiness(&storage, &processes);
    if status == Readiness::Degraded {
        tracing::warn!(?storage, ?processes, "readiness check degraded");
    }
    let code = match status {
        Readiness::Healthy => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };

    let report = ReadinessReport {
        status,
        timestamp: Utc::now(),
        checks: Checks {
            storage,
            processes,
            configured_processes,
            lifecycle_subscribers: state.bus.subscriber_count(),
        },
    };
    (code, Json(report))
}

/// GET /healthz - liveness check
pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

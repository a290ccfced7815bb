use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::time::Instant;

use crate::{
    api::{
        error::ApiError,
        response::{success, ApiResponse},
    },
    auth::AuthBearer,
    controller::{AppState, ReplacementReport},
    domain::{parse_scenario_time, MergeView, ProcessId, ScenarioTime},
    error::OrchestratorError,
};

fn scenario_time(raw: &str) -> Result<ScenarioTime, ApiError> {
    parse_scenario_time(raw)
        .ok_or_else(|| OrchestratorError::InvalidScenarioTime(raw.to_string()).into())
}

/// GET /api/v1/processes/:process_id/merges
pub async fn list_merges(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Path(process_id): Path<ProcessId>,
) -> Result<ApiResponse<Vec<MergeView>>, ApiError> {
    let merges = state.orchestrator.list_merges(&process_id).await?;
    let count = merges.len();
    Ok(success(merges).with_count(count))
}

/// GET /api/v1/processes/:process_id/merges/:scenario_time
pub async fn get_merge(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Path((process_id, time)): Path<(ProcessId, String)>,
) -> Result<ApiResponse<MergeView>, ApiError> {
    let view = state
        .orchestrator
        .get_merge(&process_id, scenario_time(&time)?)
        .await?;
    Ok(success(view))
}

/// POST /api/v1/processes/:process_id/merges/:scenario_time/replace
pub async fn replace_missing(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Path((process_id, time)): Path<(ProcessId, String)>,
) -> Result<ApiResponse<ReplacementReport>, ApiError> {
    let start = Instant::now();
    let report = state
        .orchestrator
        .replace(&process_id, scenario_time(&time)?)
        .await?;
    Ok(success(report).with_duration(start.elapsed().as_millis() as u64))
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
}

/// GET /api/v1/processes/:process_id/merges/:scenario_time/export
///
/// Returns the serialized network as an attachment rather than the JSON envelope.
pub async fn export_merge(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Path((process_id, time)): Path<(ProcessId, String)>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let exported = state
        .orchestrator
        .export(&process_id, scenario_time(&time)?, query.format.as_deref())
        .await?;
    let disposition = format!("attachment; filename=\"{}\"", exported.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        exported.bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_scenario_time_path_parsing() {
        assert!(scenario_time("2024-03-01T10:30:00Z").is_ok());
        let err = scenario_time("yesterday").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}

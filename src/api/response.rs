use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Envelope for successful responses. Failures are rendered by `ApiError`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "ResponseMetadata::is_empty")]
    pub metadata: ResponseMetadata,
    #[serde(skip)]
    status: StatusCode,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseMetadata {
    /// Number of items in a list response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ResponseMetadata {
    fn is_empty(&self) -> bool {
        self.total_count.is_none() && self.duration_ms.is_none()
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            timestamp: Utc::now(),
            metadata: ResponseMetadata::default(),
            status: StatusCode::OK,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.metadata.total_count = Some(count);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.metadata.duration_ms = Some(duration_ms);
        self
    }

    /// Answer `202 Accepted`: the work was queued, not done.
    pub fn accepted(mut self) -> Self {
        self.status = StatusCode::ACCEPTED;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

pub fn success<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse::new(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_empty_metadata() {
        let json = serde_json::to_value(success("done")).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], "done");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_list_metadata() {
        let response = success(vec!["SWE", "CORE"]).with_count(2).with_duration(7);
        assert_eq!(
            response.metadata,
            ResponseMetadata {
                total_count: Some(2),
                duration_ms: Some(7)
            }
        );
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_accepted_status() {
        let response = success("queued").accepted().into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}

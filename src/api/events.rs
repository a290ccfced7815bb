use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    api::{
        error::ApiError,
        response::{success, ApiResponse},
    },
    auth::AuthBearer,
    controller::AppState,
    domain::{InboundFragmentEvent, RawCaseRef, ScenarioTime, SourceId},
};

/// Body of `POST /api/v1/events`, the wire form of an inbound fragment event.
///
/// Format and business tag are checked by the pipeline's admission rule, not
/// here: an unsupported event is accepted and then silently dropped.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FragmentEventRequest {
    pub scenario_time: ScenarioTime,
    #[validate(length(min = 1, max = 64))]
    pub source_id: String,
    #[validate(length(min = 1))]
    pub artifact_format: String,
    #[serde(default)]
    pub business_process_tag: String,
    #[validate(length(min = 1))]
    pub raw_case_ref: String,
}

impl From<FragmentEventRequest> for InboundFragmentEvent {
    fn from(req: FragmentEventRequest) -> Self {
        Self {
            scenario_time: req.scenario_time,
            source_id: SourceId::new(req.source_id),
            artifact_format: req.artifact_format,
            business_process_tag: req.business_process_tag,
            raw_case_ref: RawCaseRef::new(req.raw_case_ref),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Queued {
    pub queued: bool,
}

/// POST /api/v1/events - enqueue an inbound fragment event
pub async fn ingest_event(
    State(state): State<AppState>,
    _auth: AuthBearer,
    Json(req): Json<FragmentEventRequest>,
) -> Result<ApiResponse<Queued>, ApiError> {
    req.validate()?;
    let event = InboundFragmentEvent::from(req);
    debug!(source_id = %event.source_id, raw_case_ref = %event.raw_case_ref, "fragment event received");
    state.intake.submit(event)?;
    Ok(success(Queued { queued: true }).accepted())
}

/// GET /api/v1/lifecycle/stream - SSE stream of lifecycle events
pub async fn lifecycle_stream(
    State(state): State<AppState>,
    _auth: AuthBearer,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("lifecycle stream client connected");
    let mut rx = state.bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => yield Ok(Event::default().event(event.kind.to_string()).data(json)),
                    Err(e) => warn!(kind = %event.kind, error = %e, "failed to serialize lifecycle event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "lifecycle stream client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("lifecycle stream closed");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

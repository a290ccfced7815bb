use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use super::{FragmentRecord, ProcessConfig, ProcessId, RawCaseRef, ScenarioTime, SourceId};

/// Inbound announcement that a fragment is available for download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundFragmentEvent {
    pub scenario_time: ScenarioTime,
    pub source_id: SourceId,
    pub artifact_format: String,
    #[serde(default)]
    pub business_process_tag: String,
    pub raw_case_ref: RawCaseRef,
}

/// Why an inbound event was dropped before any state was touched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnsupportedFormat(String),
    MissingBusinessProcessTag,
}

impl InboundFragmentEvent {
    /// Data-level admission check. Rejected events are silently ignored.
    pub fn admit(&self, accepted_format: &str) -> Result<(), Rejection> {
        if !self.artifact_format.eq_ignore_ascii_case(accepted_format) {
            return Err(Rejection::UnsupportedFormat(self.artifact_format.clone()));
        }
        if self.business_process_tag.trim().is_empty() {
            return Err(Rejection::MissingBusinessProcessTag);
        }
        Ok(())
    }
}

/// Kind of lifecycle transition published to the outbound channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleKind {
    FragmentAvailable,
    FragmentValidated,
    FragmentReplaced,
    MergeStarted,
    BalanceAdjustmentStarted,
    BalanceAdjustmentFinished,
    LoadflowStarted,
    LoadflowFinished,
    MergeFinished,
}

/// One outbound lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Unique per emission; lets webhook consumers drop duplicates
    pub event_id: Uuid,
    pub kind: LifecycleKind,
    pub process_id: ProcessId,
    pub business_process_tag: String,
    pub scenario_time: ScenarioTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, process: &ProcessConfig, scenario_time: ScenarioTime) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            process_id: process.process_id.clone(),
            business_process_tag: process.business_process_tag.clone(),
            scenario_time,
            source_id: None,
            status: None,
            emitted_at: Utc::now(),
        }
    }

    /// Event describing a fragment transition; carries the fragment's own tag.
    pub fn for_fragment(kind: LifecycleKind, fragment: &FragmentRecord) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            process_id: fragment.process_id.clone(),
            business_process_tag: fragment.business_process_tag.clone(),
            scenario_time: fragment.scenario_time,
            source_id: Some(fragment.source_id.clone()),
            status: Some(fragment.status.to_string()),
            emitted_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: impl ToString) -> Self {
        self.status = Some(status.to_string());
        self
    }
}

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{MergeOrchestrator, TriggerOutcome};
use crate::collaborators::NetworkArtifact;
use crate::domain::{
    format_scenario_time, FragmentKey, FragmentStatus, InboundFragmentEvent, LifecycleEvent,
    LifecycleKind, ProcessConfig, ProcessId, Rejection,
};
use crate::error::Result;

/// What happened to one inbound fragment event
#[derive(Debug, Clone, PartialEq)]
pub enum FragmentOutcome {
    /// Dropped by the data admission check; nothing was recorded
    Rejected(Rejection),
    /// No configured process requires the source; nothing was recorded
    Unreferenced,
    /// Recorded as AVAILABLE but the case could not be fetched or imported
    FetchFailed { processes: Vec<ProcessId> },
    /// Validation ran for each matching process
    Processed(Vec<ProcessOutcome>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub process_id: ProcessId,
    pub validation: ValidationOutcome,
    /// Present only when a verdict was recorded and the trigger ran
    pub trigger: Option<TriggerOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    Recorded(FragmentStatus),
    /// Transport or parse failure talking to the validator; fragment stays AVAILABLE
    ValidatorFailed,
    /// The fragment record disappeared between announcement and verdict
    RecordMissing,
}

impl MergeOrchestrator {
    /// Runs the fragment pipeline for one inbound event.
    ///
    /// Collaborator failures end in a logged, non-error outcome. Only storage
    /// failures are returned as errors.
    pub async fn handle_fragment_event(&self, event: &InboundFragmentEvent) -> Result<FragmentOutcome> {
        if let Err(rejection) = event.admit(&self.settings.accepted_format) {
            debug!(
                source_id = %event.source_id,
                format = %event.artifact_format,
                reason = ?rejection,
                "inbound fragment event rejected"
            );
            return Ok(FragmentOutcome::Rejected(rejection));
        }

        let processes = self.processes.requiring_source(&event.source_id).await?;
        if processes.is_empty() {
            debug!(source_id = %event.source_id, "no process requires this source");
            return Ok(FragmentOutcome::Unreferenced);
        }

        // One write for every matching process; events go out only once it lands.
        let keys: Vec<FragmentKey> = processes.iter().map(|p| event_key(p, event)).collect();
        let marked = self
            .merges
            .mark_available(&keys, &event.business_process_tag, &event.raw_case_ref)
            .await?;
        for (key, outcome) in keys.iter().zip(&marked) {
            if outcome.is_available() {
                self.emit(LifecycleEvent::for_fragment(
                    LifecycleKind::FragmentAvailable,
                    outcome.record(),
                ));
            } else {
                debug!(fragment = %key, "fragment already validated, keeping verdict until re-validation");
            }
        }

        let artifact = match self.collaborators.fetcher.fetch(&event.raw_case_ref).await {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!(
                    source_id = %event.source_id,
                    scenario_time = %format_scenario_time(&event.scenario_time),
                    raw_case_ref = %event.raw_case_ref,
                    error = %e,
                    "fragment fetch/import failed, leaving fragment AVAILABLE"
                );
                return Ok(FragmentOutcome::FetchFailed {
                    processes: processes.into_iter().map(|p| p.process_id).collect(),
                });
            }
        };

        let per_process = processes
            .iter()
            .map(|process| self.validate_for_process(process, event, &artifact));
        let outcomes = join_all(per_process)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        Ok(FragmentOutcome::Processed(outcomes))
    }

    async fn validate_for_process(
        &self,
        process: &ProcessConfig,
        event: &InboundFragmentEvent,
        artifact: &NetworkArtifact,
    ) -> Result<ProcessOutcome> {
        let key = event_key(process, event);

        let verdict = match self.collaborators.validator.validate(artifact).await {
            Ok(valid) => valid,
            Err(e) => {
                warn!(fragment = %key, error = %e, "quality validation failed, leaving fragment AVAILABLE");
                return Ok(ProcessOutcome {
                    process_id: process.process_id.clone(),
                    validation: ValidationOutcome::ValidatorFailed,
                    trigger: None,
                });
            }
        };

        let status = FragmentStatus::from_verdict(verdict);
        let Some(record) = self
            .merges
            .record_validation(&key, status, &artifact.artifact_ref, &artifact.raw_case_ref)
            .await?
        else {
            warn!(fragment = %key, "fragment record missing when storing validation verdict");
            return Ok(ProcessOutcome {
                process_id: process.process_id.clone(),
                validation: ValidationOutcome::RecordMissing,
                trigger: None,
            });
        };

        info!(fragment = %key, %status, artifact_ref = %artifact.artifact_ref, "fragment validated");
        self.emit(LifecycleEvent::for_fragment(LifecycleKind::FragmentValidated, &record));

        let trigger = self
            .evaluate(&process.process_id, event.scenario_time)
            .await?;

        Ok(ProcessOutcome {
            process_id: process.process_id.clone(),
            validation: ValidationOutcome::Recorded(status),
            trigger: Some(trigger),
        })
    }

    /// Intake entry point: runs the pipeline and logs instead of returning errors.
    pub async fn process_event(&self, event: InboundFragmentEvent) {
        if let Err(e) = self.handle_fragment_event(&event).await {
            tracing::error!(
                source_id = %event.source_id,
                scenario_time = %format_scenario_time(&event.scenario_time),
                error = %e,
                "fragment pipeline aborted"
            );
        }
    }
}

fn event_key(process: &ProcessConfig, event: &InboundFragmentEvent) -> FragmentKey {
    FragmentKey {
        process_id: process.process_id.clone(),
        scenario_time: event.scenario_time,
        source_id: event.source_id.clone(),
    }
}

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::MergeOrchestrator;
use crate::domain::{ArtifactRef, FragmentRecord, MergeKey, MergeStatus, ProcessConfig, ProcessId, ScenarioTime};
use crate::error::Result;
use crate::repo::LaunchOutcome;

/// Result of one readiness evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// Not every required source has an eligible fragment yet
    Waiting { validated: usize, required: usize },
    /// Another evaluation already launched this merge
    AlreadyLaunched,
    /// This evaluation launched the merge, which ended with `status`
    Merged { status: MergeStatus },
}

/// Eligible artifact refs in required-source order, one per required source.
pub(crate) fn eligible_artifacts(process: &ProcessConfig, fragments: &[FragmentRecord]) -> Vec<ArtifactRef> {
    process
        .required_sources
        .iter()
        .filter_map(|source| {
            fragments
                .iter()
                .find(|f| &f.source_id == source && f.is_eligible())
                .and_then(|f| f.artifact_ref.clone())
        })
        .collect()
}

impl MergeOrchestrator {
    /// Re-evaluates whether the merge for `(process_id, scenario_time)` can run.
    ///
    /// Safe to call any number of times, concurrently: the store's launch
    /// compare-and-set lets exactly one caller through to the merge pipeline.
    /// The launched merge runs on its own task, so dropping this future does
    /// not abandon it.
    pub async fn evaluate(&self, process_id: &ProcessId, scenario_time: ScenarioTime) -> Result<TriggerOutcome> {
        let process = self.process(process_id).await?;
        let key = MergeKey::new(process_id.clone(), scenario_time);

        let fragments = self.merges.list_fragments(&key).await?;
        let artifacts = eligible_artifacts(&process, &fragments);
        let required = process.required_sources.len();
        if artifacts.len() != required {
            debug!(merge = %key, validated = artifacts.len(), required, "merge not ready");
            return Ok(TriggerOutcome::Waiting {
                validated: artifacts.len(),
                required,
            });
        }

        match self.merges.try_launch_merge(&key, Utc::now()).await? {
            LaunchOutcome::AlreadyLaunched(_) => {
                debug!(merge = %key, "merge already launched");
                Ok(TriggerOutcome::AlreadyLaunched)
            }
            LaunchOutcome::Launched(_) => {
                info!(merge = %key, sources = required, "all required fragments validated, launching merge");
                let status = self.spawn_merge(process, key, artifacts).await?;
                Ok(TriggerOutcome::Merged { status })
            }
        }
    }
}

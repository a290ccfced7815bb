use serde::Serialize;
use tracing::info;

use super::trigger::eligible_artifacts;
use super::MergeOrchestrator;
use crate::domain::{MergeKey, ProcessConfig, ProcessId, ScenarioTime};
use crate::error::{OrchestratorError, Result};

/// A serialized merged network ready to be handed to a client
#[derive(Debug, Clone, Serialize)]
pub struct ExportedMerge {
    pub file_name: String,
    pub format: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// `{process}_{yyyyMMdd'T'HHmm'Z'}_{tag}`
pub fn name_hint(process: &ProcessConfig, scenario_time: ScenarioTime) -> String {
    format!(
        "{}_{}_{}",
        process.process_id,
        scenario_time.format("%Y%m%dT%H%MZ"),
        process.business_process_tag
    )
}

impl MergeOrchestrator {
    /// Serializes the merged network for `(process_id, scenario_time)`.
    ///
    /// Requires every required source to hold an eligible fragment. The merge
    /// does not have to be finished.
    pub async fn export(
        &self,
        process_id: &ProcessId,
        scenario_time: ScenarioTime,
        format: Option<&str>,
    ) -> Result<ExportedMerge> {
        let process = self.process(process_id).await?;
        let key = MergeKey::new(process_id.clone(), scenario_time);
        if self.merges.get_merge(&key).await?.is_none() {
            return Err(OrchestratorError::MergeNotFound(key));
        }

        let fragments = self.merges.list_fragments(&key).await?;
        let artifacts = eligible_artifacts(&process, &fragments);
        let required = process.required_sources.len();
        if artifacts.len() != required {
            return Err(OrchestratorError::MergeNotReady {
                key,
                validated: artifacts.len(),
                required,
            });
        }

        let format = format
            .filter(|f| !f.trim().is_empty())
            .unwrap_or(self.settings.default_export_format.as_str())
            .to_string();
        let hint = name_hint(&process, scenario_time);
        let bytes = self
            .collaborators
            .exporter
            .export(&artifacts, &format, &hint)
            .await
            .map_err(|e| OrchestratorError::Collaborator(format!("export of {key} failed: {e}")))?;

        info!(merge = %key, %format, size = bytes.len(), "merged network exported");
        Ok(ExportedMerge {
            file_name: format!("{hint}.{}", format.to_ascii_lowercase()),
            format,
            bytes,
        })
    }
}

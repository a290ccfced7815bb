use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{ProcessId, SourceId};
use crate::error::{OrchestratorError, Result};

/// Configuration of one merging process.
///
/// A snapshot of this struct is what every pipeline task works against; it is
/// read from the ProcessConfig store once per evaluation and passed down
/// explicitly instead of being looked up again mid-flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub process_id: ProcessId,
    /// Sources that must all contribute a validated fragment before a merge runs
    pub required_sources: BTreeSet<SourceId>,
    /// Run the balancing collaborator instead of the load-flow collaborator
    #[serde(default)]
    pub run_balancing: bool,
    pub business_process_tag: String,
}

impl ProcessConfig {
    pub fn new(
        process_id: impl Into<ProcessId>,
        required_sources: impl IntoIterator<Item = SourceId>,
        run_balancing: bool,
        business_process_tag: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            process_id: process_id.into(),
            required_sources: required_sources.into_iter().collect(),
            run_balancing,
            business_process_tag: business_process_tag.into(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.process_id.as_str().trim().is_empty() {
            return Err(OrchestratorError::InvalidProcessConfig {
                process_id: self.process_id.clone(),
                reason: "process id is empty".to_string(),
            });
        }
        if self.required_sources.is_empty() {
            return Err(OrchestratorError::InvalidProcessConfig {
                process_id: self.process_id.clone(),
                reason: "required sources must not be empty".to_string(),
            });
        }
        if self.business_process_tag.trim().is_empty() {
            return Err(OrchestratorError::InvalidProcessConfig {
                process_id: self.process_id.clone(),
                reason: "business process tag is empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn requires(&self, source_id: &SourceId) -> bool {
        self.required_sources.contains(source_id)
    }
}

use itertools::Itertools;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{MergeOrchestrator, TriggerOutcome};
use crate::domain::{
    format_scenario_time, FragmentKey, FragmentRecord, LifecycleEvent, LifecycleKind, MergeKey,
    ProcessConfig, ProcessId, ScenarioTime, SourceId,
};
use crate::error::Result;
use crate::repo::ReplaceOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplacementOutcome {
    /// The slot already held an eligible fragment
    AlreadyValid,
    /// A donor fragment was substituted in
    Replaced,
    /// No eligible donor inside the search window
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReplacement {
    pub outcome: ReplacementOutcome,
    /// The fragment now occupying the slot, if any
    pub record: Option<FragmentRecord>,
}

/// Per-source result of one replacement run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplacementReport {
    pub process_id: ProcessId,
    pub scenario_time: ScenarioTime,
    pub sources: BTreeMap<SourceId, SourceReplacement>,
    pub trigger: TriggerOutcome,
}

impl ReplacementReport {
    pub fn replaced(&self) -> usize {
        self.sources
            .values()
            .filter(|s| s.outcome == ReplacementOutcome::Replaced)
            .count()
    }

    pub fn unresolved(&self) -> Vec<&SourceId> {
        self.sources
            .iter()
            .filter(|(_, s)| s.outcome == ReplacementOutcome::Unresolved)
            .map(|(source, _)| source)
            .collect()
    }
}

impl MergeOrchestrator {
    /// Fills every required source lacking an eligible fragment with the
    /// nearest eligible donor of the same source, then re-runs the trigger.
    ///
    /// Never overwrites an eligible fragment, so it is safe to run while
    /// real fragments are still arriving.
    pub async fn replace(&self, process_id: &ProcessId, scenario_time: ScenarioTime) -> Result<ReplacementReport> {
        let process = self.process(process_id).await?;
        let key = MergeKey::new(process_id.clone(), scenario_time);
        self.merges.ensure_merge(&key).await?;

        let mut sources = BTreeMap::new();
        for source in &process.required_sources {
            let target = key.fragment(source.clone());
            let result = self.replace_source(&process, &target).await?;
            sources.insert(source.clone(), result);
        }

        let trigger = self.evaluate(process_id, scenario_time).await?;
        let report = ReplacementReport {
            process_id: process_id.clone(),
            scenario_time,
            sources,
            trigger,
        };
        info!(
            merge = %key,
            replaced = report.replaced(),
            unresolved = %report.unresolved().iter().join(","),
            "replacement finished"
        );
        Ok(report)
    }

    async fn replace_source(&self, process: &ProcessConfig, target: &FragmentKey) -> Result<SourceReplacement> {
        if let Some(current) = self.merges.get_fragment(target).await? {
            if current.is_eligible() {
                return Ok(SourceReplacement {
                    outcome: ReplacementOutcome::AlreadyValid,
                    record: Some(current),
                });
            }
        }

        let Some(donor) = self.find_donor(process, target).await? else {
            debug!(fragment = %target, "no replacement donor found");
            return Ok(SourceReplacement {
                outcome: ReplacementOutcome::Unresolved,
                record: None,
            });
        };

        match self
            .merges
            .replace_fragment_unless_validated(&donor.substitute_into(target))
            .await?
        {
            ReplaceOutcome::Replaced(record) => {
                info!(
                    fragment = %target,
                    replacing_time = %format_scenario_time(&record.original_time()),
                    replacing_tag = record.original_business_process_tag(),
                    "fragment replaced"
                );
                self.emit(LifecycleEvent::for_fragment(LifecycleKind::FragmentReplaced, &record));
                Ok(SourceReplacement {
                    outcome: ReplacementOutcome::Replaced,
                    record: Some(record),
                })
            }
            // A real fragment validated while we searched
            ReplaceOutcome::AlreadyValidated(record) => Ok(SourceReplacement {
                outcome: ReplacementOutcome::AlreadyValid,
                record: Some(record),
            }),
        }
    }

    async fn find_donor(&self, process: &ProcessConfig, target: &FragmentKey) -> Result<Option<FragmentRecord>> {
        let policy = &self.settings.replacement;
        for time in policy.candidate_times(target.scenario_time) {
            let candidate_key = FragmentKey {
                scenario_time: time,
                ..target.clone()
            };
            if let Some(candidate) = self.merges.get_fragment(&candidate_key).await? {
                if policy.accepts_donor(process, &candidate) {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }
}

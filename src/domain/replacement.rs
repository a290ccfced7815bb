use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{FragmentRecord, ProcessConfig, ScenarioTime};

/// Where and in which order the replacement engine looks for donor fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementPolicy {
    pub backward_window_hours: u32,
    pub forward_window_hours: u32,
    pub step_minutes: u32,
    /// Process tag -> donor tags accepted in addition to the tag itself
    #[serde(default)]
    pub compatible_tags: HashMap<String, Vec<String>>,
}

impl Default for ReplacementPolicy {
    fn default() -> Self {
        Self {
            backward_window_hours: 24,
            forward_window_hours: 0,
            step_minutes: 60,
            compatible_tags: HashMap::new(),
        }
    }
}

impl ReplacementPolicy {
    /// Candidate donor times: every earlier slot in the backward window,
    /// nearest first, then every later slot in the forward window, nearest first.
    pub fn candidate_times(&self, target: ScenarioTime) -> Vec<ScenarioTime> {
        let step = i64::from(self.step_minutes.max(1));
        let backward_steps = i64::from(self.backward_window_hours) * 60 / step;
        let forward_steps = i64::from(self.forward_window_hours) * 60 / step;

        let earlier = (1..=backward_steps).map(|n| target - Duration::minutes(n * step));
        let later = (1..=forward_steps).map(|n| target + Duration::minutes(n * step));
        earlier.chain(later).collect()
    }

    /// Whether a donor submitted under `donor_tag` may stand in for `process`.
    pub fn is_compatible(&self, process: &ProcessConfig, donor_tag: &str) -> bool {
        let wanted = process.business_process_tag.as_str();
        donor_tag == wanted
            || self
                .compatible_tags
                .get(wanted)
                .is_some_and(|tags| tags.iter().any(|t| t == donor_tag))
    }

    /// Whether `candidate` may be used as donor for `process`.
    pub fn accepts_donor(&self, process: &ProcessConfig, candidate: &FragmentRecord) -> bool {
        candidate.is_eligible()
            && self.is_compatible(process, candidate.original_business_process_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactRef, FragmentKey, FragmentStatus, ProcessId, SourceId};
    use chrono::{TimeZone, Utc};

    fn target() -> ScenarioTime {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
    }

    fn process() -> ProcessConfig {
        ProcessConfig::new("SWE", vec![SourceId::from("FR")], false, "1D").unwrap()
    }

    fn donor(tag: &str, status: FragmentStatus) -> FragmentRecord {
        let key = FragmentKey {
            process_id: ProcessId::from("SWE"),
            scenario_time: target() - Duration::hours(1),
            source_id: SourceId::from("FR"),
        };
        let mut record = FragmentRecord::available(&key, tag, None);
        record.status = status;
        record.artifact_ref = Some(ArtifactRef::from("net"));
        record
    }

    #[test]
    fn test_candidates_nearest_earlier_first() {
        let policy = ReplacementPolicy {
            backward_window_hours: 3,
            forward_window_hours: 1,
            ..Default::default()
        };
        let candidates = policy.candidate_times(target());
        assert_eq!(
            candidates,
            vec![
                target() - Duration::hours(1),
                target() - Duration::hours(2),
                target() - Duration::hours(3),
                target() + Duration::hours(1),
            ]
        );
    }

    #[test]
    fn test_candidates_respect_step() {
        let policy = ReplacementPolicy {
            backward_window_hours: 1,
            step_minutes: 15,
            ..Default::default()
        };
        assert_eq!(policy.candidate_times(target()).len(), 4);
        assert_eq!(policy.candidate_times(target())[0], target() - Duration::minutes(15));
    }

    #[test]
    fn test_zero_window_has_no_candidates() {
        let policy = ReplacementPolicy {
            backward_window_hours: 0,
            ..Default::default()
        };
        assert!(policy.candidate_times(target()).is_empty());
    }

    #[test]
    fn test_tag_compatibility() {
        let mut policy = ReplacementPolicy::default();
        assert!(policy.is_compatible(&process(), "1D"));
        assert!(!policy.is_compatible(&process(), "2D"));

        policy
            .compatible_tags
            .insert("1D".to_string(), vec!["2D".to_string()]);
        assert!(policy.is_compatible(&process(), "2D"));
        assert!(!policy.is_compatible(&process(), "ID"));
    }

    #[test]
    fn test_failed_donor_rejected() {
        let policy = ReplacementPolicy::default();
        assert!(policy.accepts_donor(&process(), &donor("1D", FragmentStatus::ValidationSucceeded)));
        assert!(!policy.accepts_donor(&process(), &donor("1D", FragmentStatus::ValidationFailed)));
        assert!(!policy.accepts_donor(&process(), &donor("2D", FragmentStatus::ValidationSucceeded)));
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{ArtifactRef, FragmentKey, ProcessId, RawCaseRef, ScenarioTime, SourceId};

/// Status of a single source's fragment for one (process, scenario time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentStatus {
    Available,
    ValidationSucceeded,
    ValidationFailed,
}

impl FragmentStatus {
    pub fn from_verdict(valid: bool) -> Self {
        if valid {
            FragmentStatus::ValidationSucceeded
        } else {
            FragmentStatus::ValidationFailed
        }
    }

    pub fn is_validated(&self) -> bool {
        !matches!(self, FragmentStatus::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub process_id: ProcessId,
    pub scenario_time: ScenarioTime,
    pub source_id: SourceId,
    pub status: FragmentStatus,
    /// Business process tag the fragment was submitted under
    pub business_process_tag: String,
    /// Imported network artifact, set once validation has run
    pub artifact_ref: Option<ArtifactRef>,
    /// Raw fetched case the artifact was imported from
    pub source_artifact_ref: Option<RawCaseRef>,
    /// Scenario time of the donor fragment when filled by replacement
    pub replacing_time: Option<ScenarioTime>,
    /// Business process tag of the donor fragment when filled by replacement
    pub replacing_business_process_tag: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FragmentRecord {
    /// Fresh record for a newly announced fragment.
    pub fn available(key: &FragmentKey, business_process_tag: &str, raw: Option<RawCaseRef>) -> Self {
        Self {
            process_id: key.process_id.clone(),
            scenario_time: key.scenario_time,
            source_id: key.source_id.clone(),
            status: FragmentStatus::Available,
            business_process_tag: business_process_tag.to_string(),
            artifact_ref: None,
            source_artifact_ref: raw,
            replacing_time: None,
            replacing_business_process_tag: None,
            updated_at: Utc::now(),
        }
    }

    pub fn key(&self) -> FragmentKey {
        FragmentKey {
            process_id: self.process_id.clone(),
            scenario_time: self.scenario_time,
            source_id: self.source_id.clone(),
        }
    }

    /// Whether this record counts towards merge eligibility.
    pub fn is_eligible(&self) -> bool {
        self.status == FragmentStatus::ValidationSucceeded && self.artifact_ref.is_some()
    }

    pub fn is_replacement(&self) -> bool {
        self.replacing_time.is_some()
    }

    /// Scenario time the underlying artifact was originally submitted for.
    pub fn original_time(&self) -> ScenarioTime {
        self.replacing_time.unwrap_or(self.scenario_time)
    }

    /// Business process tag the underlying artifact was originally submitted under.
    pub fn original_business_process_tag(&self) -> &str {
        self.replacing_business_process_tag
            .as_deref()
            .unwrap_or(&self.business_process_tag)
    }

    /// Build the record that substitutes `self` (the donor) into `target`.
    pub fn substitute_into(&self, target: &FragmentKey) -> Self {
        Self {
            process_id: target.process_id.clone(),
            scenario_time: target.scenario_time,
            source_id: target.source_id.clone(),
            status: FragmentStatus::ValidationSucceeded,
            business_process_tag: self.business_process_tag.clone(),
            artifact_ref: self.artifact_ref.clone(),
            source_artifact_ref: self.source_artifact_ref.clone(),
            replacing_time: Some(self.original_time()),
            replacing_business_process_tag: Some(self.original_business_process_tag().to_string()),
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::str::FromStr;

    fn key(hour: u32) -> FragmentKey {
        FragmentKey {
            process_id: ProcessId::from("SWE"),
            scenario_time: Utc.with_ymd_and_hms(2024, 3, 1, hour, 30, 0).unwrap(),
            source_id: SourceId::from("FR"),
        }
    }

    fn validated(hour: u32, tag: &str) -> FragmentRecord {
        let mut record = FragmentRecord::available(&key(hour), tag, Some(RawCaseRef::from("raw-1")));
        record.status = FragmentStatus::ValidationSucceeded;
        record.artifact_ref = Some(ArtifactRef::from("net-1"));
        record
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(FragmentStatus::ValidationSucceeded.to_string(), "VALIDATION_SUCCEEDED");
        assert_eq!(
            FragmentStatus::from_str("VALIDATION_FAILED").unwrap(),
            FragmentStatus::ValidationFailed
        );
        assert_eq!(
            serde_json::to_string(&FragmentStatus::Available).unwrap(),
            "\"AVAILABLE\""
        );
    }

    #[test]
    fn test_available_is_never_eligible() {
        let record = FragmentRecord::available(&key(10), "1D", None);
        assert!(!record.is_eligible());
        assert!(!record.status.is_validated());
    }

    #[test]
    fn test_validated_without_artifact_is_not_eligible() {
        let mut record = validated(10, "1D");
        record.artifact_ref = None;
        assert!(!record.is_eligible());
    }

    #[test]
    fn test_substitute_stamps_donor_provenance() {
        let donor = validated(9, "2D");
        let target = key(10);
        let substituted = donor.substitute_into(&target);

        assert_eq!(substituted.scenario_time, target.scenario_time);
        assert_eq!(substituted.replacing_time, Some(target.scenario_time - Duration::hours(1)));
        assert_eq!(substituted.replacing_business_process_tag.as_deref(), Some("2D"));
        assert_eq!(substituted.artifact_ref, donor.artifact_ref);
        assert!(substituted.is_eligible());
    }

    #[test]
    fn test_substitute_of_substitute_keeps_original_provenance() {
        let first = validated(8, "1D").substitute_into(&key(9));
        let second = first.substitute_into(&key(10));
        assert_eq!(second.replacing_time, Some(key(8).scenario_time));
        assert_eq!(second.replacing_business_process_tag.as_deref(), Some("1D"));
    }
}

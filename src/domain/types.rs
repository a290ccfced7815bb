use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Identifier Types
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a merging process (e.g. `SWE`, `CORE`)
    ProcessId
);

string_id!(
    /// Identifier of the data source (TSO) contributing a fragment
    SourceId
);

string_id!(
    /// Opaque handle to an imported network artifact
    ArtifactRef
);

string_id!(
    /// Opaque handle to a raw case as announced by the inbound event stream
    RawCaseRef
);

/// Scenario timestamp identifying which merge instance a fragment belongs to.
pub type ScenarioTime = DateTime<Utc>;

/// Parse an ISO-8601 scenario time, accepting any offset and normalising to UTC.
pub fn parse_scenario_time(raw: &str) -> Option<ScenarioTime> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Canonical textual form used in logs, events and URLs.
pub fn format_scenario_time(time: &ScenarioTime) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Key of a MergeRecord
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MergeKey {
    pub process_id: ProcessId,
    pub scenario_time: ScenarioTime,
}

impl MergeKey {
    pub fn new(process_id: ProcessId, scenario_time: ScenarioTime) -> Self {
        Self {
            process_id,
            scenario_time,
        }
    }

    pub fn fragment(&self, source_id: SourceId) -> FragmentKey {
        FragmentKey {
            process_id: self.process_id.clone(),
            scenario_time: self.scenario_time,
            source_id,
        }
    }
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.process_id,
            format_scenario_time(&self.scenario_time)
        )
    }
}

/// Key of a FragmentRecord
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentKey {
    pub process_id: ProcessId,
    pub scenario_time: ScenarioTime,
    pub source_id: SourceId,
}

impl FragmentKey {
    pub fn merge_key(&self) -> MergeKey {
        MergeKey::new(self.process_id.clone(), self.scenario_time)
    }
}

impl fmt::Display for FragmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}",
            self.process_id,
            format_scenario_time(&self.scenario_time),
            self.source_id
        )
    }
}

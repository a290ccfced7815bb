use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{FragmentRecord, MergeKey, ProcessId, ScenarioTime};

/// Terminal status of a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeStatus {
    BalanceAdjustmentSucceeded,
    BalanceAdjustmentFailed,
    LoadflowSucceeded,
    LoadflowFailed,
}

impl MergeStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            MergeStatus::BalanceAdjustmentSucceeded | MergeStatus::LoadflowSucceeded
        )
    }
}

/// Which downstream computation a merge runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MergeStage {
    BalanceAdjustment,
    Loadflow,
}

impl MergeStage {
    pub fn for_process(run_balancing: bool) -> Self {
        if run_balancing {
            MergeStage::BalanceAdjustment
        } else {
            MergeStage::Loadflow
        }
    }

    pub fn status(&self, succeeded: bool) -> MergeStatus {
        match (self, succeeded) {
            (MergeStage::BalanceAdjustment, true) => MergeStatus::BalanceAdjustmentSucceeded,
            (MergeStage::BalanceAdjustment, false) => MergeStatus::BalanceAdjustmentFailed,
            (MergeStage::Loadflow, true) => MergeStatus::LoadflowSucceeded,
            (MergeStage::Loadflow, false) => MergeStatus::LoadflowFailed,
        }
    }
}

/// How the collaborator's own verdict maps onto the terminal merge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictPolicy {
    /// A negative collaborator outcome records the stage's `*_FAILED` status
    #[default]
    Propagate,
    /// Any completed collaborator call records `*_SUCCEEDED`
    AlwaysSucceed,
}

impl VerdictPolicy {
    /// `completed` is `None` when the collaborator call itself failed.
    pub fn resolve(&self, stage: MergeStage, completed: Option<bool>) -> MergeStatus {
        match (self, completed) {
            (_, None) => stage.status(false),
            (VerdictPolicy::Propagate, Some(verdict)) => stage.status(verdict),
            (VerdictPolicy::AlwaysSucceed, Some(_)) => stage.status(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRecord {
    pub process_id: ProcessId,
    pub scenario_time: ScenarioTime,
    /// `None` while the merge has not reached a terminal state
    pub status: Option<MergeStatus>,
    /// Set exactly once, by the evaluation that wins the launch
    pub launched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MergeRecord {
    pub fn new(key: &MergeKey) -> Self {
        let now = Utc::now();
        Self {
            process_id: key.process_id.clone(),
            scenario_time: key.scenario_time,
            status: None,
            launched_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> MergeKey {
        MergeKey::new(self.process_id.clone(), self.scenario_time)
    }

    pub fn is_launched(&self) -> bool {
        self.launched_at.is_some()
    }
}

/// A merge together with the fragments recorded under its key
#[derive(Debug, Clone, Serialize)]
pub struct MergeView {
    #[serde(flatten)]
    pub merge: MergeRecord,
    pub fragments: Vec<FragmentRecord>,
}

//! In-memory stores.
//!
//! Used by the default (non-`db`) build and by tests. Every trait method takes
//! the lock exactly once, so each conditional write is atomic with respect to
//! concurrent callers. No guard is held across an `.await`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{
    AvailableOutcome, LaunchOutcome, MergeStateStore, ProcessConfigStore, ReplaceOutcome,
};
use crate::domain::{
    ArtifactRef, FragmentKey, FragmentRecord, FragmentStatus, MergeKey, MergeRecord, MergeStatus,
    ProcessConfig, ProcessId, RawCaseRef, SourceId,
};
use crate::error::{OrchestratorError, Result};

#[derive(Debug, Default)]
pub struct InMemoryProcessConfigStore {
    processes: RwLock<BTreeMap<ProcessId, ProcessConfig>>,
}

impl InMemoryProcessConfigStore {
    pub fn with_processes(processes: impl IntoIterator<Item = ProcessConfig>) -> Self {
        let store = Self::default();
        for process in processes {
            store.upsert(process);
        }
        store
    }

    pub fn upsert(&self, process: ProcessConfig) {
        self.processes
            .write()
            .insert(process.process_id.clone(), process);
    }

    pub fn remove(&self, process_id: &ProcessId) -> Option<ProcessConfig> {
        self.processes.write().remove(process_id)
    }
}

#[async_trait]
impl ProcessConfigStore for InMemoryProcessConfigStore {
    async fn get(&self, process_id: &ProcessId) -> Result<Option<ProcessConfig>> {
        Ok(self.processes.read().get(process_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ProcessConfig>> {
        Ok(self.processes.read().values().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct State {
    merges: BTreeMap<MergeKey, MergeRecord>,
    fragments: BTreeMap<FragmentKey, FragmentRecord>,
}

impl State {
    fn ensure_merge(&mut self, key: &MergeKey) -> &mut MergeRecord {
        self.merges
            .entry(key.clone())
            .or_insert_with(|| MergeRecord::new(key))
    }
}

/// Merge state held in process memory
#[derive(Debug, Default)]
pub struct InMemoryMergeStateStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    completion_failures: AtomicUsize,
}

impl InMemoryMergeStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a storage outage: every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Simulate a store that rejects the next `count` terminal-status writes.
    pub fn set_completion_failures(&self, count: usize) {
        self.completion_failures.store(count, Ordering::SeqCst);
    }

    pub fn fragment_count(&self) -> usize {
        self.state.read().fragments.len()
    }

    pub fn merge_count(&self) -> usize {
        self.state.read().merges.len()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OrchestratorError::storage("merge state store unavailable"));
        }
        Ok(())
    }

    /// Overwrites a fragment unconditionally. Intended for seeding state in tests.
    pub fn put_fragment(&self, record: FragmentRecord) {
        let mut state = self.state.write();
        state.ensure_merge(&record.key().merge_key());
        state.fragments.insert(record.key(), record);
    }
}

#[async_trait]
impl MergeStateStore for InMemoryMergeStateStore {
    async fn ping(&self) -> Result<()> {
        self.check_available()
    }

    async fn ensure_merge(&self, key: &MergeKey) -> Result<MergeRecord> {
        self.check_available()?;
        let mut state = self.state.write();
        Ok(state.ensure_merge(key).clone())
    }

    async fn get_merge(&self, key: &MergeKey) -> Result<Option<MergeRecord>> {
        self.check_available()?;
        Ok(self.state.read().merges.get(key).cloned())
    }

    async fn list_merges(&self, process_id: &ProcessId) -> Result<Vec<MergeRecord>> {
        self.check_available()?;
        let state = self.state.read();
        Ok(state
            .merges
            .values()
            .rev()
            .filter(|m| &m.process_id == process_id)
            .cloned()
            .collect())
    }

    async fn try_launch_merge(&self, key: &MergeKey, at: DateTime<Utc>) -> Result<LaunchOutcome> {
        self.check_available()?;
        let mut state = self.state.write();
        let merge = state.ensure_merge(key);
        if merge.launched_at.is_some() {
            return Ok(LaunchOutcome::AlreadyLaunched(merge.clone()));
        }
        merge.launched_at = Some(at);
        merge.updated_at = at;
        Ok(LaunchOutcome::Launched(merge.clone()))
    }

    async fn complete_merge(&self, key: &MergeKey, status: MergeStatus) -> Result<MergeRecord> {
        self.check_available()?;
        let injected = self
            .completion_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if injected.is_ok() {
            return Err(OrchestratorError::storage("merge status write rejected"));
        }
        let mut state = self.state.write();
        let merge = state.ensure_merge(key);
        merge.status = Some(status);
        merge.updated_at = Utc::now();
        Ok(merge.clone())
    }

    async fn release_launch(&self, key: &MergeKey) -> Result<bool> {
        self.check_available()?;
        let mut state = self.state.write();
        match state.merges.get_mut(key) {
            Some(merge) if merge.launched_at.is_some() && merge.status.is_none() => {
                merge.launched_at = None;
                merge.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_available(
        &self,
        keys: &[FragmentKey],
        business_process_tag: &str,
        raw_case: &RawCaseRef,
    ) -> Result<Vec<AvailableOutcome>> {
        self.check_available()?;
        let mut state = self.state.write();
        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            state.ensure_merge(&key.merge_key());
            let outcome = match state.fragments.get_mut(key) {
                Some(existing) if existing.status.is_validated() => {
                    AvailableOutcome::AlreadyValidated(existing.clone())
                }
                Some(existing) => {
                    existing.business_process_tag = business_process_tag.to_string();
                    existing.source_artifact_ref = Some(raw_case.clone());
                    existing.updated_at = Utc::now();
                    AvailableOutcome::Pending(existing.clone())
                }
                None => {
                    let record =
                        FragmentRecord::available(key, business_process_tag, Some(raw_case.clone()));
                    state.fragments.insert(key.clone(), record.clone());
                    AvailableOutcome::Created(record)
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn record_validation(
        &self,
        key: &FragmentKey,
        status: FragmentStatus,
        artifact: &ArtifactRef,
        raw_case: &RawCaseRef,
    ) -> Result<Option<FragmentRecord>> {
        self.check_available()?;
        let mut state = self.state.write();
        let Some(record) = state.fragments.get_mut(key) else {
            return Ok(None);
        };
        record.status = status;
        record.artifact_ref = Some(artifact.clone());
        record.source_artifact_ref = Some(raw_case.clone());
        record.replacing_time = None;
        record.replacing_business_process_tag = None;
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn get_fragment(&self, key: &FragmentKey) -> Result<Option<FragmentRecord>> {
        self.check_available()?;
        Ok(self.state.read().fragments.get(key).cloned())
    }

    async fn list_fragments(&self, key: &MergeKey) -> Result<Vec<FragmentRecord>> {
        self.check_available()?;
        let lower = key.fragment(SourceId::new(""));
        let state = self.state.read();
        Ok(state
            .fragments
            .range(lower..)
            .take_while(|(k, _)| k.process_id == key.process_id && k.scenario_time == key.scenario_time)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn replace_fragment_unless_validated(
        &self,
        record: &FragmentRecord,
    ) -> Result<ReplaceOutcome> {
        self.check_available()?;
        let key = record.key();
        let mut state = self.state.write();
        state.ensure_merge(&key.merge_key());
        if let Some(existing) = state.fragments.get(&key) {
            if existing.is_eligible() {
                return Ok(ReplaceOutcome::AlreadyValidated(existing.clone()));
            }
        }
        state.fragments.insert(key, record.clone());
        Ok(ReplaceOutcome::Replaced(record.clone()))
    }
}

//! Durable state behind the orchestrator.
//!
//! The Merge State Store is the only shared mutable resource: every
//! cross-task decision goes through one of its conditional writes.
//!
//! - `mark_available` never regresses a validated fragment to AVAILABLE
//! - `try_launch_merge` sets the launch marker at most once per merge key
//! - `release_launch` clears the launch marker only while no status is recorded
//! - `replace_fragment_unless_validated` never overwrites a validated-OK fragment

pub mod memory;
#[cfg(feature = "db")]
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::domain::{
    ArtifactRef, FragmentKey, FragmentRecord, FragmentStatus, MergeKey, MergeRecord, MergeStatus,
    ProcessConfig, ProcessId, RawCaseRef, SourceId,
};
use crate::error::Result;

pub use memory::{InMemoryMergeStateStore, InMemoryProcessConfigStore};

/// Result of upserting a fragment at AVAILABLE
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvailableOutcome {
    /// No record existed; one was created at AVAILABLE
    Created(FragmentRecord),
    /// A record existed and had not been validated yet
    Pending(FragmentRecord),
    /// A record existed with a validation verdict; left untouched
    AlreadyValidated(FragmentRecord),
}

impl AvailableOutcome {
    pub fn record(&self) -> &FragmentRecord {
        match self {
            AvailableOutcome::Created(r)
            | AvailableOutcome::Pending(r)
            | AvailableOutcome::AlreadyValidated(r) => r,
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, AvailableOutcome::AlreadyValidated(_))
    }
}

/// Result of the "not yet launched -> launched" compare-and-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// This caller won the launch and must run the merge pipeline
    Launched(MergeRecord),
    /// Another caller launched it earlier
    AlreadyLaunched(MergeRecord),
}

impl LaunchOutcome {
    #[must_use]
    pub fn is_launched(&self) -> bool {
        matches!(self, LaunchOutcome::Launched(_))
    }
}

/// Result of a conditional replacement write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced(FragmentRecord),
    /// The target already held an eligible fragment; nothing was written
    AlreadyValidated(FragmentRecord),
}

#[async_trait]
pub trait ProcessConfigStore: Send + Sync {
    async fn get(&self, process_id: &ProcessId) -> Result<Option<ProcessConfig>>;

    async fn list(&self) -> Result<Vec<ProcessConfig>>;

    /// Every process whose required sources include `source_id`.
    async fn requiring_source(&self, source_id: &SourceId) -> Result<Vec<ProcessConfig>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|p| p.requires(source_id))
            .collect())
    }
}

#[async_trait]
pub trait MergeStateStore: Send + Sync {
    /// Connectivity check for health reporting.
    async fn ping(&self) -> Result<()>;

    // --- Merge records ---

    /// Returns the merge record for `key`, creating an empty one if absent.
    async fn ensure_merge(&self, key: &MergeKey) -> Result<MergeRecord>;

    async fn get_merge(&self, key: &MergeKey) -> Result<Option<MergeRecord>>;

    /// All merges of a process, most recent scenario time first.
    async fn list_merges(&self, process_id: &ProcessId) -> Result<Vec<MergeRecord>>;

    /// Atomically sets the launch marker if it is not set yet.
    async fn try_launch_merge(&self, key: &MergeKey, at: DateTime<Utc>) -> Result<LaunchOutcome>;

    /// Records the terminal status of a launched merge.
    async fn complete_merge(&self, key: &MergeKey, status: MergeStatus) -> Result<MergeRecord>;

    /// Clears the launch marker of a launched merge that has no status yet.
    /// Returns `false` when nothing was cleared.
    async fn release_launch(&self, key: &MergeKey) -> Result<bool>;

    // --- Fragment records ---

    /// Upserts one fragment per key at AVAILABLE, skipping keys whose fragment
    /// already carries a verdict. Creates owning merge records when missing.
    /// All keys are written or none; outcomes come back in key order.
    async fn mark_available(
        &self,
        keys: &[FragmentKey],
        business_process_tag: &str,
        raw_case: &RawCaseRef,
    ) -> Result<Vec<AvailableOutcome>>;

    /// Stores a validation verdict together with the artifact it was reached
    /// on and the raw case that artifact was imported from.
    /// Returns `None` if no record exists for `key`.
    async fn record_validation(
        &self,
        key: &FragmentKey,
        status: FragmentStatus,
        artifact: &ArtifactRef,
        raw_case: &RawCaseRef,
    ) -> Result<Option<FragmentRecord>>;

    async fn get_fragment(&self, key: &FragmentKey) -> Result<Option<FragmentRecord>>;

    /// All fragments recorded under a merge key, ordered by source.
    async fn list_fragments(&self, key: &MergeKey) -> Result<Vec<FragmentRecord>>;

    /// Full overwrite used by replacement; skipped when the target is already eligible.
    async fn replace_fragment_unless_validated(
        &self,
        record: &FragmentRecord,
    ) -> Result<ReplaceOutcome>;
}

pub struct Repositories {
    pub processes: Arc<dyn ProcessConfigStore>,
    pub merges: Arc<dyn MergeStateStore>,
}

impl Repositories {
    pub async fn new(cfg: &Config) -> anyhow::Result<Self> {
        let seeds = cfg.process_seeds()?;
        let processes: Arc<dyn ProcessConfigStore> =
            Arc::new(InMemoryProcessConfigStore::with_processes(seeds));

        #[cfg(feature = "db")]
        {
            let merges = pg::PgMergeStateStore::connect(&cfg.db.url).await?;
            return Ok(Self {
                processes,
                merges: Arc::new(merges),
            });
        }

        #[cfg(not(feature = "db"))]
        {
            return Ok(Self {
                processes,
                merges: Arc::new(InMemoryMergeStateStore::new()),
            });
        }
    }

    pub fn in_memory(processes: Vec<ProcessConfig>) -> Self {
        Self {
            processes: Arc::new(InMemoryProcessConfigStore::with_processes(processes)),
            merges: Arc::new(InMemoryMergeStateStore::new()),
        }
    }
}

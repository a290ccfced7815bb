#![allow(dead_code)]
//! Shared fakes for integration tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use grid_merge_orchestrator::collaborators::{
    BalanceAdjuster, CaseFetcher, Collaborators, ComputationOutcome, LoadflowAnalyzer,
    NetworkArtifact, NetworkExporter, QualityValidator,
};
use grid_merge_orchestrator::controller::{MergeOrchestrator, OrchestratorSettings};
use grid_merge_orchestrator::domain::{
    ArtifactRef, InboundFragmentEvent, LifecycleEvent, LifecycleKind, ProcessConfig, RawCaseRef,
    SourceId,
};
use grid_merge_orchestrator::notifier::LifecycleNotifier;
use grid_merge_orchestrator::repo::{InMemoryMergeStateStore, InMemoryProcessConfigStore};

/// Configurable stand-in for every downstream service, counting each call.
#[derive(Default)]
pub struct FakeCollaborators {
    pub fetches: AtomicUsize,
    pub validations: AtomicUsize,
    pub balance_runs: AtomicUsize,
    pub loadflow_runs: AtomicUsize,
    pub exports: AtomicUsize,
    /// Raw case refs the validator rejects
    invalid_cases: Mutex<HashSet<String>>,
    /// Raw case refs whose fetch fails
    unfetchable_cases: Mutex<HashSet<String>>,
    computation_fails: Mutex<bool>,
    computation_errors: Mutex<bool>,
    latency: Mutex<Option<Duration>>,
}

impl FakeCollaborators {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_case(&self, raw: &str) {
        self.invalid_cases.lock().insert(raw.to_string());
    }

    pub fn accept_case(&self, raw: &str) {
        self.invalid_cases.lock().remove(raw);
    }

    pub fn fail_fetch(&self, raw: &str) {
        self.unfetchable_cases.lock().insert(raw.to_string());
    }

    /// Computations complete but report a negative outcome
    pub fn set_computation_fails(&self, fails: bool) {
        *self.computation_fails.lock() = fails;
    }

    /// Computation calls themselves error out
    pub fn set_computation_errors(&self, errors: bool) {
        *self.computation_errors.lock() = errors;
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn merge_runs(&self) -> usize {
        self.balance_runs.load(Ordering::SeqCst) + self.loadflow_runs.load(Ordering::SeqCst)
    }

    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators {
            fetcher: self.clone(),
            validator: self.clone(),
            balancer: self.clone(),
            analyzer: self.clone(),
            exporter: self.clone(),
        }
    }

    async fn delay(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn computation(&self) -> Result<ComputationOutcome> {
        if *self.computation_errors.lock() {
            anyhow::bail!("computation service unavailable");
        }
        if *self.computation_fails.lock() {
            return Ok(ComputationOutcome::failed("did not converge"));
        }
        Ok(ComputationOutcome::succeeded())
    }
}

#[async_trait]
impl CaseFetcher for FakeCollaborators {
    async fn fetch(&self, raw_case: &RawCaseRef) -> Result<NetworkArtifact> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.unfetchable_cases.lock().contains(raw_case.as_str()) {
            anyhow::bail!("case {raw_case} not found");
        }
        Ok(NetworkArtifact {
            artifact_ref: ArtifactRef::new(format!("net:{raw_case}")),
            raw_case_ref: raw_case.clone(),
            name: raw_case.to_string(),
        })
    }
}

#[async_trait]
impl QualityValidator for FakeCollaborators {
    async fn validate(&self, artifact: &NetworkArtifact) -> Result<bool> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        Ok(!self.invalid_cases.lock().contains(artifact.raw_case_ref.as_str()))
    }
}

#[async_trait]
impl BalanceAdjuster for FakeCollaborators {
    async fn balance(&self, _artifacts: &[ArtifactRef]) -> Result<ComputationOutcome> {
        self.balance_runs.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.computation()
    }
}

#[async_trait]
impl LoadflowAnalyzer for FakeCollaborators {
    async fn analyze(&self, _artifacts: &[ArtifactRef]) -> Result<ComputationOutcome> {
        self.loadflow_runs.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.computation()
    }
}

#[async_trait]
impl NetworkExporter for FakeCollaborators {
    async fn export(&self, artifacts: &[ArtifactRef], format: &str, name_hint: &str) -> Result<Vec<u8>> {
        self.exports.fetch_add(1, Ordering::SeqCst);
        let refs: Vec<&str> = artifacts.iter().map(|a| a.as_str()).collect();
        Ok(format!("{name_hint}|{format}|{}", refs.join(",")).into_bytes())
    }
}

/// Captures every lifecycle event in emission order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<LifecycleKind> {
        self.events.lock().iter().map(|e| e.kind).collect()
    }

    pub fn count(&self, kind: LifecycleKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl LifecycleNotifier for RecordingNotifier {
    fn notify(&self, event: LifecycleEvent) {
        self.events.lock().push(event);
    }
}

pub struct Harness {
    pub orchestrator: Arc<MergeOrchestrator>,
    pub store: Arc<InMemoryMergeStateStore>,
    pub processes: Arc<InMemoryProcessConfigStore>,
    pub fakes: Arc<FakeCollaborators>,
    pub events: Arc<RecordingNotifier>,
}

impl Harness {
    pub fn new(processes: Vec<ProcessConfig>) -> Self {
        Self::with_settings(processes, OrchestratorSettings::default())
    }

    pub fn with_settings(processes: Vec<ProcessConfig>, settings: OrchestratorSettings) -> Self {
        let store = Arc::new(InMemoryMergeStateStore::new());
        let process_store = Arc::new(InMemoryProcessConfigStore::with_processes(processes));
        let fakes = FakeCollaborators::new();
        let events = RecordingNotifier::new();
        let orchestrator = Arc::new(MergeOrchestrator::new(
            process_store.clone(),
            store.clone(),
            fakes.collaborators(),
            events.clone(),
            settings,
        ));
        Self {
            orchestrator,
            store,
            processes: process_store,
            fakes,
            events,
        }
    }
}

pub fn swe() -> ProcessConfig {
    ProcessConfig::new("SWE", ["FR", "ES", "PT"].into_iter().map(SourceId::from), false, "1D")
        .expect("valid SWE process")
}

pub fn core() -> ProcessConfig {
    ProcessConfig::new("CORE", ["FR", "DE", "BE", "NL"].into_iter().map(SourceId::from), true, "1D")
        .expect("valid CORE process")
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap()
}

/// Inbound event whose raw case ref is `{source}@{timestamp}`.
pub fn fragment_event(source: &str, time: DateTime<Utc>, tag: &str) -> InboundFragmentEvent {
    InboundFragmentEvent {
        scenario_time: time,
        source_id: SourceId::from(source),
        artifact_format: "CGMES".to_string(),
        business_process_tag: tag.to_string(),
        raw_case_ref: RawCaseRef::new(format!("{source}@{}", time.timestamp())),
    }
}

pub fn raw_case(source: &str, time: DateTime<Utc>) -> String {
    format!("{source}@{}", time.timestamp())
}

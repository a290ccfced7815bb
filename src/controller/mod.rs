pub mod export;
pub mod fragment;
pub mod intake;
pub mod merge;
pub mod replacement;
pub mod trigger;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::domain::{
    InboundFragmentEvent, LifecycleEvent, MergeKey, MergeView, ProcessConfig, ProcessId,
    ReplacementPolicy, ScenarioTime, VerdictPolicy,
};
use crate::error::{OrchestratorError, Result as CoreResult};
use crate::notifier::{self, BroadcastNotifier, LifecycleNotifier};
use crate::repo::{MergeStateStore, ProcessConfigStore, Repositories};

pub use export::ExportedMerge;
pub use fragment::{FragmentOutcome, ProcessOutcome, ValidationOutcome};
pub use intake::{EventIntake, IntakeError};
pub use replacement::{ReplacementOutcome, ReplacementReport, SourceReplacement};
pub use trigger::TriggerOutcome;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Config,
    pub orchestrator: Arc<MergeOrchestrator>,
    pub repos: Arc<Repositories>,
    pub bus: BroadcastNotifier,
    pub intake: EventIntake,
}

impl AppState {
    pub async fn new(cfg: Config) -> Result<(Self, mpsc::Receiver<InboundFragmentEvent>)> {
        let repos = Arc::new(Repositories::new(&cfg).await?);
        let collaborators = Collaborators::from_config(&cfg.collaborators)?;
        let bus = BroadcastNotifier::new(cfg.notifier.channel_capacity);
        let notifier = Arc::new(notifier::from_config(&cfg.notifier, bus.clone())?);

        let orchestrator = Arc::new(MergeOrchestrator::new(
            repos.processes.clone(),
            repos.merges.clone(),
            collaborators,
            notifier,
            OrchestratorSettings::from(&cfg),
        ));
        let (intake, intake_rx) = EventIntake::channel(cfg.intake.queue_capacity);

        Ok((
            Self {
                cfg,
                orchestrator,
                repos,
                bus,
                intake,
            },
            intake_rx,
        ))
    }
}

pub fn spawn_controller_tasks(state: AppState, intake_rx: mpsc::Receiver<InboundFragmentEvent>) {
    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        intake::run_intake(orchestrator, intake_rx).await;
    });
    info!("fragment intake started");
}

/// Tunables shared by every pipeline stage
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub accepted_format: String,
    pub verdict_policy: VerdictPolicy,
    pub replacement: ReplacementPolicy,
    pub default_export_format: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            accepted_format: "CGMES".to_string(),
            verdict_policy: VerdictPolicy::default(),
            replacement: ReplacementPolicy::default(),
            default_export_format: "XIIDM".to_string(),
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            accepted_format: cfg.merge.accepted_format.clone(),
            verdict_policy: cfg.merge.verdict_policy,
            replacement: cfg.replacement.policy(),
            default_export_format: cfg.merge.default_export_format.clone(),
        }
    }
}

/// The merge orchestration engine.
///
/// Holds no merge state of its own: every decision re-reads the stores, and
/// cross-task coordination happens only through the store's conditional
/// writes. The pipeline stages live in the sibling modules:
/// [`fragment`], [`trigger`], [`merge`], [`replacement`] and [`export`].
#[derive(Clone)]
pub struct MergeOrchestrator {
    processes: Arc<dyn ProcessConfigStore>,
    merges: Arc<dyn MergeStateStore>,
    collaborators: Collaborators,
    notifier: Arc<dyn LifecycleNotifier>,
    settings: OrchestratorSettings,
}

impl MergeOrchestrator {
    pub fn new(
        processes: Arc<dyn ProcessConfigStore>,
        merges: Arc<dyn MergeStateStore>,
        collaborators: Collaborators,
        notifier: Arc<dyn LifecycleNotifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            processes,
            merges,
            collaborators,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    fn emit(&self, event: LifecycleEvent) {
        self.notifier.notify(event);
    }

    pub(crate) async fn process(&self, process_id: &ProcessId) -> CoreResult<ProcessConfig> {
        self.processes
            .get(process_id)
            .await?
            .ok_or_else(|| OrchestratorError::ProcessNotFound(process_id.clone()))
    }

    /// All merges recorded for a process, newest first, with their fragments.
    pub async fn list_merges(&self, process_id: &ProcessId) -> CoreResult<Vec<MergeView>> {
        self.process(process_id).await?;
        let merges = self.merges.list_merges(process_id).await?;
        let mut views = Vec::with_capacity(merges.len());
        for merge in merges {
            let fragments = self.merges.list_fragments(&merge.key()).await?;
            views.push(MergeView { merge, fragments });
        }
        Ok(views)
    }

    pub async fn get_merge(
        &self,
        process_id: &ProcessId,
        scenario_time: ScenarioTime,
    ) -> CoreResult<MergeView> {
        self.process(process_id).await?;
        let key = MergeKey::new(process_id.clone(), scenario_time);
        let merge = self
            .merges
            .get_merge(&key)
            .await?
            .ok_or_else(|| OrchestratorError::MergeNotFound(key.clone()))?;
        let fragments = self.merges.list_fragments(&key).await?;
        Ok(MergeView { merge, fragments })
    }
}

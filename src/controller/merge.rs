use std::time::Duration;
use tracing::{error, info, warn};

use super::MergeOrchestrator;
use crate::domain::{
    ArtifactRef, LifecycleEvent, LifecycleKind, MergeKey, MergeStage, MergeStatus, ProcessConfig,
};
use crate::error::{OrchestratorError, Result};

const VERDICT_WRITE_ATTEMPTS: u32 = 3;
const VERDICT_WRITE_BACKOFF: Duration = Duration::from_millis(100);

impl MergeStage {
    fn started_kind(&self) -> LifecycleKind {
        match self {
            MergeStage::BalanceAdjustment => LifecycleKind::BalanceAdjustmentStarted,
            MergeStage::Loadflow => LifecycleKind::LoadflowStarted,
        }
    }

    fn finished_kind(&self) -> LifecycleKind {
        match self {
            MergeStage::BalanceAdjustment => LifecycleKind::BalanceAdjustmentFinished,
            MergeStage::Loadflow => LifecycleKind::LoadflowFinished,
        }
    }
}

impl MergeOrchestrator {
    /// Runs a merge this task has launched on a detached task and waits for it.
    ///
    /// The merge reaches a terminal status (or releases its launch) even when
    /// the awaiting caller is dropped, e.g. by a request timeout.
    pub(crate) async fn spawn_merge(
        &self,
        process: ProcessConfig,
        key: MergeKey,
        artifacts: Vec<ArtifactRef>,
    ) -> Result<MergeStatus> {
        let this = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move { this.run_merge(&process, &task_key, &artifacts).await });
        task.await.map_err(|e| OrchestratorError::MergeTaskAborted {
            key,
            reason: e.to_string(),
        })?
    }

    /// Runs the downstream computation for a merge this task has launched and
    /// records its terminal status.
    ///
    /// A collaborator error never propagates: it becomes the stage's failed
    /// status. Storage errors do.
    pub(crate) async fn run_merge(
        &self,
        process: &ProcessConfig,
        key: &MergeKey,
        artifacts: &[ArtifactRef],
    ) -> Result<MergeStatus> {
        let stage = MergeStage::for_process(process.run_balancing);
        let scenario_time = key.scenario_time;

        self.emit(LifecycleEvent::new(LifecycleKind::MergeStarted, process, scenario_time));
        self.emit(LifecycleEvent::new(stage.started_kind(), process, scenario_time));

        let call = match stage {
            MergeStage::BalanceAdjustment => self.collaborators.balancer.balance(artifacts).await,
            MergeStage::Loadflow => self.collaborators.analyzer.analyze(artifacts).await,
        };
        let completed = match call {
            Ok(outcome) => {
                if !outcome.succeeded {
                    warn!(merge = %key, %stage, detail = ?outcome.detail, "computation reported failure");
                }
                Some(outcome.succeeded)
            }
            Err(e) => {
                warn!(merge = %key, %stage, error = %e, "computation call failed");
                None
            }
        };
        let status = self.settings.verdict_policy.resolve(stage, completed);

        if let Err(e) = self.record_verdict(key, status).await {
            error!(merge = %key, %status, error = %e, "merge verdict not recorded, releasing launch");
            self.release_launch(key).await;
            return Err(e);
        }
        info!(merge = %key, %status, "merge finished");

        self.emit(LifecycleEvent::new(stage.finished_kind(), process, scenario_time).with_status(status));
        self.emit(LifecycleEvent::new(LifecycleKind::MergeFinished, process, scenario_time).with_status(status));
        Ok(status)
    }

    async fn record_verdict(&self, key: &MergeKey, status: MergeStatus) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.merges.complete_merge(key, status).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < VERDICT_WRITE_ATTEMPTS => {
                    warn!(merge = %key, attempt, error = %e, "recording merge verdict failed, retrying");
                    tokio::time::sleep(VERDICT_WRITE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Clears the launch marker of an unfinished merge so the next
    /// evaluation can launch it again.
    async fn release_launch(&self, key: &MergeKey) {
        match self.merges.release_launch(key).await {
            Ok(true) => info!(merge = %key, "launch released, merge will relaunch on next evaluation"),
            Ok(false) => warn!(merge = %key, "launch not released, merge already finished or not launched"),
            Err(e) => error!(merge = %key, error = %e, "launch release failed, merge stays launched without status"),
        }
    }
}

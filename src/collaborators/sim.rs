#![cfg(feature = "sim")]
//! Simulated collaborators so the orchestrator can run without downstream services.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::{
    BalanceAdjuster, CaseFetcher, Collaborators, ComputationOutcome, LoadflowAnalyzer,
    NetworkArtifact, NetworkExporter, QualityValidator,
};
use crate::domain::{ArtifactRef, RawCaseRef};

/// Accepts every case and every network. Computations always converge.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCollaborators {
    /// Artificial latency applied to every call
    pub latency: Option<Duration>,
}

impl SimulatedCollaborators {
    pub fn with_latency(latency: Duration) -> Self {
        Self { latency: Some(latency) }
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
    }
}

pub fn simulated() -> Collaborators {
    let sim = Arc::new(SimulatedCollaborators::default());
    Collaborators {
        fetcher: sim.clone(),
        validator: sim.clone(),
        balancer: sim.clone(),
        analyzer: sim.clone(),
        exporter: sim,
    }
}

#[async_trait]
impl CaseFetcher for SimulatedCollaborators {
    async fn fetch(&self, raw_case: &RawCaseRef) -> Result<NetworkArtifact> {
        self.delay().await;
        Ok(NetworkArtifact {
            artifact_ref: ArtifactRef::new(format!("network:{raw_case}")),
            raw_case_ref: raw_case.clone(),
            name: raw_case.to_string(),
        })
    }
}

#[async_trait]
impl QualityValidator for SimulatedCollaborators {
    async fn validate(&self, _artifact: &NetworkArtifact) -> Result<bool> {
        self.delay().await;
        Ok(true)
    }
}

#[async_trait]
impl BalanceAdjuster for SimulatedCollaborators {
    async fn balance(&self, artifacts: &[ArtifactRef]) -> Result<ComputationOutcome> {
        self.delay().await;
        tracing::debug!(artifacts = artifacts.len(), "simulated balance adjustment");
        Ok(ComputationOutcome::succeeded())
    }
}

#[async_trait]
impl LoadflowAnalyzer for SimulatedCollaborators {
    async fn analyze(&self, artifacts: &[ArtifactRef]) -> Result<ComputationOutcome> {
        self.delay().await;
        tracing::debug!(artifacts = artifacts.len(), "simulated load-flow");
        Ok(ComputationOutcome::succeeded())
    }
}

#[async_trait]
impl NetworkExporter for SimulatedCollaborators {
    async fn export(&self, artifacts: &[ArtifactRef], format: &str, name_hint: &str) -> Result<Vec<u8>> {
        self.delay().await;
        let manifest = serde_json::json!({
            "name": name_hint,
            "format": format,
            "artifacts": artifacts,
        });
        Ok(serde_json::to_vec_pretty(&manifest)?)
    }
}

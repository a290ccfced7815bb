//! External services the orchestrator drives.
//!
//! Every call is an I/O boundary with its own client-side timeout. A timeout is
//! reported as an ordinary `Err` and handled exactly like a transport failure.

pub mod http;
#[cfg(feature = "sim")]
pub mod sim;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CollaboratorMode, CollaboratorsConfig};
use crate::domain::{ArtifactRef, RawCaseRef};

/// Imported network produced by the fetch collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkArtifact {
    pub artifact_ref: ArtifactRef,
    pub raw_case_ref: RawCaseRef,
    #[serde(default)]
    pub name: String,
}

/// Verdict reported by the balancing and load-flow collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationOutcome {
    pub succeeded: bool,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ComputationOutcome {
    pub fn succeeded() -> Self {
        Self { succeeded: true, detail: None }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self { succeeded: false, detail: Some(detail.into()) }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaseFetcher: Send + Sync {
    /// Download the raw case and import it as a network artifact.
    async fn fetch(&self, raw_case: &RawCaseRef) -> Result<NetworkArtifact>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QualityValidator: Send + Sync {
    async fn validate(&self, artifact: &NetworkArtifact) -> Result<bool>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceAdjuster: Send + Sync {
    async fn balance(&self, artifacts: &[ArtifactRef]) -> Result<ComputationOutcome>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoadflowAnalyzer: Send + Sync {
    async fn analyze(&self, artifacts: &[ArtifactRef]) -> Result<ComputationOutcome>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkExporter: Send + Sync {
    async fn export(&self, artifacts: &[ArtifactRef], format: &str, name_hint: &str) -> Result<Vec<u8>>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn CaseFetcher>,
    pub validator: Arc<dyn QualityValidator>,
    pub balancer: Arc<dyn BalanceAdjuster>,
    pub analyzer: Arc<dyn LoadflowAnalyzer>,
    pub exporter: Arc<dyn NetworkExporter>,
}

impl Collaborators {
    pub fn from_config(cfg: &CollaboratorsConfig) -> Result<Self> {
        match cfg.mode {
            CollaboratorMode::Http => {
                let client = Arc::new(http::HttpCollaborators::new(
                    http::Endpoints::from(cfg),
                    Duration::from_secs(cfg.timeout_secs.max(1)),
                )?);
                Ok(Self {
                    fetcher: client.clone(),
                    validator: client.clone(),
                    balancer: client.clone(),
                    analyzer: client.clone(),
                    exporter: client,
                })
            }
            #[cfg(feature = "sim")]
            CollaboratorMode::Sim => Ok(sim::simulated()),
            #[cfg(not(feature = "sim"))]
            CollaboratorMode::Sim => {
                anyhow::bail!("collaborator mode 'sim' requires the 'sim' feature")
            }
        }
    }
}

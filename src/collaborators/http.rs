use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use super::{
    BalanceAdjuster, CaseFetcher, ComputationOutcome, LoadflowAnalyzer, NetworkArtifact,
    NetworkExporter, QualityValidator,
};
use crate::config::CollaboratorsConfig;
use crate::domain::{ArtifactRef, RawCaseRef};

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub fetch: String,
    pub validation: String,
    pub balance: String,
    pub loadflow: String,
    pub export: String,
}

impl From<&CollaboratorsConfig> for Endpoints {
    fn from(cfg: &CollaboratorsConfig) -> Self {
        Self {
            fetch: cfg.fetch_url.clone(),
            validation: cfg.validation_url.clone(),
            balance: cfg.balance_url.clone(),
            loadflow: cfg.loadflow_url.clone(),
            export: cfg.export_url.clone(),
        }
    }
}

/// JSON-over-HTTP client for all downstream services
#[derive(Clone)]
pub struct HttpCollaborators {
    endpoints: Endpoints,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchRequest<'a> {
    raw_case_ref: &'a RawCaseRef,
}

#[derive(Deserialize)]
struct ValidationResponse {
    valid: bool,
}

#[derive(Serialize)]
struct ComputationRequest<'a> {
    artifacts: &'a [ArtifactRef],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportRequest<'a> {
    artifacts: &'a [ArtifactRef],
    format: &'a str,
    name_hint: &'a str,
}

impl HttpCollaborators {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("grid-merge-orchestrator/0.1"),
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { endpoints, client })
    }

    fn url(base: &str, path: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize + ?Sized>(&self, url: String, body: &B) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("collaborator error from {url}: HTTP {status}: {body}");
        }
        Ok(resp)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, url: String, body: &B) -> Result<T> {
        let resp = self.post(url, body).await?;
        resp.json::<T>().await.context("collaborator JSON parse failed")
    }
}

#[async_trait]
impl CaseFetcher for HttpCollaborators {
    async fn fetch(&self, raw_case: &RawCaseRef) -> Result<NetworkArtifact> {
        self.post_json(
            Self::url(&self.endpoints.fetch, "cases/import"),
            &FetchRequest { raw_case_ref: raw_case },
        )
        .await
    }
}

#[async_trait]
impl QualityValidator for HttpCollaborators {
    async fn validate(&self, artifact: &NetworkArtifact) -> Result<bool> {
        let resp: ValidationResponse = self
            .post_json(Self::url(&self.endpoints.validation, "validate"), artifact)
            .await?;
        Ok(resp.valid)
    }
}

#[async_trait]
impl BalanceAdjuster for HttpCollaborators {
    async fn balance(&self, artifacts: &[ArtifactRef]) -> Result<ComputationOutcome> {
        self.post_json(
            Self::url(&self.endpoints.balance, "balance"),
            &ComputationRequest { artifacts },
        )
        .await
    }
}

#[async_trait]
impl LoadflowAnalyzer for HttpCollaborators {
    async fn analyze(&self, artifacts: &[ArtifactRef]) -> Result<ComputationOutcome> {
        self.post_json(
            Self::url(&self.endpoints.loadflow, "loadflow"),
            &ComputationRequest { artifacts },
        )
        .await
    }
}

#[async_trait]
impl NetworkExporter for HttpCollaborators {
    async fn export(&self, artifacts: &[ArtifactRef], format: &str, name_hint: &str) -> Result<Vec<u8>> {
        let resp = self
            .post(
                Self::url(&self.endpoints.export, "export"),
                &ExportRequest { artifacts, format, name_hint },
            )
            .await?;
        let bytes = resp.bytes().await.context("export body read failed")?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        assert_eq!(
            HttpCollaborators::url("http://svc:8080/", "validate"),
            "http://svc:8080/validate"
        );
        assert_eq!(
            HttpCollaborators::url("http://svc:8080", "cases/import"),
            "http://svc:8080/cases/import"
        );
    }
}

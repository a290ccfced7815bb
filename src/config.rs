use anyhow::{Context, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use validator::Validate;

use crate::domain::{ProcessConfig, ReplacementPolicy, SourceId, VerdictPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub merge: MergeConfig,
    #[serde(default)]
    pub replacement: ReplacementConfig,
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub processes: Vec<ProcessSeed>,
    #[cfg(feature = "db")]
    pub db: DbConfig,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ServerConfig {
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub enable_cors: bool,
}

fn default_request_timeout() -> u64 {
    30
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig { pub token: String }

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MergeConfig {
    /// The only artifact format inbound events may announce
    #[validate(length(min = 1))]
    pub accepted_format: String,
    #[serde(default)]
    pub verdict_policy: VerdictPolicy,
    #[validate(length(min = 1))]
    pub default_export_format: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReplacementConfig {
    pub backward_window_hours: u32,
    pub forward_window_hours: u32,
    #[validate(range(min = 1, max = 1440))]
    pub step_minutes: u32,
    #[serde(default)]
    pub compatible_tags: HashMap<String, Vec<String>>,
}

impl Default for ReplacementConfig {
    fn default() -> Self {
        let policy = ReplacementPolicy::default();
        Self {
            backward_window_hours: policy.backward_window_hours,
            forward_window_hours: policy.forward_window_hours,
            step_minutes: policy.step_minutes,
            compatible_tags: policy.compatible_tags,
        }
    }
}

impl ReplacementConfig {
    pub fn policy(&self) -> ReplacementPolicy {
        ReplacementPolicy {
            backward_window_hours: self.backward_window_hours,
            forward_window_hours: self.forward_window_hours,
            step_minutes: self.step_minutes,
            compatible_tags: self.compatible_tags.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorMode {
    Sim,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollaboratorsConfig {
    pub mode: CollaboratorMode,
    #[serde(default)]
    pub fetch_url: String,
    #[serde(default)]
    pub validation_url: String,
    #[serde(default)]
    pub balance_url: String,
    #[serde(default)]
    pub loadflow_url: String,
    #[serde(default)]
    pub export_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub channel_capacity: usize,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024, webhook_url: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntakeConfig { pub queue_capacity: usize }

impl Default for IntakeConfig {
    fn default() -> Self {
        Self { queue_capacity: 256 }
    }
}

/// Process definition as written in the configuration file
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSeed {
    pub process_id: String,
    pub required_sources: BTreeSet<String>,
    #[serde(default)]
    pub run_balancing: bool,
    pub business_process_tag: String,
}

impl ProcessSeed {
    pub fn into_process(self) -> crate::error::Result<ProcessConfig> {
        ProcessConfig::new(
            self.process_id,
            self.required_sources.into_iter().map(SourceId::new),
            self.run_balancing,
            self.business_process_tag,
        )
    }
}

#[cfg(feature = "db")]
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig { pub url: String }

impl Config {
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("config/default.toml"))
                .merge(Env::prefixed("MERGE__").split("__")),
        )
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(raw)))
    }

    fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.server.validate().context("invalid [server] section")?;
        cfg.merge.validate().context("invalid [merge] section")?;
        cfg.replacement
            .validate()
            .context("invalid [replacement] section")?;
        Ok(cfg)
    }

    /// Validated process configurations seeded at start-up.
    pub fn process_seeds(&self) -> Result<Vec<ProcessConfig>> {
        self.processes
            .iter()
            .cloned()
            .map(|seed| seed.into_process().map_err(anyhow::Error::from))
            .collect()
    }
}

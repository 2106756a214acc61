use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use easy_config_store::ConfigStore;
use eyre::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::chat::client::RetryPolicy;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub type Config = Arc<ConfigInner>;

pub fn config(path: PathBuf) -> Result<Config> {
    let config_store = ConfigStore::<ConfigInner>::read(path, "config".to_string())?;
    let mut inner = (*config_store).clone();

    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            debug!("using API key from {}", API_KEY_ENV);
            inner.llm.api_key = Some(key);
        }
    }

    info!("config parsing successful");
    debug!("loaded configuration:\n{}", toml::to_string_pretty(&inner.redacted())?);

    Ok(Arc::new(inner))
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ConfigInner {
    pub llm: LLMConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

impl ConfigInner {
    /// Copy safe to print: the credential is replaced by a marker.
    fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.llm.api_key.is_some() {
            copy.llm.api_key = Some("<redacted>".to_string());
        }
        copy
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        RetryPolicy::new(
            cfg.max_attempts,
            Duration::from_millis(cfg.backoff_base_ms),
            Duration::from_millis(cfg.backoff_max_ms),
        )
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_min_resume_chars")]
    pub min_resume_chars: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            min_resume_chars: default_min_resume_chars(),
        }
    }
}

fn default_llm_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_llm_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    8000
}

fn default_min_resume_chars() -> usize {
    50
}

impl Default for ConfigInner {
    fn default() -> Self {
        let cfg = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.default.toml",));

        toml::from_str(cfg).unwrap() // embedded at compile time, covered by tests
    }
}

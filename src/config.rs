use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

use crate::reconcile::engine::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, RetryPolicy};
use crate::reconcile::error::ReconcileError;
use crate::reconcile::recipients::Normalizer;
use crate::reconcile::types::BankContext;

pub const ENV_API_KEY: &str = "CARDDA_API_KEY";
pub const ENV_BANK_KEY_ID: &str = "CARDDA_BANK_KEY_ID";
pub const ENV_BANK_ACCOUNT_ID: &str = "CARDDA_BANK_ACCOUNT_ID";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    /// Local-to-processor vocabulary tables
    #[serde(default)]
    pub normalize: NormalizeConfig,
}

/// Payment processor API
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub api_base_url: String,
    pub api_version: String,
    /// Bearer token; usually injected via `CARDDA_API_KEY`
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_api_key() -> String {
    "dummy_key".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.cardda.com".to_string(),
            api_version: "v1".to_string(),
            api_key: default_api_key(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Reconciliation run settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerConfig {
    pub bank_key_id: String,
    pub bank_account_id: String,
    pub max_attempts: u32,
    pub backoff_secs: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            bank_key_id: "key_id".to_string(),
            bank_account_id: "account_id".to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_secs: DEFAULT_BACKOFF.as_secs_f64(),
        }
    }
}

impl WorkerConfig {
    pub fn retry_policy(&self) -> Result<RetryPolicy, ReconcileError> {
        let backoff = Duration::try_from_secs_f64(self.backoff_secs).map_err(|_| {
            ReconcileError::InvalidConfig(format!(
                "backoff_secs must be a non-negative number, got {}",
                self.backoff_secs
            ))
        })?;
        RetryPolicy::new(self.max_attempts, backoff)
    }

    pub fn bank_context(&self) -> BankContext {
        BankContext::new(&self.bank_key_id, &self.bank_account_id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceConfig {
    pub transfers_csv: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            transfers_csv: "fixtures/wire_transfers.csv".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NormalizeConfig {
    #[serde(default)]
    pub account_types: HashMap<String, String>,
    #[serde(default)]
    pub banks: HashMap<String, String>,
}

impl NormalizeConfig {
    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.account_types.clone(), self.banks.clone())
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml`, apply environment overrides and validate
    pub fn load(env: &str) -> Result<Self, ReconcileError> {
        let config_path = format!("config/{}.yaml", env);
        let mut config = Self::from_file(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ReconcileError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ReconcileError> {
        serde_yaml::from_str(content).map_err(|e| ReconcileError::Config(e.to_string()))
    }

    /// Credentials come from the environment when present
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup(ENV_API_KEY) {
            self.gateway.api_key = api_key;
        }
        if let Some(bank_key_id) = lookup(ENV_BANK_KEY_ID) {
            self.worker.bank_key_id = bank_key_id;
        }
        if let Some(bank_account_id) = lookup(ENV_BANK_ACCOUNT_ID) {
            self.worker.bank_account_id = bank_account_id;
        }
    }

    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.gateway.api_base_url.trim().is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "gateway.api_base_url is empty".to_string(),
            ));
        }
        self.worker.retry_policy()?;
        Ok(())
    }
}

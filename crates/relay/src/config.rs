use bitcoin::{Amount, Network};
use directories::ProjectDirs;
use oracle::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, str::FromStr, time::Duration};
use tracing::{debug, info};
use types::{asset::Asset, errors::NodeError};

use crate::wallet::fee::FeePolicy;

pub const NETWORK_ENV: &str = "RELAY_NETWORK";

/// Chain data provider backing the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Falls back to the public Blockstream endpoint of the network when `url` is unset.
    Esplora {
        #[serde(default)]
        url: Option<String>,
    },
    Insight {
        url: String,
    },
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub network: Network,
    pub provider: ProviderConfig,
    pub asset_id: String,
    pub asset_name: String,
    pub min_confirmations: u32,
    /// Fee rate in satoshi per virtual byte.
    pub fee_per_vbyte: u64,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub min_fee: Amount,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub max_fee: Amount,
    pub balance_interval_secs: u64,
    pub broadcast_interval_secs: u64,
    pub observation_page_size: usize,
    pub retry: RetryConfig,
    pub request_timeout_secs: u64,
    pub database_directory: PathBuf,
    pub log_file_path: Option<PathBuf>,
    pub metrics_port: u16,
    #[serde(skip)]
    pub config_file_path: PathBuf,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            provider: ProviderConfig::Esplora { url: None },
            asset_id: "BTC".to_string(),
            asset_name: "Bitcoin".to_string(),
            min_confirmations: 1,
            fee_per_vbyte: 10,
            min_fee: Amount::from_sat(1_000),
            max_fee: Amount::from_sat(100_000),
            balance_interval_secs: 60,
            broadcast_interval_secs: 10,
            observation_page_size: 100,
            retry: RetryConfig::default(),
            request_timeout_secs: 30,
            database_directory: PathBuf::from("relaydb.db"),
            log_file_path: None,
            metrics_port: 8080,
            config_file_path: PathBuf::from("config.yaml"),
        }
    }
}

impl RelayConfig {
    pub fn get_config_file_path(file_path_option: Option<String>) -> Result<PathBuf, NodeError> {
        if let Some(file_path_str) = file_path_option {
            let mut path = PathBuf::from(file_path_str);
            if path.is_dir() {
                path.push("config.yaml");
            }
            debug!("Using config file path: {}", path.display());
            Ok(path)
        } else {
            let proj_dirs = ProjectDirs::from("", "", "WalletRelay")
                .ok_or_else(|| NodeError::Error("Failed to determine project directory".into()))?;
            let config_dir = proj_dirs.config_dir();
            Ok(config_dir.join("config.yaml"))
        }
    }

    /// Reads the YAML file, applies environment overrides and validates the result.
    pub fn get_config(config_file_path: Option<String>) -> Result<Self, NodeError> {
        let config_file_path = Self::get_config_file_path(config_file_path)?;

        let config_contents = fs::read_to_string(&config_file_path)
            .map_err(|e| NodeError::Error(format!("Failed to read config file: {e}")))?;

        let mut config = serde_yaml::from_str::<Self>(&config_contents)
            .map_err(|e| NodeError::Error(format!("Failed to deserialize config file: {e}")))?;
        config.config_file_path = config_file_path;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self) -> Result<(), NodeError> {
        if let Some(parent) = self
            .config_file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            fs::create_dir_all(parent)
                .map_err(|e| NodeError::Error(format!("Failed to create config directory: {e}")))?;
        }

        let config_str = serde_yaml::to_string(self)
            .map_err(|e| NodeError::Error(format!("Failed to serialize config: {e}")))?;

        fs::write(&self.config_file_path, config_str)
            .map_err(|e| NodeError::Error(format!("Failed to write config: {e}")))?;

        info!("Config saved to {}", self.config_file_path.display());
        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), NodeError> {
        if let Ok(network) = dotenvy::var(NETWORK_ENV) {
            self.network = parse_network(&network)?;
            info!("Network overridden by {NETWORK_ENV}: {}", self.network);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.min_fee > self.max_fee {
            return Err(NodeError::Error(format!(
                "min_fee ({}) must not exceed max_fee ({})",
                self.min_fee, self.max_fee
            )));
        }
        if self.balance_interval_secs == 0 || self.broadcast_interval_secs == 0 {
            return Err(NodeError::Error(
                "Timer intervals must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(NodeError::Error(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        if self.observation_page_size == 0 {
            return Err(NodeError::Error(
                "observation_page_size must be positive".to_string(),
            ));
        }
        if self.asset_id.trim().is_empty() {
            return Err(NodeError::Error("asset_id must not be empty".to_string()));
        }
        if matches!(&self.provider, ProviderConfig::Insight { url } if url.trim().is_empty()) {
            return Err(NodeError::Error("Insight provider needs a url".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn asset(&self) -> Asset {
        Asset::new(self.asset_id.clone(), self.asset_name.clone())
    }

    #[must_use]
    pub const fn fee_policy(&self) -> FeePolicy {
        FeePolicy {
            fee_per_vbyte: self.fee_per_vbyte,
            min_fee: self.min_fee,
            max_fee: self.max_fee,
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.into()
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn balance_interval(&self) -> Duration {
        Duration::from_secs(self.balance_interval_secs)
    }

    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }
}

pub fn parse_network(value: &str) -> Result<Network, NodeError> {
    match value.trim().to_lowercase().as_str() {
        "mainnet" | "main" => Ok(Network::Bitcoin),
        other => Network::from_str(other)
            .map_err(|e| NodeError::Error(format!("Unknown network {value}: {e}"))),
    }
}

pub struct RelayConfigBuilder {
    config_file_path: Option<PathBuf>,
    log_file_path: Option<PathBuf>,
    network: Option<Network>,
    provider: Option<ProviderConfig>,
    asset_id: Option<String>,
    asset_name: Option<String>,
    min_confirmations: Option<u32>,
    fee_per_vbyte: Option<u64>,
    min_fee: Option<Amount>,
    max_fee: Option<Amount>,
    balance_interval_secs: Option<u64>,
    broadcast_interval_secs: Option<u64>,
    observation_page_size: Option<usize>,
    retry: Option<RetryConfig>,
    request_timeout_secs: Option<u64>,
    database_directory: Option<PathBuf>,
    metrics_port: Option<u16>,
}

impl Default for RelayConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            config_file_path: None,
            log_file_path: None,
            network: None,
            provider: None,
            asset_id: None,
            asset_name: None,
            min_confirmations: None,
            fee_per_vbyte: None,
            min_fee: None,
            max_fee: None,
            balance_interval_secs: None,
            broadcast_interval_secs: None,
            observation_page_size: None,
            retry: None,
            request_timeout_secs: None,
            database_directory: None,
            metrics_port: None,
        }
    }

    #[must_use]
    pub fn config_file_path(mut self, path: PathBuf) -> Self {
        self.config_file_path = Some(path);
        self
    }

    #[must_use]
    pub fn log_file_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_file_path = path;
        self
    }

    #[must_use]
    pub const fn network(mut self, network: Network) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn asset<S: Into<String>>(mut self, id: S, name: S) -> Self {
        self.asset_id = Some(id.into());
        self.asset_name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn min_confirmations(mut self, confirmations: u32) -> Self {
        self.min_confirmations = Some(confirmations);
        self
    }

    #[must_use]
    pub const fn fee_per_vbyte(mut self, sats: u64) -> Self {
        self.fee_per_vbyte = Some(sats);
        self
    }

    #[must_use]
    pub const fn fee_range(mut self, min_fee: Amount, max_fee: Amount) -> Self {
        self.min_fee = Some(min_fee);
        self.max_fee = Some(max_fee);
        self
    }

    #[must_use]
    pub const fn balance_interval_secs(mut self, secs: u64) -> Self {
        self.balance_interval_secs = Some(secs);
        self
    }

    #[must_use]
    pub const fn broadcast_interval_secs(mut self, secs: u64) -> Self {
        self.broadcast_interval_secs = Some(secs);
        self
    }

    #[must_use]
    pub const fn observation_page_size(mut self, size: usize) -> Self {
        self.observation_page_size = Some(size);
        self
    }

    #[must_use]
    pub const fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    #[must_use]
    pub const fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    #[must_use]
    pub fn database_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_directory = Some(path.into());
        self
    }

    #[must_use]
    pub const fn metrics_port(mut self, port: u16) -> Self {
        self.metrics_port = Some(port);
        self
    }

    pub fn build(self) -> Result<RelayConfig, NodeError> {
        let mut cfg = RelayConfig {
            log_file_path: self.log_file_path,
            ..RelayConfig::default()
        };

        if let Some(path) = self.config_file_path {
            cfg.config_file_path = path;
        }
        if let Some(network) = self.network {
            cfg.network = network;
        }
        if let Some(provider) = self.provider {
            cfg.provider = provider;
        }
        if let Some(id) = self.asset_id {
            cfg.asset_id = id;
        }
        if let Some(name) = self.asset_name {
            cfg.asset_name = name;
        }
        if let Some(c) = self.min_confirmations {
            cfg.min_confirmations = c;
        }
        if let Some(f) = self.fee_per_vbyte {
            cfg.fee_per_vbyte = f;
        }
        if let Some(f) = self.min_fee {
            cfg.min_fee = f;
        }
        if let Some(f) = self.max_fee {
            cfg.max_fee = f;
        }
        if let Some(s) = self.balance_interval_secs {
            cfg.balance_interval_secs = s;
        }
        if let Some(s) = self.broadcast_interval_secs {
            cfg.broadcast_interval_secs = s;
        }
        if let Some(p) = self.observation_page_size {
            cfg.observation_page_size = p;
        }
        if let Some(r) = self.retry {
            cfg.retry = r;
        }
        if let Some(t) = self.request_timeout_secs {
            cfg.request_timeout_secs = t;
        }
        if let Some(db_dir) = self.database_directory {
            cfg.database_directory = db_dir;
        }
        if let Some(p) = self.metrics_port {
            cfg.metrics_port = p;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

//! Configuration management for the linkup orchestrator
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Ordered chain set; registration fan-out follows this order.
    pub chains: Vec<ChainSettings>,
    pub artifacts: ArtifactsConfig,
    pub run: RunConfig,
    pub fees: FeeConfig,
    pub throttle: ThrottleConfig,
    pub watcher: WatcherConfig,
    pub metrics: MetricsConfig,
    pub wallet: WalletConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainSettings {
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub gateway_address: String,
    pub gas_receiver_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    pub token: String,
    pub linker: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub source_chain: String,
    pub destination_chain: String,
    /// Transfer amount in base token units.
    pub amount: u128,
    /// Defaults to the orchestrator wallet's own address when unset.
    pub recipient: Option<String>,
    pub proceed_after_failed_submission: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    pub gas_limit: u64,
    pub oracle: GasOracleKind,
    pub fixed_gas_price: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasOracleKind {
    Provider,
    Fixed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Pause between per-chain registration calls.
    pub registration_delay_ms: u64,
    /// Pause after the last registration before the transfer phase.
    pub settle_delay_ms: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    pub initial_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_polls: u64,
    pub wait_forever: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

impl Settings {
    /// Load settings from the configured file path
    pub fn load() -> Result<Self> {
        let config_path = env::var("LINKUP_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from an explicit file path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chains.len() < 2 {
            anyhow::bail!(
                "At least two chains must be configured, found {}",
                self.chains.len()
            );
        }

        for chain in &self.chains {
            if chain.rpc_urls.is_empty() {
                anyhow::bail!("Chain {} has no RPC URLs configured", chain.name);
            }
            if chain.gateway_address.is_empty() || chain.gas_receiver_address.is_empty() {
                anyhow::bail!(
                    "Chain {} is missing gateway or gas receiver address",
                    chain.name
                );
            }
            if self
                .chains
                .iter()
                .filter(|c| c.name == chain.name)
                .count()
                > 1
            {
                anyhow::bail!("Chain name {} is configured more than once", chain.name);
            }
        }

        if self.chain(&self.run.source_chain).is_none() {
            anyhow::bail!("Source chain {} is not configured", self.run.source_chain);
        }
        if self.chain(&self.run.destination_chain).is_none() {
            anyhow::bail!(
                "Destination chain {} is not configured",
                self.run.destination_chain
            );
        }
        if self.run.source_chain == self.run.destination_chain {
            anyhow::bail!("Source and destination chain must differ");
        }
        if self.run.amount == 0 {
            anyhow::bail!("Transfer amount must be positive");
        }

        if self.artifacts.token.is_empty() || self.artifacts.linker.is_empty() {
            anyhow::bail!("Artifact paths for token and linker must be set");
        }

        if self.fees.gas_limit == 0 {
            anyhow::bail!("Gas limit must be positive");
        }
        if self.fees.oracle == GasOracleKind::Fixed && self.fees.fixed_gas_price <= 0.0 {
            anyhow::bail!("Fixed gas price must be positive");
        }

        if self.watcher.poll_interval_ms == 0 {
            anyhow::bail!("Watcher poll interval must be positive");
        }
        if !self.watcher.wait_forever && self.watcher.max_polls == 0 {
            anyhow::bail!("Watcher max_polls must be positive unless wait_forever is set");
        }

        Ok(())
    }

    /// Get chain settings by name
    pub fn chain(&self, name: &str) -> Option<&ChainSettings> {
        self.chains.iter().find(|c| c.name == name)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

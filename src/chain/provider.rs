//! Per-chain HTTP provider pool with automatic failover
//!
//! Each chain may list several RPC URLs; reads rotate to the next URL when
//! the active one fails and give up only once the whole pool has been
//! tried.

use crate::config::ChainSettings;
use crate::error::{LinkupError, LinkupResult};

use ethers::providers::{Http, Middleware, Provider};
use ethers::types::U256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, warn};

#[derive(Debug)]
pub struct ChainProvider {
    settings: ChainSettings,
    pool: Vec<Provider<Http>>,
    active: AtomicUsize,
}

impl ChainProvider {
    /// Build the pool from the chain's configured RPC URLs. URLs that fail
    /// to parse are skipped; an empty pool is a connection error.
    pub fn new(settings: ChainSettings) -> LinkupResult<Self> {
        let mut pool = Vec::with_capacity(settings.rpc_urls.len());

        for url in &settings.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    pool.push(provider.interval(Duration::from_millis(100)));
                    debug!(chain = %settings.name, url = %url, "RPC provider added");
                }
                Err(e) => {
                    warn!(chain = %settings.name, url = %url, error = %e, "Skipping unparseable RPC URL");
                }
            }
        }

        if pool.is_empty() {
            return Err(LinkupError::ChainConnection {
                chain: settings.name.clone(),
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            settings,
            pool,
            active: AtomicUsize::new(0),
        })
    }

    /// The currently active provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.active.load(Ordering::Relaxed);
        &self.pool[idx % self.pool.len()]
    }

    /// Rotate to the next provider in the pool
    pub fn failover(&self) {
        let current = self.active.load(Ordering::Relaxed);
        let next = (current + 1) % self.pool.len();
        self.active.store(next, Ordering::Relaxed);
        warn!(chain = %self.settings.name, provider = next, "Failing over to next RPC provider");
    }

    /// Current block number, trying every provider in the pool once
    pub async fn get_block_number(&self) -> LinkupResult<u64> {
        for _ in 0..self.pool.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(chain = %self.settings.name, error = %e, "Block number query failed");
                    self.failover();
                }
            }
        }

        Err(LinkupError::ChainConnection {
            chain: self.settings.name.clone(),
            message: "All providers failed".to_string(),
        })
    }

    /// Current node gas price, trying every provider in the pool once
    pub async fn get_gas_price(&self) -> LinkupResult<U256> {
        for _ in 0..self.pool.len() {
            match self.http().get_gas_price().await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    warn!(chain = %self.settings.name, error = %e, "Gas price query failed");
                    self.failover();
                }
            }
        }

        Err(LinkupError::GasEstimation(format!(
            "All providers failed to report a gas price for chain {}",
            self.settings.name
        )))
    }

    /// A chain is healthy when any provider answers a block number query
    pub async fn health_check(&self) -> bool {
        match self.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                error!(chain = %self.settings.name, error = %e, "Health check failed");
                false
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }
}

//! Gas price oracle collaborators and fee sizing
//!
//! The cross-chain send pays its relay fee in native value sized from a
//! per-transfer gas price quote. The quote source is pluggable: the
//! provider-backed oracle asks the source chain's node, the fixed oracle
//! returns a constant for local environments.

use crate::chain::ChainManager;
use crate::config::{GasOracleKind, Settings};
use crate::error::LinkupResult;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

/// Gas price quote source for a transfer between two chains.
///
/// `fee_token` selects the asset the fee is quoted in; the zero address
/// means the chain's native asset.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GasOracle: Send + Sync {
    async fn gas_price(
        &self,
        source: &str,
        destination: &str,
        fee_token: Address,
    ) -> LinkupResult<f64>;
}

/// Oracle backed by the source chain's node gas price
pub struct ProviderGasOracle {
    manager: Arc<ChainManager>,
}

impl ProviderGasOracle {
    pub fn new(manager: Arc<ChainManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl GasOracle for ProviderGasOracle {
    async fn gas_price(
        &self,
        source: &str,
        destination: &str,
        _fee_token: Address,
    ) -> LinkupResult<f64> {
        let handle = self.manager.get(source)?;
        let price = handle.provider().get_gas_price().await?;
        // Gas prices fit comfortably below 2^128 wei
        let price = price.low_u128() as f64;
        debug!(source, destination, price, "Gas price quoted by node");
        Ok(price)
    }
}

/// Constant-price oracle for local environments
pub struct FixedGasOracle {
    price: f64,
}

impl FixedGasOracle {
    pub fn new(price: f64) -> Self {
        Self { price }
    }
}

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn gas_price(
        &self,
        _source: &str,
        _destination: &str,
        _fee_token: Address,
    ) -> LinkupResult<f64> {
        Ok(self.price)
    }
}

/// Build the configured oracle
pub fn oracle_from_settings(settings: &Settings, manager: Arc<ChainManager>) -> Arc<dyn GasOracle> {
    match settings.fees.oracle {
        GasOracleKind::Provider => Arc::new(ProviderGasOracle::new(manager)),
        GasOracleKind::Fixed => Arc::new(FixedGasOracle::new(settings.fees.fixed_gas_price)),
    }
}

/// Fee payment in wei: gas limit times quoted price, rounded up so the
/// paid fee never undershoots the quote.
pub fn fee_payment(gas_limit: u64, gas_price: f64) -> U256 {
    let fee = (gas_limit as f64 * gas_price).ceil();
    U256::from(fee as u128)
}

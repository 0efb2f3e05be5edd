//! Remote contract call surface
//!
//! Each chain is driven through the [`TokenChain`] trait: deploys, token
//! calls and the cross-chain send. The production implementation signs over
//! the failover provider; tests substitute mocks or in-memory fakes.

pub mod artifact;
pub mod bindings;
pub mod evm;

pub use artifact::{ArtifactSet, ContractArtifact};
pub use evm::{load_wallet, EvmTokenClient};

use crate::error::{LinkupError, LinkupResult};
use crate::transfer::TransferReceipt;

use async_trait::async_trait;
use ethers::types::{Address, U256};
use std::collections::HashMap;
use std::sync::Arc;

/// Role identifier the token contract checks for mint authority
pub fn minter_role() -> [u8; 32] {
    ethers::utils::keccak256("MINTER_ROLE".as_bytes())
}

/// Per-chain contract call surface.
///
/// Every mutating call resolves only once the transaction is mined, so a
/// returned `Ok` is a confirmation and an `Err` carries the revert or
/// transport diagnosis.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenChain: Send + Sync {
    /// Chain this client is bound to
    fn chain_name(&self) -> String;

    /// Transaction-signing account
    fn account(&self) -> Address;

    /// Deploy the token contract (no constructor arguments)
    async fn deploy_token(&self) -> LinkupResult<Address>;

    /// Deploy the linker contract wired to this chain's gateway, gas
    /// receiver and the given token
    async fn deploy_linker(&self, token: Address) -> LinkupResult<Address>;

    async fn mint(&self, token: Address, recipient: Address, amount: U256) -> LinkupResult<()>;

    async fn balance_of(&self, token: Address, account: Address) -> LinkupResult<U256>;

    async fn increase_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> LinkupResult<()>;

    /// Register the full peer broadcast list with this chain's linker
    async fn add_linkers(
        &self,
        linker: Address,
        peer_addresses: Vec<Address>,
        peer_names: Vec<String>,
    ) -> LinkupResult<()>;

    /// Grant the minter role on the token to the given account
    async fn grant_minter(&self, token: Address, grantee: Address) -> LinkupResult<()>;

    /// Submit the cross-chain send with the fee attached as value
    async fn send_token(
        &self,
        linker: Address,
        destination: String,
        recipient: Address,
        amount: U256,
        fee: U256,
    ) -> LinkupResult<TransferReceipt>;

    /// Current node gas price in wei
    async fn gas_price(&self) -> LinkupResult<U256>;
}

impl std::fmt::Debug for dyn TokenChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenChain({})", self.chain_name())
    }
}

/// Clients indexed by chain name
pub type ClientMap = HashMap<String, Arc<dyn TokenChain>>;

/// Look up the client for a chain
pub fn client_for(clients: &ClientMap, name: &str) -> LinkupResult<Arc<dyn TokenChain>> {
    clients
        .get(name)
        .cloned()
        .ok_or_else(|| LinkupError::ChainNotFound {
            name: name.to_string(),
        })
}

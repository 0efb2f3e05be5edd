//! EVM-backed implementation of the contract call surface
//!
//! Signs with a local wallet over the chain's failover provider. The signer
//! stack is rebuilt per call so a provider failover takes effect on the next
//! call, and every mutating call is awaited to a mined receipt before it
//! resolves.

use super::artifact::ArtifactSet;
use super::bindings::{CrossChainToken, TokenLinker};
use super::{minter_role, TokenChain};
use crate::chain::ChainHandle;
use crate::config::WalletConfig;
use crate::error::{LinkupError, LinkupResult};
use crate::transfer::TransferReceipt;

use async_trait::async_trait;
use chrono::Utc;
use ethers::contract::{ContractError, ContractFactory};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, TransactionReceipt, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

type EvmClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Load the signing wallet from the configured environment variable
pub fn load_wallet(config: &WalletConfig) -> LinkupResult<LocalWallet> {
    let key = std::env::var(&config.private_key_env).map_err(|_| {
        LinkupError::Wallet(format!(
            "No wallet configured. Set {} to a private key",
            config.private_key_env
        ))
    })?;
    key.parse::<LocalWallet>()
        .map_err(|e| LinkupError::Wallet(format!("Invalid private key: {}", e)))
}

/// Broadcast attempts give up after this long; confirmation waits are
/// bounded by the provider's own polling.
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Signing client for one chain
pub struct EvmTokenClient {
    handle: Arc<ChainHandle>,
    wallet: LocalWallet,
    artifacts: ArtifactSet,
    gas_limit: U256,
}

impl EvmTokenClient {
    /// Connect a signing client to one chain.
    ///
    /// Queries the node chain id so the wallet signs EIP-155 transactions
    /// for the right chain.
    pub async fn connect(
        handle: Arc<ChainHandle>,
        wallet: LocalWallet,
        artifacts: ArtifactSet,
        gas_limit: u64,
    ) -> LinkupResult<Self> {
        let chain_id = handle
            .provider()
            .http()
            .get_chainid()
            .await
            .map_err(|e| LinkupError::ChainConnection {
                chain: handle.name().to_string(),
                message: format!("Failed to fetch chain id: {}", e),
            })?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());

        info!(
            chain = handle.name(),
            chain_id = chain_id.as_u64(),
            wallet = ?wallet.address(),
            "Signing client connected"
        );

        Ok(Self {
            handle,
            wallet,
            artifacts,
            gas_limit: U256::from(gas_limit),
        })
    }

    /// Build the signer stack over the currently active provider
    fn client(&self) -> Arc<EvmClient> {
        let provider = self.handle.provider();
        Arc::new(SignerMiddleware::new(
            provider.http().clone(),
            self.wallet.clone(),
        ))
    }

    fn chain(&self) -> String {
        self.handle.name().to_string()
    }

    /// Await a broadcast transaction to a successful mined receipt
    async fn confirm(
        &self,
        operation: &str,
        pending: PendingTransaction<'_, Http>,
    ) -> LinkupResult<TransactionReceipt> {
        let tx_hash = *pending;
        let receipt = pending
            .await
            .map_err(|e| LinkupError::ChainConnection {
                chain: self.chain(),
                message: format!("{} confirmation failed for {:?}: {}", operation, tx_hash, e),
            })?
            .ok_or_else(|| LinkupError::Submission {
                chain: self.chain(),
                message: format!("{} transaction {:?} dropped before mining", operation, tx_hash),
            })?;

        if receipt.status != Some(1.into()) {
            return Err(LinkupError::Reverted {
                chain: self.chain(),
                message: format!(
                    "{} transaction {:?} reverted in block {:?}",
                    operation, receipt.transaction_hash, receipt.block_number
                ),
            });
        }

        Ok(receipt)
    }

    fn deploy_error(&self, contract: &str, e: ContractError<EvmClient>) -> LinkupError {
        LinkupError::Deployment {
            chain: self.chain(),
            contract: contract.to_string(),
            message: e.to_string(),
        }
    }

    /// Classify a failed broadcast for a non-transfer call
    fn call_error(&self, operation: &str, e: ContractError<EvmClient>) -> LinkupError {
        let message = format!("{} failed: {}", operation, e);
        if matches!(e, ContractError::Revert(_)) || message.contains("revert") {
            LinkupError::Reverted {
                chain: self.chain(),
                message,
            }
        } else {
            LinkupError::Contract(message)
        }
    }

    /// Classify a failed transfer broadcast for the tri-state mapping:
    /// reverts and known node rejections are definitive, anything else is
    /// transport-level and the transaction may still exist.
    fn classify_send_error(&self, e: ContractError<EvmClient>) -> LinkupError {
        let message = e.to_string();
        if matches!(e, ContractError::Revert(_)) || message.contains("revert") {
            return LinkupError::Reverted {
                chain: self.chain(),
                message,
            };
        }
        if message.contains("insufficient funds") || message.contains("nonce too low") {
            return LinkupError::Submission {
                chain: self.chain(),
                message,
            };
        }
        LinkupError::ChainConnection {
            chain: self.chain(),
            message,
        }
    }
}

#[async_trait]
impl TokenChain for EvmTokenClient {
    fn chain_name(&self) -> String {
        self.chain()
    }

    fn account(&self) -> Address {
        self.wallet.address()
    }

    async fn deploy_token(&self) -> LinkupResult<Address> {
        let factory = ContractFactory::new(
            self.artifacts.token.abi.clone(),
            self.artifacts.token.bytecode.clone(),
            self.client(),
        );
        let deployer = factory
            .deploy(())
            .map_err(|e| self.deploy_error("token", e))?;
        let contract = deployer
            .send()
            .await
            .map_err(|e| self.deploy_error("token", e))?;

        debug!(chain = %self.chain(), address = ?contract.address(), "Token deployed");
        Ok(contract.address())
    }

    async fn deploy_linker(&self, token: Address) -> LinkupResult<Address> {
        let args = (
            self.handle.name().to_string(),
            self.handle.gateway(),
            self.handle.gas_receiver(),
            token,
        );
        let factory = ContractFactory::new(
            self.artifacts.linker.abi.clone(),
            self.artifacts.linker.bytecode.clone(),
            self.client(),
        );
        let deployer = factory
            .deploy(args)
            .map_err(|e| self.deploy_error("linker", e))?;
        let contract = deployer
            .send()
            .await
            .map_err(|e| self.deploy_error("linker", e))?;

        debug!(chain = %self.chain(), address = ?contract.address(), "Linker deployed");
        Ok(contract.address())
    }

    async fn mint(&self, token: Address, recipient: Address, amount: U256) -> LinkupResult<()> {
        let contract = CrossChainToken::new(token, self.client());
        let call = contract.mint(recipient, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| self.call_error("mint", e))?;
        self.confirm("mint", pending).await?;
        Ok(())
    }

    async fn balance_of(&self, token: Address, account: Address) -> LinkupResult<U256> {
        let contract = CrossChainToken::new(token, self.client());
        contract
            .balance_of(account)
            .call()
            .await
            .map_err(|e| LinkupError::ChainConnection {
                chain: self.chain(),
                message: format!("balanceOf query failed: {}", e),
            })
    }

    async fn increase_allowance(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> LinkupResult<()> {
        let contract = CrossChainToken::new(token, self.client());
        let call = contract.increase_allowance(spender, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| self.call_error("increaseAllowance", e))?;
        self.confirm("increaseAllowance", pending).await?;
        Ok(())
    }

    async fn add_linkers(
        &self,
        linker: Address,
        peer_addresses: Vec<Address>,
        peer_names: Vec<String>,
    ) -> LinkupResult<()> {
        let contract = TokenLinker::new(linker, self.client());
        let call = contract
            .add_linkers(peer_addresses, peer_names)
            .gas(self.gas_limit);
        let pending = call
            .send()
            .await
            .map_err(|e| self.call_error("addLinkers", e))?;
        self.confirm("addLinkers", pending).await?;
        Ok(())
    }

    async fn grant_minter(&self, token: Address, grantee: Address) -> LinkupResult<()> {
        let contract = CrossChainToken::new(token, self.client());
        let call = contract.grant_role(minter_role(), grantee);
        let pending = call
            .send()
            .await
            .map_err(|e| self.call_error("grantRole", e))?;
        self.confirm("grantRole", pending).await?;
        Ok(())
    }

    async fn send_token(
        &self,
        linker: Address,
        destination: String,
        recipient: Address,
        amount: U256,
        fee: U256,
    ) -> LinkupResult<TransferReceipt> {
        let contract = TokenLinker::new(linker, self.client());
        let call = contract
            .send_token(destination.clone(), recipient, amount)
            .value(fee)
            .gas(self.gas_limit);

        let pending = match timeout(SUBMIT_TIMEOUT, call.send()).await {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => return Err(self.classify_send_error(e)),
            Err(_) => {
                return Err(LinkupError::Timeout {
                    operation: format!("sendToken broadcast on {}", self.chain()),
                })
            }
        };

        let receipt = self.confirm("sendToken", pending).await?;
        info!(
            chain = %self.chain(),
            destination = %destination,
            tx_hash = ?receipt.transaction_hash,
            "Cross-chain send mined"
        );

        Ok(TransferReceipt {
            tx_hash: receipt.transaction_hash,
            submitted_at: Utc::now(),
        })
    }

    async fn gas_price(&self) -> LinkupResult<U256> {
        self.handle.provider().get_gas_price().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_wallet_requires_the_env_var() {
        let config = WalletConfig {
            private_key_env: "LINKUP_TEST_KEY_UNSET".to_string(),
        };
        let err = load_wallet(&config).unwrap_err();
        assert!(matches!(err, LinkupError::Wallet(_)));
    }

    #[test]
    fn test_load_wallet_parses_a_hex_key() {
        std::env::set_var(
            "LINKUP_TEST_KEY_VALID",
            "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        );
        let config = WalletConfig {
            private_key_env: "LINKUP_TEST_KEY_VALID".to_string(),
        };
        let wallet = load_wallet(&config).expect("wallet");
        assert_ne!(wallet.address(), Address::zero());
    }

    #[test]
    fn test_load_wallet_rejects_garbage() {
        std::env::set_var("LINKUP_TEST_KEY_BAD", "not-a-key");
        let config = WalletConfig {
            private_key_env: "LINKUP_TEST_KEY_BAD".to_string(),
        };
        let err = load_wallet(&config).unwrap_err();
        assert!(matches!(err, LinkupError::Wallet(_)));
    }
}

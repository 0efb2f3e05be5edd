//! Transfer intent, funding and cross-chain submission
//!
//! The initiator covers the source-chain half of a transfer: mint the
//! recipient's funds, open the linker's allowance, size the relay fee and
//! submit the send. Submission failures are folded into a tri-state status
//! instead of an error because a transport failure does not tell whether
//! the transaction exists; only the destination balance does.

use crate::chain::ChainManager;
use crate::config::{FeeConfig, Settings};
use crate::contracts::{client_for, ClientMap};
use crate::error::{LinkupError, LinkupResult};
use crate::gas::{fee_payment, GasOracle};

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Validated description of one cross-chain transfer
#[derive(Debug, Clone)]
pub struct TransferIntent {
    pub source: String,
    pub destination: String,
    pub amount: U256,
    pub recipient: Address,
}

impl TransferIntent {
    /// Build an intent, rejecting inputs no submission should ever see
    pub fn new(
        source: String,
        destination: String,
        amount: U256,
        recipient: Address,
    ) -> LinkupResult<Self> {
        if amount.is_zero() {
            return Err(LinkupError::InvalidTransfer(
                "transfer amount must be positive".to_string(),
            ));
        }
        if source == destination {
            return Err(LinkupError::InvalidTransfer(format!(
                "source and destination chain are both {}",
                source
            )));
        }

        Ok(Self {
            source,
            destination,
            amount,
            recipient,
        })
    }

    /// Build the run's intent from settings, defaulting the recipient to
    /// the orchestrator wallet
    pub fn from_settings(settings: &Settings, default_recipient: Address) -> LinkupResult<Self> {
        let recipient = match &settings.run.recipient {
            Some(raw) => raw.parse::<Address>().map_err(|e| {
                LinkupError::Config(format!("Invalid recipient address {}: {}", raw, e))
            })?,
            None => default_recipient,
        };

        Self::new(
            settings.run.source_chain.clone(),
            settings.run.destination_chain.clone(),
            U256::from(settings.run.amount),
            recipient,
        )
    }
}

/// Confirmation of a successful submission (not of settlement)
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub tx_hash: H256,
    pub submitted_at: DateTime<Utc>,
}

/// Outcome of the cross-chain send submission
#[derive(Debug, Clone)]
pub enum TransferStatus {
    /// Mined on the source chain
    Submitted(TransferReceipt),
    /// Transport failed after broadcast; the transaction may still exist
    SubmissionUncertain { reason: String },
    /// Definitively rejected or reverted
    SubmissionFailed { reason: String },
}

impl TransferStatus {
    /// Whether the settlement watch should run for this outcome
    pub fn should_watch(&self, proceed_after_failed: bool) -> bool {
        match self {
            TransferStatus::Submitted(_) | TransferStatus::SubmissionUncertain { .. } => true,
            TransferStatus::SubmissionFailed { .. } => proceed_after_failed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransferStatus::Submitted(_) => "submitted",
            TransferStatus::SubmissionUncertain { .. } => "uncertain",
            TransferStatus::SubmissionFailed { .. } => "failed",
        }
    }
}

/// Source-chain half of the transfer flow
pub struct TransferInitiator {
    manager: Arc<ChainManager>,
    clients: Arc<ClientMap>,
    oracle: Arc<dyn GasOracle>,
    fees: FeeConfig,
}

impl TransferInitiator {
    pub fn new(
        manager: Arc<ChainManager>,
        clients: Arc<ClientMap>,
        oracle: Arc<dyn GasOracle>,
        fees: FeeConfig,
    ) -> Self {
        Self {
            manager,
            clients,
            oracle,
            fees,
        }
    }

    /// Mint the transfer amount to the recipient on the source chain
    pub async fn fund(&self, intent: &TransferIntent) -> LinkupResult<()> {
        let handle = self.manager.get(&intent.source)?;
        let client = client_for(&self.clients, &intent.source)?;
        let token = handle.token_address()?;

        client.mint(token, intent.recipient, intent.amount).await?;

        info!(
            chain = %intent.source,
            recipient = ?intent.recipient,
            amount = %intent.amount,
            "Recipient funded on source chain"
        );
        Ok(())
    }

    /// Approve the linker, size the fee and submit the cross-chain send
    pub async fn initiate(&self, intent: &TransferIntent) -> LinkupResult<TransferStatus> {
        let handle = self.manager.get(&intent.source)?;
        let client = client_for(&self.clients, &intent.source)?;
        let token = handle.token_address()?;
        let linker = handle.linker_address()?;

        // Unlimited allowance so the linker can pull the transfer amount
        client
            .increase_allowance(token, linker, U256::MAX)
            .await
            .map_err(|e| LinkupError::Allowance {
                chain: intent.source.clone(),
                message: e.to_string(),
            })?;
        info!(chain = %intent.source, spender = ?linker, "Linker allowance opened");

        let gas_price = self
            .oracle
            .gas_price(&intent.source, &intent.destination, Address::zero())
            .await?;
        let fee = fee_payment(self.fees.gas_limit, gas_price);
        info!(
            source = %intent.source,
            destination = %intent.destination,
            gas_limit = self.fees.gas_limit,
            gas_price,
            fee = %fee,
            "Submitting cross-chain send"
        );

        let status = match client
            .send_token(
                linker,
                intent.destination.clone(),
                intent.recipient,
                intent.amount,
                fee,
            )
            .await
        {
            Ok(receipt) => {
                info!(tx_hash = ?receipt.tx_hash, "Transfer submitted");
                TransferStatus::Submitted(receipt)
            }
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "Submission outcome unknown, deferring to the settlement watch");
                TransferStatus::SubmissionUncertain {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!(error = %e, "Submission definitively failed");
                TransferStatus::SubmissionFailed {
                    reason: e.to_string(),
                }
            }
        };

        crate::metrics::record_submission(&intent.source, status.label());
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::MockTokenChain;
    use crate::gas::FixedGasOracle;

    fn test_settings() -> Settings {
        toml::from_str(
            r#"
[[chains]]
name = "Avalanche"
rpc_urls = ["http://localhost:8500/0"]
gateway_address = "0x0000000000000000000000000000000000000001"
gas_receiver_address = "0x0000000000000000000000000000000000000002"

[[chains]]
name = "Fantom"
rpc_urls = ["http://localhost:8500/1"]
gateway_address = "0x0000000000000000000000000000000000000003"
gas_receiver_address = "0x0000000000000000000000000000000000000004"

[artifacts]
token = "artifacts/token.json"
linker = "artifacts/linker.json"

[run]
source_chain = "Avalanche"
destination_chain = "Fantom"
amount = 100000
proceed_after_failed_submission = false

[fees]
gas_limit = 500000
oracle = "fixed"
fixed_gas_price = 1.0

[throttle]
registration_delay_ms = 0
settle_delay_ms = 0
backoff_base_ms = 1
backoff_max_ms = 2

[watcher]
initial_delay_ms = 0
poll_interval_ms = 1
max_polls = 10
wait_forever = false

[metrics]
enabled = false
port = 9091

[wallet]
private_key_env = "LINKUP_PRIVATE_KEY"
"#,
        )
        .expect("settings")
    }

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    fn deployed_manager(settings: &Settings) -> Arc<ChainManager> {
        let manager = Arc::new(ChainManager::new(settings).expect("manager"));
        for (i, handle) in manager.handles().iter().enumerate() {
            handle.set_token_address(addr(0x10 + i as u8)).expect("token");
            handle.set_linker_address(addr(0x20 + i as u8)).expect("linker");
        }
        manager
    }

    fn initiator_with(source_mock: MockTokenChain) -> TransferInitiator {
        let settings = test_settings();
        let manager = deployed_manager(&settings);
        let mut clients = ClientMap::new();
        clients.insert(
            "Avalanche".to_string(),
            Arc::new(source_mock) as Arc<dyn crate::contracts::TokenChain>,
        );
        TransferInitiator::new(
            manager,
            Arc::new(clients),
            Arc::new(FixedGasOracle::new(1.0)),
            settings.fees.clone(),
        )
    }

    fn intent() -> TransferIntent {
        TransferIntent::new(
            "Avalanche".to_string(),
            "Fantom".to_string(),
            U256::from(100_000u64),
            addr(0xEE),
        )
        .expect("intent")
    }

    #[test]
    fn test_zero_amount_rejected() {
        let err = TransferIntent::new(
            "Avalanche".to_string(),
            "Fantom".to_string(),
            U256::zero(),
            addr(0xEE),
        )
        .unwrap_err();
        assert!(matches!(err, LinkupError::InvalidTransfer(_)));
    }

    #[test]
    fn test_same_chain_transfer_rejected() {
        let err = TransferIntent::new(
            "Avalanche".to_string(),
            "Avalanche".to_string(),
            U256::from(1u64),
            addr(0xEE),
        )
        .unwrap_err();
        assert!(matches!(err, LinkupError::InvalidTransfer(_)));
    }

    #[test]
    fn test_recipient_defaults_to_wallet() {
        let settings = test_settings();
        let intent = TransferIntent::from_settings(&settings, addr(0xAB)).expect("intent");
        assert_eq!(intent.recipient, addr(0xAB));
        assert_eq!(intent.amount, U256::from(100_000u64));
    }

    #[test]
    fn test_failed_submission_watch_policy() {
        let failed = TransferStatus::SubmissionFailed {
            reason: "reverted".to_string(),
        };
        assert!(!failed.should_watch(false));
        assert!(failed.should_watch(true));

        let uncertain = TransferStatus::SubmissionUncertain {
            reason: "timeout".to_string(),
        };
        assert!(uncertain.should_watch(false));
    }

    #[tokio::test]
    async fn test_initiate_maps_revert_to_failed_status() {
        let mut mock = MockTokenChain::new();
        mock.expect_increase_allowance()
            .returning(|_, _, _| Ok(()));
        mock.expect_send_token().returning(|_, _, _, _, _| {
            Err(LinkupError::Reverted {
                chain: "Avalanche".to_string(),
                message: "no linker for destination".to_string(),
            })
        });

        let status = initiator_with(mock)
            .initiate(&intent())
            .await
            .expect("status");
        assert!(matches!(status, TransferStatus::SubmissionFailed { .. }));
    }

    #[tokio::test]
    async fn test_initiate_maps_transport_error_to_uncertain_status() {
        let mut mock = MockTokenChain::new();
        mock.expect_increase_allowance()
            .returning(|_, _, _| Ok(()));
        mock.expect_send_token().returning(|_, _, _, _, _| {
            Err(LinkupError::ChainConnection {
                chain: "Avalanche".to_string(),
                message: "connection reset".to_string(),
            })
        });

        let status = initiator_with(mock)
            .initiate(&intent())
            .await
            .expect("status");
        assert!(matches!(status, TransferStatus::SubmissionUncertain { .. }));
    }

    #[tokio::test]
    async fn test_allowance_failure_is_fatal() {
        let mut mock = MockTokenChain::new();
        mock.expect_increase_allowance().returning(|_, _, _| {
            Err(LinkupError::Contract("increaseAllowance failed".to_string()))
        });

        let err = initiator_with(mock).initiate(&intent()).await.unwrap_err();
        assert!(matches!(err, LinkupError::Allowance { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_initiate_opens_unlimited_allowance_and_pays_fee() {
        let mut mock = MockTokenChain::new();
        mock.expect_increase_allowance()
            .withf(|_, _, amount| *amount == U256::MAX)
            .times(1)
            .returning(|_, _, _| Ok(()));
        mock.expect_send_token()
            .withf(|_, destination, _, amount, fee| {
                destination == "Fantom"
                    && *amount == U256::from(100_000u64)
                    && *fee == U256::from(500_000u64)
            })
            .times(1)
            .returning(|_, _, _, _, _| {
                Ok(TransferReceipt {
                    tx_hash: H256::zero(),
                    submitted_at: Utc::now(),
                })
            });

        let status = initiator_with(mock)
            .initiate(&intent())
            .await
            .expect("status");
        assert!(matches!(status, TransferStatus::Submitted(_)));
    }

    #[tokio::test]
    async fn test_fund_mints_to_recipient() {
        let mut mock = MockTokenChain::new();
        mock.expect_mint()
            .withf(|_, recipient, amount| {
                *recipient == addr(0xEE) && *amount == U256::from(100_000u64)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        initiator_with(mock).fund(&intent()).await.expect("funded");
    }
}

//! Settlement detection by destination balance divergence
//!
//! Cross-chain completion is observed, not tracked: the watcher snapshots
//! the recipient's destination balance before submission and reports
//! settled the moment a later read differs from it. The wait is bounded,
//! cancellable, and treats poll failures as transient.

use crate::config::WatcherConfig;
use crate::contracts::{client_for, ClientMap};
use crate::error::{LinkupError, LinkupResult};
use crate::throttle::Throttle;
use crate::transfer::TransferStatus;

use chrono::{DateTime, Utc};
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Destination balance recorded before submission
#[derive(Debug, Clone)]
pub struct BalanceSnapshot {
    pub chain: String,
    pub token: Address,
    pub account: Address,
    pub value: U256,
    pub taken_at: DateTime<Utc>,
}

/// Outcome of a completed settlement watch
#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub final_balance: U256,
    pub polls: u64,
    pub elapsed: Duration,
}

/// Polls the destination chain until the watched balance diverges
pub struct SettlementWatcher {
    clients: Arc<ClientMap>,
    config: WatcherConfig,
    throttle: Throttle,
    shutdown: Arc<RwLock<bool>>,
}

impl SettlementWatcher {
    pub fn new(
        clients: Arc<ClientMap>,
        config: WatcherConfig,
        throttle: Throttle,
        shutdown: Arc<RwLock<bool>>,
    ) -> Self {
        Self {
            clients,
            config,
            throttle,
            shutdown,
        }
    }

    /// Record the pre-transfer balance the watch will compare against
    pub async fn snapshot(
        &self,
        chain: &str,
        token: Address,
        account: Address,
    ) -> LinkupResult<BalanceSnapshot> {
        let client = client_for(&self.clients, chain)?;
        let value = client.balance_of(token, account).await?;

        debug!(chain, account = ?account, balance = %value, "Balance snapshot taken");

        Ok(BalanceSnapshot {
            chain: chain.to_string(),
            token,
            account,
            value,
            taken_at: Utc::now(),
        })
    }

    /// Wait until the watched balance differs from the snapshot.
    ///
    /// Every attempt counts toward the poll budget, failed reads included,
    /// so a bounded watch stays bounded. Cancellation is checked on every
    /// iteration.
    pub async fn wait_for_settlement(
        &self,
        snapshot: &BalanceSnapshot,
        status: &TransferStatus,
    ) -> LinkupResult<SettlementReport> {
        let client = client_for(&self.clients, &snapshot.chain)?;
        let started = Instant::now();

        info!(
            chain = %snapshot.chain,
            account = ?snapshot.account,
            baseline = %snapshot.value,
            submission = status.label(),
            "Watching for settlement"
        );

        if self.config.initial_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.initial_delay_ms)).await;
        }

        let mut polls: u64 = 0;
        let mut failures: u32 = 0;

        loop {
            if *self.shutdown.read().await {
                warn!(polls, "Settlement watch cancelled");
                return Err(LinkupError::Cancelled {
                    phase: "settlement watch".to_string(),
                });
            }

            if !self.config.wait_forever && polls >= self.config.max_polls {
                error!(
                    polls,
                    submission = status.label(),
                    "Settlement not observed within the poll budget"
                );
                return Err(LinkupError::SettlementTimeout {
                    chain: snapshot.chain.clone(),
                    polls,
                    submission: status.label(),
                });
            }

            polls += 1;
            crate::metrics::record_settlement_poll(&snapshot.chain);

            match client.balance_of(snapshot.token, snapshot.account).await {
                Ok(balance) if balance != snapshot.value => {
                    let report = SettlementReport {
                        final_balance: balance,
                        polls,
                        elapsed: started.elapsed(),
                    };
                    info!(
                        chain = %snapshot.chain,
                        polls,
                        balance = %balance,
                        elapsed_ms = report.elapsed.as_millis() as u64,
                        "Settlement observed"
                    );
                    crate::metrics::record_settlement(&snapshot.chain, report.elapsed.as_secs_f64());
                    return Ok(report);
                }
                Ok(balance) => {
                    failures = 0;
                    debug!(poll = polls, balance = %balance, "Balance unchanged");
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
                Err(e) => {
                    failures += 1;
                    let delay = self.throttle.backoff_delay(failures);
                    warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        "Balance poll failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

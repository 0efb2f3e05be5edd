//! End-to-end orchestration of the token linking flow
//!
//! Drives the phases in order: deploy everywhere, fund the recipient,
//! wire the linker topology, snapshot the destination, submit the
//! transfer, then watch for settlement. Cancellation is cooperative and
//! checked at phase boundaries and inside the settlement watch.

use crate::chain::ChainManager;
use crate::config::Settings;
use crate::contracts::{client_for, ClientMap};
use crate::deploy::ContractDeployer;
use crate::error::{LinkupError, LinkupResult};
use crate::gas::GasOracle;
use crate::report::{Phase, ProgressReporter};
use crate::settlement::{SettlementReport, SettlementWatcher};
use crate::throttle::Throttle;
use crate::topology::TopologyBuilder;
use crate::transfer::{TransferInitiator, TransferIntent, TransferStatus};

use ethers::types::{Address, U256};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub struct Orchestrator {
    settings: Settings,
    manager: Arc<ChainManager>,
    clients: Arc<ClientMap>,
    deployer: ContractDeployer,
    topology: TopologyBuilder,
    initiator: TransferInitiator,
    watcher: SettlementWatcher,
    reporter: ProgressReporter,
    shutdown: Arc<RwLock<bool>>,
}

impl Orchestrator {
    /// Wire the phase services over one chain manager and client set
    pub fn new(
        settings: Settings,
        manager: Arc<ChainManager>,
        clients: ClientMap,
        oracle: Arc<dyn GasOracle>,
    ) -> LinkupResult<Self> {
        for handle in manager.handles() {
            if !clients.contains_key(handle.name()) {
                return Err(LinkupError::Config(format!(
                    "No client wired for configured chain {}",
                    handle.name()
                )));
            }
        }

        let clients = Arc::new(clients);
        let throttle = Throttle::new(settings.throttle.clone());
        let shutdown = Arc::new(RwLock::new(false));

        let deployer = ContractDeployer::new(manager.clone(), clients.clone());
        let topology = TopologyBuilder::new(manager.clone(), clients.clone(), throttle.clone());
        let initiator = TransferInitiator::new(
            manager.clone(),
            clients.clone(),
            oracle,
            settings.fees.clone(),
        );
        let watcher = SettlementWatcher::new(
            clients.clone(),
            settings.watcher.clone(),
            throttle,
            shutdown.clone(),
        );

        Ok(Self {
            settings,
            manager,
            clients,
            deployer,
            topology,
            initiator,
            watcher,
            reporter: ProgressReporter::new(),
            shutdown,
        })
    }

    /// Request cooperative cancellation
    pub async fn stop(&self) {
        *self.shutdown.write().await = true;
        info!("Orchestrator stop requested");
    }

    /// Drive the full flow and return the settlement report
    pub async fn run(&self) -> LinkupResult<SettlementReport> {
        let intent = self.intent()?;
        info!(
            source = %intent.source,
            destination = %intent.destination,
            amount = %intent.amount,
            recipient = ?intent.recipient,
            "Transfer intent"
        );

        self.ensure_running(Phase::Deployment).await?;
        let span = self.reporter.phase_started(Phase::Deployment);
        self.deployer.deploy_all().await?;
        self.reporter.phase_completed(span);
        self.report_balances("initial", &intent).await;

        self.ensure_running(Phase::Funding).await?;
        let span = self.reporter.phase_started(Phase::Funding);
        self.initiator.fund(&intent).await?;
        self.reporter.phase_completed(span);
        self.report_balances("funded", &intent).await;

        self.ensure_running(Phase::Topology).await?;
        let span = self.reporter.phase_started(Phase::Topology);
        self.topology.register_all().await?;
        self.topology.verify_symmetric().await?;
        self.reporter.phase_completed(span);

        self.ensure_running(Phase::Initiation).await?;
        let span = self.reporter.phase_started(Phase::Initiation);
        // Snapshot before submission so only the transfer itself can move
        // the watched balance
        let destination = self.manager.get(&intent.destination)?;
        let snapshot = self
            .watcher
            .snapshot(
                &intent.destination,
                destination.token_address()?,
                intent.recipient,
            )
            .await?;
        let status = self.initiator.initiate(&intent).await?;
        self.reporter.phase_completed(span);

        if !status.should_watch(self.settings.run.proceed_after_failed_submission) {
            let reason = match &status {
                TransferStatus::SubmissionFailed { reason } => reason.clone(),
                _ => "submission failed".to_string(),
            };
            return Err(LinkupError::Submission {
                chain: intent.source.clone(),
                message: reason,
            });
        }

        self.ensure_running(Phase::Settlement).await?;
        let span = self.reporter.phase_started(Phase::Settlement);
        let report = self.watcher.wait_for_settlement(&snapshot, &status).await?;
        self.reporter.phase_completed(span);

        self.reporter.settled(&snapshot, &report);
        self.report_balances("settled", &intent).await;
        self.reporter.finished();

        Ok(report)
    }

    fn intent(&self) -> LinkupResult<TransferIntent> {
        let source_client = client_for(&self.clients, &self.settings.run.source_chain)?;
        TransferIntent::from_settings(&self.settings, source_client.account())
    }

    async fn ensure_running(&self, phase: Phase) -> LinkupResult<()> {
        if *self.shutdown.read().await {
            return Err(LinkupError::Cancelled {
                phase: phase.as_str().to_string(),
            });
        }
        Ok(())
    }

    async fn report_balances(&self, label: &str, intent: &TransferIntent) {
        for chain in [&intent.source, &intent.destination] {
            match self.balance_on(chain, intent.recipient).await {
                Ok(balance) => self.reporter.balance(label, chain, balance),
                Err(e) => warn!(chain = %chain, error = %e, "Balance report read failed"),
            }
        }
    }

    async fn balance_on(&self, chain: &str, account: Address) -> LinkupResult<U256> {
        let handle = self.manager.get(chain)?;
        let token = handle.token_address()?;
        let client = client_for(&self.clients, chain)?;
        client.balance_of(token, account).await
    }
}

//! Per-chain contract deployment
//!
//! Deploys the token and then the linker on every configured chain. Chains
//! are independent, so the fan-out runs concurrently; within one chain the
//! token must land first because the linker constructor takes its address.

use crate::chain::ChainManager;
use crate::contracts::{client_for, ClientMap};
use crate::error::{LinkupError, LinkupResult};

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::info;

pub struct ContractDeployer {
    manager: Arc<ChainManager>,
    clients: Arc<ClientMap>,
}

impl ContractDeployer {
    pub fn new(manager: Arc<ChainManager>, clients: Arc<ClientMap>) -> Self {
        Self { manager, clients }
    }

    /// Deploy token and linker on every chain and record the addresses.
    ///
    /// Any failure aborts the run; a partial deployment is not a usable
    /// topology. After the fan-out the recorded addresses are audited for
    /// completeness and pairwise distinctness.
    pub async fn deploy_all(&self) -> LinkupResult<()> {
        let mut tasks = Vec::with_capacity(self.manager.handles().len());

        for handle in self.manager.handles() {
            let client = client_for(&self.clients, handle.name())?;
            let handle = handle.clone();

            tasks.push(async move {
                let token = client
                    .deploy_token()
                    .await
                    .map_err(|e| wrap_deploy(handle.name(), "token", e))?;
                handle.set_token_address(token)?;
                info!(chain = handle.name(), address = ?token, "Token deployed");

                let linker = client
                    .deploy_linker(token)
                    .await
                    .map_err(|e| wrap_deploy(handle.name(), "linker", e))?;
                handle.set_linker_address(linker)?;
                info!(chain = handle.name(), address = ?linker, "Linker deployed");

                crate::metrics::record_deployment(handle.name());
                Ok::<_, LinkupError>(())
            });
        }

        try_join_all(tasks).await?;
        self.manager.verify_deployed()?;

        info!(
            chains = self.manager.handles().len(),
            "All deployments recorded and verified"
        );
        Ok(())
    }
}

fn wrap_deploy(chain: &str, contract: &str, e: LinkupError) -> LinkupError {
    match e {
        e @ LinkupError::Deployment { .. } => e,
        other => LinkupError::Deployment {
            chain: chain.to_string(),
            contract: contract.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::contracts::{MockTokenChain, TokenChain};
    use ethers::types::Address;

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

    fn deploying_mock(token: Address, linker: Address) -> MockTokenChain {
        let mut mock = MockTokenChain::new();
        mock.expect_deploy_token()
            .times(1)
            .returning(move || Ok(token));
        mock.expect_deploy_linker()
            .withf(move |t| *t == token)
            .times(1)
            .returning(move |_| Ok(linker));
        mock
    }

    #[tokio::test]
    async fn test_deploy_all_records_distinct_addresses() {
        let settings = test_settings();
        let manager = Arc::new(ChainManager::new(&settings).expect("manager"));

        let mut clients = ClientMap::new();
        clients.insert(
            "Avalanche".to_string(),
            Arc::new(deploying_mock(addr(0x11), addr(0x21))) as Arc<dyn TokenChain>,
        );
        clients.insert(
            "Fantom".to_string(),
            Arc::new(deploying_mock(addr(0x12), addr(0x22))) as Arc<dyn TokenChain>,
        );

        let deployer = ContractDeployer::new(manager.clone(), Arc::new(clients));
        deployer.deploy_all().await.expect("deploy");

        let avalanche = manager.get("Avalanche").expect("handle");
        assert_eq!(avalanche.token_address().expect("token"), addr(0x11));
        assert_eq!(avalanche.linker_address().expect("linker"), addr(0x21));
        manager.verify_deployed().expect("distinct");
    }

    #[tokio::test]
    async fn test_deploy_failure_is_fatal() {
        let settings = test_settings();
        let manager = Arc::new(ChainManager::new(&settings).expect("manager"));

        let mut failing = MockTokenChain::new();
        failing
            .expect_deploy_token()
            .returning(|| Err(LinkupError::Contract("out of gas".to_string())));
        // Token deploy fails first, so the linker deploy must never run
        failing.expect_deploy_linker().times(0);

        // The healthy chain may or may not get polled before the fan-out
        // aborts, so its mock tolerates any call count
        let mut healthy = MockTokenChain::new();
        healthy.expect_deploy_token().returning(|| Ok(addr(0x12)));
        healthy
            .expect_deploy_linker()
            .returning(|_| Ok(addr(0x22)));

        let mut clients = ClientMap::new();
        clients.insert(
            "Avalanche".to_string(),
            Arc::new(failing) as Arc<dyn TokenChain>,
        );
        clients.insert(
            "Fantom".to_string(),
            Arc::new(healthy) as Arc<dyn TokenChain>,
        );

        let deployer = ContractDeployer::new(manager, Arc::new(clients));
        let err = deployer.deploy_all().await.unwrap_err();

        match err {
            LinkupError::Deployment {
                ref chain,
                ref contract,
                ..
            } => {
                assert_eq!(chain, "Avalanche");
                assert_eq!(contract, "token");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_colliding_deployments_fail_verification() {
        let settings = test_settings();
        let manager = Arc::new(ChainManager::new(&settings).expect("manager"));

        let mut clients = ClientMap::new();
        // Both chains report the same token address
        clients.insert(
            "Avalanche".to_string(),
            Arc::new(deploying_mock(addr(0x11), addr(0x21))) as Arc<dyn TokenChain>,
        );
        clients.insert(
            "Fantom".to_string(),
            Arc::new(deploying_mock(addr(0x11), addr(0x22))) as Arc<dyn TokenChain>,
        );

        let deployer = ContractDeployer::new(manager, Arc::new(clients));
        let err = deployer.deploy_all().await.unwrap_err();
        assert!(matches!(err, LinkupError::Deployment { .. }));
    }
}

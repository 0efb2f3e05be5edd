//! Chain module - multi-chain connection registry
//!
//! This module provides:
//! - Multi-RPC provider management with automatic failover
//! - Write-once deployment address slots per chain
//! - Linker peer bookkeeping for the registration fan-out

pub mod provider;

pub use provider::ChainProvider;

use crate::config::{ChainSettings, Settings};
use crate::error::{LinkupError, LinkupResult};

use dashmap::DashMap;
use ethers::types::Address;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::info;

/// Per-chain connection plus deployment bookkeeping.
///
/// Token and linker addresses are written exactly once, by the deployer;
/// every later phase only reads them. Peer sets are recorded by the
/// topology builder after a successful registration call.
#[derive(Debug)]
pub struct ChainHandle {
    settings: ChainSettings,
    provider: Arc<ChainProvider>,
    gateway: Address,
    gas_receiver: Address,
    token_address: OnceLock<Address>,
    linker_address: OnceLock<Address>,
    peers: RwLock<BTreeMap<String, Address>>,
}

impl ChainHandle {
    fn new(settings: ChainSettings, provider: Arc<ChainProvider>) -> LinkupResult<Self> {
        let gateway = parse_address(&settings.gateway_address, &settings.name, "gateway")?;
        let gas_receiver =
            parse_address(&settings.gas_receiver_address, &settings.name, "gas receiver")?;

        Ok(Self {
            settings,
            provider,
            gateway,
            gas_receiver,
            token_address: OnceLock::new(),
            linker_address: OnceLock::new(),
            peers: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &ChainSettings {
        &self.settings
    }

    pub fn provider(&self) -> Arc<ChainProvider> {
        self.provider.clone()
    }

    pub fn gateway(&self) -> Address {
        self.gateway
    }

    pub fn gas_receiver(&self) -> Address {
        self.gas_receiver
    }

    /// Record the deployed token address. Fails if already recorded.
    pub fn set_token_address(&self, address: Address) -> LinkupResult<()> {
        self.token_address.set(address).map_err(|_| {
            LinkupError::Internal(format!(
                "Token address already recorded for chain {}",
                self.settings.name
            ))
        })
    }

    /// Record the deployed linker address. Fails if already recorded.
    pub fn set_linker_address(&self, address: Address) -> LinkupResult<()> {
        self.linker_address.set(address).map_err(|_| {
            LinkupError::Internal(format!(
                "Linker address already recorded for chain {}",
                self.settings.name
            ))
        })
    }

    pub fn token_address(&self) -> LinkupResult<Address> {
        self.token_address
            .get()
            .copied()
            .ok_or_else(|| LinkupError::Deployment {
                chain: self.settings.name.clone(),
                contract: "token".to_string(),
                message: "address not recorded yet".to_string(),
            })
    }

    pub fn linker_address(&self) -> LinkupResult<Address> {
        self.linker_address
            .get()
            .copied()
            .ok_or_else(|| LinkupError::Deployment {
                chain: self.settings.name.clone(),
                contract: "linker".to_string(),
                message: "address not recorded yet".to_string(),
            })
    }

    /// Record the peer set this chain's linker was registered with.
    /// Re-recording the same set is a no-op by construction.
    pub async fn record_peers(&self, peer_set: BTreeMap<String, Address>) {
        let mut peers = self.peers.write().await;
        peers.extend(peer_set);
    }

    pub async fn peers(&self) -> BTreeMap<String, Address> {
        self.peers.read().await.clone()
    }
}

/// Manages connections to all configured chains
pub struct ChainManager {
    /// Chain handles in configuration order
    handles: Vec<Arc<ChainHandle>>,
    /// Chain handles indexed by name
    by_name: DashMap<String, Arc<ChainHandle>>,
}

impl ChainManager {
    /// Create a new chain manager with all configured chains
    pub fn new(settings: &Settings) -> LinkupResult<Self> {
        let mut handles = Vec::with_capacity(settings.chains.len());
        let by_name = DashMap::new();

        for chain_settings in &settings.chains {
            info!("Initializing chain {}", chain_settings.name);

            let provider = Arc::new(ChainProvider::new(chain_settings.clone())?);
            let handle = Arc::new(ChainHandle::new(chain_settings.clone(), provider)?);

            by_name.insert(chain_settings.name.clone(), handle.clone());
            handles.push(handle);
        }

        Ok(Self { handles, by_name })
    }

    /// Get handle for a specific chain
    pub fn get(&self, name: &str) -> LinkupResult<Arc<ChainHandle>> {
        self.by_name
            .get(name)
            .map(|h| h.clone())
            .ok_or_else(|| LinkupError::ChainNotFound {
                name: name.to_string(),
            })
    }

    /// All chain handles in configuration order
    pub fn handles(&self) -> &[Arc<ChainHandle>] {
        &self.handles
    }

    /// All chain names in configuration order
    pub fn chain_names(&self) -> Vec<String> {
        self.handles.iter().map(|h| h.name().to_string()).collect()
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(String, bool)> {
        let mut results = Vec::new();

        for handle in &self.handles {
            let healthy = handle.provider().health_check().await;
            crate::metrics::record_chain_health(handle.name(), healthy);
            results.push((handle.name().to_string(), healthy));
        }

        results
    }

    /// Verify every chain has distinct token and linker addresses recorded.
    pub fn verify_deployed(&self) -> LinkupResult<()> {
        let mut seen: BTreeMap<Address, String> = BTreeMap::new();

        for handle in &self.handles {
            for (contract, address) in [
                ("token", handle.token_address()?),
                ("linker", handle.linker_address()?),
            ] {
                let label = format!("{} {}", handle.name(), contract);
                if let Some(previous) = seen.insert(address, label.clone()) {
                    return Err(LinkupError::Deployment {
                        chain: handle.name().to_string(),
                        contract: contract.to_string(),
                        message: format!(
                            "address {:?} collides with {}",
                            address, previous
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

fn parse_address(raw: &str, chain: &str, what: &str) -> LinkupResult<Address> {
    raw.parse::<Address>().map_err(|e| {
        LinkupError::Config(format!(
            "Invalid {} address for chain {}: {}",
            what, chain, e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_chain_settings() -> Settings {
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
backoff_base_ms = 100
backoff_max_ms = 1000

[watcher]
initial_delay_ms = 0
poll_interval_ms = 10
max_polls = 10
wait_forever = false

[metrics]
enabled = false
port = 9091

[wallet]
private_key_env = "LINKUP_PRIVATE_KEY"
"#,
        )
        .expect("settings should parse")
    }

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_addresses_are_write_once() {
        let manager = ChainManager::new(&two_chain_settings()).expect("manager");
        let handle = manager.get("Avalanche").expect("handle");

        assert!(handle.token_address().is_err());
        handle.set_token_address(addr(0x11)).expect("first write");
        assert_eq!(handle.token_address().expect("read"), addr(0x11));

        let err = handle.set_token_address(addr(0x22)).unwrap_err();
        assert!(matches!(err, LinkupError::Internal(_)));
        // First write wins
        assert_eq!(handle.token_address().expect("read"), addr(0x11));
    }

    #[test]
    fn test_lookup_by_unknown_name_fails() {
        let manager = ChainManager::new(&two_chain_settings()).expect("manager");
        let err = manager.get("Moonbeam").unwrap_err();
        assert!(matches!(err, LinkupError::ChainNotFound { .. }));
    }

    #[test]
    fn test_verify_deployed_requires_all_addresses() {
        let manager = ChainManager::new(&two_chain_settings()).expect("manager");
        manager
            .get("Avalanche")
            .expect("handle")
            .set_token_address(addr(0x11))
            .expect("write");

        let err = manager.verify_deployed().unwrap_err();
        assert!(matches!(err, LinkupError::Deployment { .. }));
    }

    #[test]
    fn test_verify_deployed_rejects_address_collision() {
        let manager = ChainManager::new(&two_chain_settings()).expect("manager");
        for (i, handle) in manager.handles().iter().enumerate() {
            handle.set_token_address(addr(0x10 + i as u8)).expect("token");
            // Same linker address on both chains
            handle.set_linker_address(addr(0xAA)).expect("linker");
        }

        let err = manager.verify_deployed().unwrap_err();
        match err {
            LinkupError::Deployment { message, .. } => {
                assert!(message.contains("collides"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_recording_is_idempotent() {
        let manager = ChainManager::new(&two_chain_settings()).expect("manager");
        let handle = manager.get("Fantom").expect("handle");

        let mut peer_set = BTreeMap::new();
        peer_set.insert("Avalanche".to_string(), addr(0x11));
        peer_set.insert("Fantom".to_string(), addr(0x22));

        handle.record_peers(peer_set.clone()).await;
        handle.record_peers(peer_set.clone()).await;

        assert_eq!(handle.peers().await, peer_set);
    }
}

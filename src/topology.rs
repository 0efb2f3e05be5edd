//! Linker topology construction
//!
//! Every chain's linker is handed the full broadcast list of peers, own
//! entry included, and its token grants the linker mint authority. The
//! fan-out is sequential in configuration order so pacing between chains
//! is deterministic, and it pauses once more at the end so the last
//! registrations settle before any transfer runs.

use crate::chain::ChainManager;
use crate::contracts::{client_for, ClientMap};
use crate::error::{LinkupError, LinkupResult};
use crate::throttle::Throttle;

use ethers::types::Address;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct TopologyBuilder {
    manager: Arc<ChainManager>,
    clients: Arc<ClientMap>,
    throttle: Throttle,
}

impl TopologyBuilder {
    pub fn new(manager: Arc<ChainManager>, clients: Arc<ClientMap>, throttle: Throttle) -> Self {
        Self {
            manager,
            clients,
            throttle,
        }
    }

    /// Register the peer set and grant mint authority on every chain.
    ///
    /// Requires all deployments recorded; any registration failure aborts
    /// the run before a transfer can be initiated against a half-wired
    /// topology.
    pub async fn register_all(&self) -> LinkupResult<()> {
        let mut peer_addresses = Vec::with_capacity(self.manager.handles().len());
        let mut peer_names = Vec::with_capacity(self.manager.handles().len());
        for handle in self.manager.handles() {
            peer_addresses.push(handle.linker_address()?);
            peer_names.push(handle.name().to_string());
        }

        let last = self.manager.handles().len().saturating_sub(1);
        for (i, handle) in self.manager.handles().iter().enumerate() {
            let client = client_for(&self.clients, handle.name())?;
            let linker = handle.linker_address()?;
            let token = handle.token_address()?;

            client
                .add_linkers(linker, peer_addresses.clone(), peer_names.clone())
                .await
                .map_err(|e| wrap_registration(handle.name(), e))?;

            client
                .grant_minter(token, linker)
                .await
                .map_err(|e| wrap_registration(handle.name(), e))?;

            let peer_set: BTreeMap<String, Address> = peer_names
                .iter()
                .cloned()
                .zip(peer_addresses.iter().copied())
                .collect();
            handle.record_peers(peer_set).await;

            info!(
                chain = handle.name(),
                peers = peer_names.len(),
                "Linker registered and granted mint authority"
            );
            crate::metrics::record_registration(handle.name());

            if i < last {
                self.throttle.registration_pause().await;
            }
        }

        info!("Letting registrations settle before the transfer phase");
        self.throttle.settle_pause().await;

        Ok(())
    }

    /// Audit that every chain recorded every peer's linker under its name
    pub async fn verify_symmetric(&self) -> LinkupResult<()> {
        for handle in self.manager.handles() {
            let peers = handle.peers().await;
            for other in self.manager.handles() {
                let expected = other.linker_address()?;
                match peers.get(other.name()) {
                    Some(address) if *address == expected => {}
                    found => {
                        return Err(LinkupError::Internal(format!(
                            "Chain {} peer set maps {} to {:?}, expected {:?}",
                            handle.name(),
                            other.name(),
                            found,
                            expected
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

fn wrap_registration(chain: &str, e: LinkupError) -> LinkupError {
    match e {
        e @ LinkupError::Registration { .. } => e,
        other => LinkupError::Registration {
            chain: chain.to_string(),
            message: other.to_string(),
        },
    }
}

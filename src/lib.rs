//! linkup - cross-chain token linker orchestration
//!
//! Deploys a token and linker contract on every configured chain, wires the
//! linkers into a full mesh, grants mint authority, initiates one
//! cross-chain transfer and watches the destination chain until the
//! transfer settles.
//!
//! The binary drives [`orchestrator::Orchestrator`] end to end; the library
//! surface exists so integration tests can run the same flow over in-memory
//! chain fakes through the [`contracts::TokenChain`] seam.

pub mod chain;
pub mod config;
pub mod contracts;
pub mod deploy;
pub mod error;
pub mod gas;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod settlement;
pub mod throttle;
pub mod topology;
pub mod transfer;

pub use error::{LinkupError, LinkupResult};
pub use orchestrator::Orchestrator;
pub use settlement::SettlementReport;
pub use transfer::{TransferIntent, TransferStatus};

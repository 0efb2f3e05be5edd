//! Compiled contract artifact loading
//!
//! Artifacts follow the Hardhat layout: a JSON object carrying at least
//! `abi` and `bytecode`. Deployment itself stays a black box behind the
//! factory; this module only makes the inputs available.

use crate::config::ArtifactsConfig;
use crate::error::{LinkupError, LinkupResult};

use ethers::abi::Abi;
use ethers::types::Bytes;
use serde::Deserialize;
use std::path::Path;

/// Compiled contract artifact
#[derive(Debug, Clone, Deserialize)]
pub struct ContractArtifact {
    pub abi: Abi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Load an artifact from a JSON file
    pub fn load(path: impl AsRef<Path>) -> LinkupResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            LinkupError::Config(format!("Failed to read artifact {:?}: {}", path, e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            LinkupError::Config(format!("Failed to parse artifact {:?}: {}", path, e))
        })
    }
}

/// The token and linker artifacts a run deploys on every chain
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    pub token: ContractArtifact,
    pub linker: ContractArtifact,
}

impl ArtifactSet {
    /// Load both artifacts from the configured paths
    pub fn load(config: &ArtifactsConfig) -> LinkupResult<Self> {
        Ok(Self {
            token: ContractArtifact::load(&config.token)?,
            linker: ContractArtifact::load(&config.linker)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_minimal_artifact() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(
            br#"{
                "abi": [
                    {
                        "inputs": [],
                        "name": "totalSupply",
                        "outputs": [{"internalType": "uint256", "name": "", "type": "uint256"}],
                        "stateMutability": "view",
                        "type": "function"
                    }
                ],
                "bytecode": "0x6080604052"
            }"#,
        )
        .expect("write artifact");

        let artifact = ContractArtifact::load(file.path()).expect("load");
        assert_eq!(artifact.bytecode.len(), 5);
        assert!(artifact.abi.function("totalSupply").is_ok());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = ContractArtifact::load("does/not/exist.json").unwrap_err();
        assert!(matches!(err, LinkupError::Config(_)));
    }

    #[test]
    fn test_malformed_artifact_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{\"abi\": \"not an abi\"}").expect("write");
        let err = ContractArtifact::load(file.path()).unwrap_err();
        assert!(matches!(err, LinkupError::Config(_)));
    }
}

// src/deploy.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ethers::abi::Abi;
use ethers::contract::ContractFactory;
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, TesterError};

/// The subset of a Hardhat artifact needed to deploy a contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub contract_name: String,
    pub abi: Abi,
    pub bytecode: String,
}

impl Artifact {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| TesterError::ArtifactError(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&raw)
            .map_err(|e| TesterError::ArtifactError(format!("{}: {}", path.display(), e)))
    }

    pub fn bytecode(&self) -> Result<Bytes> {
        let code = self.bytecode.trim_start_matches("0x");
        if code.is_empty() {
            return Err(TesterError::ArtifactError(format!(
                "{} has no bytecode (abstract contract or interface?)",
                self.contract_name
            )));
        }
        let code = hex::decode(code)
            .map_err(|e| TesterError::ArtifactError(format!("{}: {}", self.contract_name, e)))?;
        Ok(code.into())
    }
}

/// Finds `<name>.json` under a Hardhat artifacts directory. Tries the
/// conventional `contracts/<name>.sol/<name>.json` first, then searches.
pub fn resolve_artifact(artifacts_dir: &Path, name: &str) -> Result<PathBuf> {
    let file_name = format!("{name}.json");
    let conventional = artifacts_dir.join("contracts").join(format!("{name}.sol")).join(&file_name);
    if conventional.is_file() {
        return Ok(conventional);
    }

    find_file(artifacts_dir, &file_name)?.ok_or_else(|| {
        TesterError::ArtifactError(format!(
            "no artifact for {} under {}",
            name,
            artifacts_dir.display()
        ))
    })
}

fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| TesterError::ArtifactError(format!("{}: {}", dir.display(), e)))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| TesterError::ArtifactError(format!("{}: {}", dir.display(), e)))?
            .path();
        if path.is_dir() {
            // build-info holds compiler input/output, never deployable artifacts
            if path.file_name().map_or(false, |n| n != "build-info") {
                subdirs.push(path);
            }
        } else if path.file_name().map_or(false, |n| n == file_name) {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_file(&subdir, file_name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// Deploys the artifact with no constructor arguments and waits for the
/// deployment to be mined.
pub async fn deploy_contract<M: Middleware + 'static>(
    client: Arc<M>,
    artifact: &Artifact,
) -> Result<Address> {
    let factory = ContractFactory::new(artifact.abi.clone(), artifact.bytecode()?, client);
    let deployer = factory
        .deploy(())
        .map_err(|e| TesterError::DeploymentFailed(e.to_string()))?
        .confirmations(1usize);

    info!("Deploying {}", artifact.contract_name);
    let (contract, receipt) = deployer
        .send_with_receipt()
        .await
        .map_err(|e| TesterError::DeploymentFailed(e.to_string()))?;
    debug!("Deployment transaction {:?}", receipt.transaction_hash);

    Ok(contract.address())
}

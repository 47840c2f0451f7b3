// src/error.rs
use ethers::types::{Address, H256};
use thiserror::Error;

/// Bundler rejection raised when the submitted pre-verification gas is lower
/// than what the bundler computes for the operation.
pub const PRE_VERIFICATION_GAS_TOO_LOW: &str = "preVerificationGas: below expected gas";

#[derive(Error, Debug)]
pub enum TesterError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ethereum provider error: {0}")]
    EthereumProviderError(String),

    #[error("contract call failed: {0}")]
    ContractError(String),

    #[error("bundler error: {0}")]
    BundlerError(#[from] jsonrpsee::core::Error),

    #[error("bundler is on chain {bundler} but the provider is on chain {provider}")]
    ChainIdMismatch { bundler: u64, provider: u64 },

    #[error("signing failed: {0}")]
    SigningError(String),

    #[error("latest block not available")]
    MissingBlock,

    #[error("no receipt for transaction {0:?}")]
    MissingReceipt(H256),

    #[error("timed out waiting for user operation {0:?}")]
    ReceiptTimeout(H256),

    #[error("ParameterEmitted({expected}) not emitted by {contract:?} in transaction {tx:?}")]
    EventNotEmitted { contract: Address, tx: H256, expected: String },

    #[error("scenario timed out after {0:?}")]
    ScenarioTimeout(std::time::Duration),

    #[error("{failed} of {attempted} escalating-payload calls failed")]
    EscalationFailures { failed: usize, attempted: usize },

    #[error("{failed} of {total} scenarios failed")]
    ScenariosFailed { failed: usize, total: usize },

    #[error("artifact error: {0}")]
    ArtifactError(String),

    #[error("deployment failed: {0}")]
    DeploymentFailed(String),
}

impl TesterError {
    /// Whether this is the known bundler rejection for underpriced
    /// pre-verification gas.
    pub fn is_pre_verification_gas_too_low(&self) -> bool {
        self.to_string().contains(PRE_VERIFICATION_GAS_TOO_LOW)
    }
}

pub type Result<T, E = TesterError> = std::result::Result<T, E>;

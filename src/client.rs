// src/client.rs
use std::sync::Arc;
use std::time::Duration;

use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use tracing::info;

use crate::config::NetworkConfig;
use crate::error::{Result, TesterError};

pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Connects to the network's RPC endpoint and binds the configured key to the
/// chain id the endpoint reports.
pub async fn connect(config: &NetworkConfig) -> Result<Arc<SignerClient>> {
    let provider = Provider::<Http>::try_from(config.endpoint()?)
        .map_err(|e| TesterError::InvalidConfig(format!("bad RPC endpoint: {e}")))?
        .interval(Duration::from_millis(2_000));

    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| TesterError::EthereumProviderError(e.to_string()))?
        .as_u64();

    let wallet = config
        .private_key()?
        .parse::<LocalWallet>()
        .map_err(|e| TesterError::InvalidConfig(format!("bad PRIVATE_KEY: {e}")))?
        .with_chain_id(chain_id);

    info!("Using network: {:?} with chain id: {}", config.network.name(), chain_id);
    info!("Signer address: {:?}", wallet.address());

    Ok(Arc::new(SignerMiddleware::new(provider, wallet)))
}

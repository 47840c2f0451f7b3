// src/bundler.rs
use std::future::Future;
use std::time::Duration;

use ethers::types::{Address, H256, U64};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{Result, TesterError};
use crate::types::{UserOperation, UserOperationReceipt};

/// How often a pending user operation is polled for.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// How long to wait for a user operation before giving up.
pub const RECEIPT_TIMEOUT: Duration = Duration::from_secs(30);

// Bundler side of the ERC-4337 `eth` namespace
#[rpc(client, namespace = "eth")]
pub trait BundlerApi {
    #[method(name = "chainId")]
    async fn chain_id(&self) -> jsonrpsee::core::RpcResult<U64>;

    #[method(name = "supportedEntryPoints")]
    async fn supported_entry_points(&self) -> jsonrpsee::core::RpcResult<Vec<Address>>;

    #[method(name = "sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: Address,
    ) -> jsonrpsee::core::RpcResult<H256>;

    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(
        &self,
        user_operation_hash: H256,
    ) -> jsonrpsee::core::RpcResult<Option<UserOperationReceipt>>;
}

/// HTTP client for a single bundler endpoint bound to one entry point.
pub struct BundlerClient {
    client: HttpClient,
    entry_point: Address,
}

impl BundlerClient {
    /// Connects and checks that the bundler serves the expected chain.
    pub async fn connect(url: &str, entry_point: Address, chain_id: u64) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(60))
            .build(url)?;

        let bundler_chain_id = client.chain_id().await?.as_u64();
        if bundler_chain_id != chain_id {
            return Err(TesterError::ChainIdMismatch {
                bundler: bundler_chain_id,
                provider: chain_id,
            });
        }

        match client.supported_entry_points().await {
            Ok(entry_points) if !entry_points.contains(&entry_point) => {
                warn!(
                    "Bundler does not list entry point {:?} (supports {:?})",
                    entry_point, entry_points
                );
            }
            Ok(_) => debug!("Bundler supports entry point {:?}", entry_point),
            Err(e) => warn!("Could not query supported entry points: {}", e),
        }

        info!("Connected to bundler at {} on chain {}", url, chain_id);
        Ok(Self { client, entry_point })
    }

    /// Submits a signed operation and returns its user-operation hash.
    pub async fn send_user_op_to_bundler(&self, user_op: &UserOperation) -> Result<H256> {
        let hash = self.client.send_user_operation(user_op.clone(), self.entry_point).await?;
        debug!("Bundler accepted user operation {:?}", hash);
        Ok(hash)
    }

    /// Polls until the operation is mined. `None` when it is not mined within
    /// [`RECEIPT_TIMEOUT`].
    pub async fn get_user_op_receipt(&self, user_op_hash: H256) -> Result<Option<UserOperationReceipt>> {
        poll_until(RECEIPT_POLL_INTERVAL, RECEIPT_TIMEOUT, move || async move {
            Ok(self.client.get_user_operation_receipt(user_op_hash).await?)
        })
        .await
    }
}

/// Calls `query` every `interval` until it yields a value or `timeout` passes.
pub async fn poll_until<T, F, Fut>(interval: Duration, timeout: Duration, mut query: F) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = query().await? {
            return Ok(Some(value));
        }
        if Instant::now() + interval > deadline {
            return Ok(None);
        }
        sleep(interval).await;
    }
}

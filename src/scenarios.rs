// src/scenarios.rs
use std::future::Future;
use std::iter;
use std::sync::Arc;
use std::time::Duration;

use ethers::abi::AbiEncode;
use ethers::prelude::rand::{thread_rng, RngCore};
use ethers::prelude::*;
use ethers::signers::Signer;
use tracing::{debug, error, info, warn};

use crate::account::SimpleAccountApi;
use crate::bundler::BundlerClient;
use crate::client::{self, SignerClient};
use crate::config::NetworkConfig;
use crate::contracts::{emitted_parameters, EmitEventCall, SimpleEventEmitter};
use crate::error::{Result, TesterError, PRE_VERIFICATION_GAS_TOO_LOW};
use crate::gas::get_gas_fee;
use crate::types::{TransactionDetails, UserOperation};

pub const FIRST_PAYLOAD_SIZE: usize = 100;
pub const MAX_PAYLOAD_SIZE: usize = 51_200;
/// Wall-clock bound for the whole escalating-payload scenario.
pub const ESCALATION_TIMEOUT: Duration = Duration::from_secs(70);

const SEPARATOR: &str = "--------------------------------------------";

/// 100, 200, 400, ... up to and including 51200 bytes.
pub fn payload_sizes() -> impl Iterator<Item = usize> {
    iter::successors(Some(FIRST_PAYLOAD_SIZE), |size| Some(size * 2))
        .take_while(|size| *size <= MAX_PAYLOAD_SIZE)
}

pub fn random_payload(size: usize) -> Bytes {
    let mut payload = vec![0u8; size];
    thread_rng().fill_bytes(&mut payload);
    payload.into()
}

/// Short form of a payload for log and error messages.
pub fn abbreviate(payload: &[u8]) -> String {
    if payload.len() <= 32 {
        format!("0x{}", hex::encode(payload))
    } else {
        format!("0x{}..({} bytes)", hex::encode(&payload[..8]), payload.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationReport {
    pub attempted: usize,
    pub failed: usize,
}

impl EscalationReport {
    pub fn passed(&self) -> bool {
        self.failed == 0
    }
}

/// Runs `step` once per payload size, strictly in order. A failed step is
/// logged and counted and the loop moves on to the next size.
pub async fn escalate<F, Fut>(mut step: F) -> EscalationReport
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<H256>>,
{
    let mut report = EscalationReport { attempted: 0, failed: 0 };

    for size in payload_sizes() {
        report.attempted += 1;
        match step(size).await {
            Ok(_) => info!("Result: Success"),
            Err(e) => {
                // Both kinds count the same; only the log line differs.
                if e.is_pre_verification_gas_too_low() {
                    error!("Error: {}", PRE_VERIFICATION_GAS_TOO_LOW);
                } else {
                    error!("Unexpected Error: {}", e);
                }
                report.failed += 1;
                info!("Result: Failed");
            }
        }
        info!("{}", SEPARATOR);
    }

    info!("Failed: {}/{}", report.failed, report.attempted);
    report
}

/// [`escalate`] bounded by [`ESCALATION_TIMEOUT`]; passes only with zero failures.
pub async fn run_escalation<F, Fut>(step: F) -> Result<EscalationReport>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<H256>>,
{
    let report = tokio::time::timeout(ESCALATION_TIMEOUT, escalate(step))
        .await
        .map_err(|_| TesterError::ScenarioTimeout(ESCALATION_TIMEOUT))?;

    if !report.passed() {
        return Err(TesterError::EscalationFailures {
            failed: report.failed,
            attempted: report.attempted,
        });
    }
    Ok(report)
}

/// Drives the emitter directly and through the bundler.
pub struct Harness<M> {
    client: Arc<M>,
    contract: SimpleEventEmitter<M>,
    account: SimpleAccountApi<M>,
    bundler: BundlerClient,
}

impl Harness<SignerClient> {
    /// Wires the chain client, account builder and bundler for one network.
    pub async fn connect(network: &NetworkConfig, contract: Option<Address>) -> Result<Self> {
        let contract = network.contract_address(contract)?;
        let client = client::connect(network).await?;
        let chain_id = client.signer().chain_id();
        let entry_point = network.entry_point()?;

        let bundler = BundlerClient::connect(network.bundler()?, entry_point, chain_id).await?;
        let account = SimpleAccountApi::new(
            client.clone(),
            client.signer().clone(),
            entry_point,
            network.account_factory()?,
            chain_id,
        );
        info!("Target contract: {:?}", contract);

        Ok(Self::new(client, contract, account, bundler))
    }
}

impl<M: Middleware + 'static> Harness<M> {
    pub fn new(
        client: Arc<M>,
        contract: Address,
        account: SimpleAccountApi<M>,
        bundler: BundlerClient,
    ) -> Self {
        Self { contract: SimpleEventEmitter::new(contract, client.clone()), client, account, bundler }
    }

    async fn receipt(&self, tx_hash: H256) -> Result<TransactionReceipt> {
        self.client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| TesterError::EthereumProviderError(e.to_string()))?
            .ok_or(TesterError::MissingReceipt(tx_hash))
    }

    fn expect_parameter_emitted(&self, receipt: &TransactionReceipt, expected: &Bytes) -> Result<()> {
        let contract = self.contract.address();
        if emitted_parameters(receipt, contract).iter().any(|p| p == expected) {
            return Ok(());
        }
        Err(TesterError::EventNotEmitted {
            contract,
            tx: receipt.transaction_hash,
            expected: abbreviate(expected),
        })
    }

    /// `emitEvent(parameter)` sent by the owner as a plain transaction.
    pub async fn direct_call(&self, parameter: Bytes) -> Result<H256> {
        let call = self.contract.emit_event(parameter.clone());
        let pending = call.send().await.map_err(|e| TesterError::ContractError(e.to_string()))?;
        let tx_hash = *pending;

        let receipt = pending
            .await
            .map_err(|e| TesterError::EthereumProviderError(e.to_string()))?
            .ok_or(TesterError::MissingReceipt(tx_hash))?;
        self.expect_parameter_emitted(&receipt, &parameter)?;
        Ok(tx_hash)
    }

    /// Signed user operation executing `emitEvent(parameter)` from the account.
    pub async fn build_user_op(&self, parameter: &Bytes) -> Result<UserOperation> {
        let details = TransactionDetails {
            target: self.contract.address(),
            value: U256::zero(),
            data: EmitEventCall { parameter: parameter.clone() }.encode().into(),
            gas: Some(get_gas_fee(self.client.as_ref()).await?),
        };
        self.account.create_signed_user_op(details).await
    }

    /// Sends the operation, waits for its bundle and checks the event.
    pub async fn submit_and_confirm(&self, user_op: &UserOperation, parameter: &Bytes) -> Result<H256> {
        // Hand the signed op to the bundler
        let user_op_hash = self.bundler.send_user_op_to_bundler(user_op).await?;
        info!("UserOperation hash: {:?}", user_op_hash);
        info!("Waiting for transaction...");

        // Poll until the op lands in a bundle
        let receipt = self
            .bundler
            .get_user_op_receipt(user_op_hash)
            .await?
            .ok_or(TesterError::ReceiptTimeout(user_op_hash))?;
        let tx_hash = receipt.receipt.transaction_hash;
        info!("Transaction hash: {:?}", tx_hash);
        debug!(
            "User operation {:?} from {:?} (nonce {}) mined in block {:?}: gas used {}, cost {}",
            receipt.user_op_hash,
            receipt.sender,
            receipt.nonce,
            receipt.receipt.block_number,
            receipt.actual_gas_used,
            receipt.actual_gas_cost
        );
        if !receipt.success {
            warn!(
                "User operation {:?} reverted: {}",
                user_op_hash,
                receipt.reason.as_deref().unwrap_or("no reason given")
            );
        }

        // The event comes from the bundle transaction's own receipt
        let tx_receipt = self.receipt(tx_hash).await?;
        self.expect_parameter_emitted(&tx_receipt, parameter)?;
        Ok(tx_hash)
    }

    pub async fn relayed_call(&self, parameter: Bytes) -> Result<H256> {
        let user_op = self.build_user_op(&parameter).await?;
        self.submit_and_confirm(&user_op, &parameter).await
    }

    async fn escalation_step(&self, size: usize) -> Result<H256> {
        let parameter = random_payload(size);
        let user_op = self.build_user_op(&parameter).await?;
        info!(
            "Testing param of byte size: {} | Call data length: {}",
            size,
            user_op.call_data.len()
        );
        self.submit_and_confirm(&user_op, &parameter).await
    }

    /// Ten relayed calls with doubling payloads; fails unless all succeed.
    pub async fn escalating_payloads(&self) -> Result<EscalationReport> {
        run_escalation(|size| self.escalation_step(size)).await
    }

    /// Runs the three scenarios in order. Each one runs even if an earlier one
    /// failed; the result is an error if any did.
    pub async fn run_all(&self) -> Result<()> {
        let mut failed = 0;

        let desc = "should make a simple contract call without using account abstraction";
        info!("> TEST: Running \"{}\"...", desc);
        if let Err(e) = self.direct_call(Bytes::from(b"Test 1".to_vec())).await {
            error!("FAILED: {}: {}", desc, e);
            failed += 1;
        }

        let desc = "should make a simple contract call using account abstraction";
        info!("> TEST: Running \"{}\"...", desc);
        if let Err(e) = self.relayed_call(Bytes::from(b"Test 2".to_vec())).await {
            error!("FAILED: {}: {}", desc, e);
            failed += 1;
        }

        let desc = "should fail 0 of 10 simple contract calls using account abstraction \
                    with gradually increasing calldata lengths";
        info!("> TEST: Running \"{}\"...", desc);
        if let Err(e) = self.escalating_payloads().await {
            error!("FAILED: {}: {}", desc, e);
            failed += 1;
        }

        if failed > 0 {
            return Err(TesterError::ScenariosFailed { failed, total: 3 });
        }
        info!("All scenarios passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_sizes_double_from_100_to_51200() {
        let sizes: Vec<usize> = payload_sizes().collect();
        assert_eq!(sizes, vec![100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200]);
    }

    #[test]
    fn random_payloads_have_requested_size() {
        for size in payload_sizes().take(3) {
            let a = random_payload(size);
            let b = random_payload(size);
            assert_eq!(a.len(), size);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn abbreviates_long_payloads() {
        assert_eq!(abbreviate(b"Test 1"), "0x546573742031");
        assert_eq!(abbreviate(&[0xab; 100]), "0xabababababababab..(100 bytes)");
    }

    // Needs ENDPOINT_GOERLI, BUNDLER_GOERLI, PRIVATE_KEY and CONTRACT_GOERLI.
    #[tokio::test]
    #[ignore]
    async fn live_scenarios_on_goerli() {
        dotenv::dotenv().ok();
        let network = crate::config::Config::from_env().for_network(crate::config::Network::Goerli);
        let harness = Harness::connect(&network, None).await.unwrap();

        harness.direct_call(Bytes::from(b"Test 1".to_vec())).await.unwrap();
        harness.relayed_call(Bytes::from(b"Test 2".to_vec())).await.unwrap();
        let report = harness.escalating_payloads().await.unwrap();
        assert_eq!(report, EscalationReport { attempted: 10, failed: 0 });
    }

    #[test]
    fn report_passes_only_without_failures() {
        assert!(EscalationReport { attempted: 10, failed: 0 }.passed());
        assert!(!EscalationReport { attempted: 10, failed: 1 }.passed());
    }

    fn rejected() -> TesterError {
        TesterError::from(jsonrpsee::core::Error::Custom(format!(
            "{PRE_VERIFICATION_GAS_TOO_LOW} 45000 < 48216"
        )))
    }

    #[tokio::test(start_paused = true)]
    async fn failed_size_is_counted_and_later_sizes_still_run() {
        let mut tried = Vec::new();
        let report = escalate(|size| {
            tried.push(size);
            async move {
                if size == 800 {
                    Err(rejected())
                } else {
                    Ok(H256::from_low_u64_be(size as u64))
                }
            }
        })
        .await;

        assert_eq!(report, EscalationReport { attempted: 10, failed: 1 });
        assert_eq!(tried, payload_sizes().collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn known_rejection_and_unexpected_errors_count_the_same() {
        let report = escalate(|size| async move {
            match size {
                100 => Err(rejected()),
                51_200 => Err(TesterError::ReceiptTimeout(H256::zero())),
                _ => Ok(H256::zero()),
            }
        })
        .await;
        assert_eq!(report, EscalationReport { attempted: 10, failed: 2 });

        assert!(rejected().is_pre_verification_gas_too_low());
        assert!(!TesterError::ReceiptTimeout(H256::zero()).is_pre_verification_gas_too_low());
    }

    #[tokio::test(start_paused = true)]
    async fn any_failure_fails_the_scenario() {
        let err = run_escalation(|size| async move {
            if size == 3200 {
                Err(TesterError::MissingBlock)
            } else {
                Ok(H256::zero())
            }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, TesterError::EscalationFailures { failed: 1, attempted: 10 }));

        let report = run_escalation(|_| async { Ok(H256::zero()) }).await.unwrap();
        assert_eq!(report, EscalationReport { attempted: 10, failed: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn slow_steps_hit_the_scenario_timeout() {
        let started = tokio::time::Instant::now();
        let err = run_escalation(|_| async {
            tokio::time::sleep(Duration::from_secs(8)).await;
            Ok(H256::zero())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, TesterError::ScenarioTimeout(t) if t == ESCALATION_TIMEOUT));
        assert!(started.elapsed() >= ESCALATION_TIMEOUT);
        assert!(started.elapsed() < Duration::from_secs(80));
    }
}

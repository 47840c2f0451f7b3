// src/gas.rs
use ethers::providers::Middleware;
use ethers::types::{BlockNumber, Bytes, U256};
use tracing::debug;

use crate::error::{Result, TesterError};
use crate::types::{GasFees, UserOperation};

/// Percentage added on top of the node's suggested tip.
const TIP_BUFFER_PERCENT: u64 = 13;

/// Fetches the suggested tip and the latest block concurrently and derives the
/// fee pair for the next operation.
pub async fn get_gas_fee<M: Middleware>(provider: &M) -> Result<GasFees> {
    let (tip, block) = tokio::try_join!(
        async {
            provider
                .provider()
                .request::<_, U256>("eth_maxPriorityFeePerGas", ())
                .await
                .map_err(|e| TesterError::EthereumProviderError(e.to_string()))
        },
        async {
            provider
                .get_block(BlockNumber::Latest)
                .await
                .map_err(|e| TesterError::EthereumProviderError(e.to_string()))
        },
    )?;
    let block = block.ok_or(TesterError::MissingBlock)?;

    let fees = compute_gas_fees(tip, block.base_fee_per_gas);
    debug!(
        "tip {} base fee {:?} -> maxFeePerGas {} maxPriorityFeePerGas {}",
        tip, block.base_fee_per_gas, fees.max_fee_per_gas, fees.max_priority_fee_per_gas
    );
    Ok(fees)
}

/// `floor(tip / 100) * 13`
pub fn tip_buffer(tip: U256) -> U256 {
    (tip / U256::from(100u64)) * U256::from(TIP_BUFFER_PERCENT)
}

pub fn compute_gas_fees(tip: U256, base_fee: Option<U256>) -> GasFees {
    let max_priority_fee_per_gas = tip.saturating_add(tip_buffer(tip));
    let max_fee_per_gas = match base_fee {
        Some(base_fee) => {
            base_fee.saturating_mul(U256::from(2u64)).saturating_add(max_priority_fee_per_gas)
        }
        None => max_priority_fee_per_gas,
    };

    GasFees { max_fee_per_gas, max_priority_fee_per_gas }
}

/// Calldata overheads a bundler charges for one operation inside a bundle.
#[derive(Debug, Clone, Copy)]
pub struct GasOverheads {
    pub fixed: u64,
    pub per_user_op: u64,
    pub per_user_op_word: u64,
    pub zero_byte: u64,
    pub non_zero_byte: u64,
    pub bundle_size: u64,
    pub sig_size: usize,
}

impl Default for GasOverheads {
    fn default() -> Self {
        Self {
            fixed: 21_000,
            per_user_op: 18_300,
            per_user_op_word: 4,
            zero_byte: 4,
            non_zero_byte: 16,
            bundle_size: 1,
            sig_size: 65,
        }
    }
}

/// Gas the bundler is paid for the operation's share of the bundle
/// transaction. Computed over the op with a placeholder signature of
/// `sig_size` bytes and a placeholder pre-verification gas of 21000, since the
/// real values are not known yet.
pub fn calc_pre_verification_gas(op: &UserOperation, overheads: &GasOverheads) -> U256 {
    let placeholder = UserOperation {
        pre_verification_gas: U256::from(21_000u64),
        signature: Bytes::from(vec![1u8; overheads.sig_size]),
        ..op.clone()
    };
    let packed = placeholder.pack();

    let length_in_words = (packed.len() as u64 + 31) / 32;
    let call_data_cost: u64 = packed
        .iter()
        .map(|byte| if *byte == 0 { overheads.zero_byte } else { overheads.non_zero_byte })
        .sum();

    U256::from(
        call_data_cost
            + overheads.fixed / overheads.bundle_size.max(1)
            + overheads.per_user_op
            + overheads.per_user_op_word * length_in_words,
    )
}

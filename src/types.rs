// src/types.rs
use ethers::abi::{self, Token, Tokenizable};
use ethers::contract::EthAbiType;
use ethers::types::{Address, Bytes, H256, U256, U64};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// ERC-4337 (entry point v0.6) user operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, EthAbiType)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

// Static-only layout used for hashing; dynamic fields are replaced by their keccak.
#[derive(EthAbiType)]
struct UserOperationNoSignature {
    sender: Address,
    nonce: U256,
    init_code: H256,
    call_data: H256,
    call_gas_limit: U256,
    verification_gas_limit: U256,
    pre_verification_gas: U256,
    max_fee_per_gas: U256,
    max_priority_fee_per_gas: U256,
    paymaster_and_data: H256,
}

impl From<&UserOperation> for UserOperationNoSignature {
    fn from(op: &UserOperation) -> Self {
        Self {
            sender: op.sender,
            nonce: op.nonce,
            init_code: keccak256(&op.init_code).into(),
            call_data: keccak256(&op.call_data).into(),
            call_gas_limit: op.call_gas_limit,
            verification_gas_limit: op.verification_gas_limit,
            pre_verification_gas: op.pre_verification_gas,
            max_fee_per_gas: op.max_fee_per_gas,
            max_priority_fee_per_gas: op.max_priority_fee_per_gas,
            paymaster_and_data: keccak256(&op.paymaster_and_data).into(),
        }
    }
}

impl UserOperation {
    /// Packs the operation without its signature, as hashed by the entry point.
    pub fn pack_for_signature(&self) -> Bytes {
        abi::encode(&[UserOperationNoSignature::from(self).into_token()]).into()
    }

    /// Packs the full operation (signature included) the way it sits inside
    /// `handleOps` calldata: the tuple encoding minus its leading offset word
    /// and its trailing word.
    pub fn pack(&self) -> Bytes {
        let encoded = abi::encode(&[self.clone().into_token()]);
        if encoded.len() <= 64 {
            return Bytes::default();
        }
        Bytes::from(encoded[32..encoded.len() - 32].to_vec())
    }

    /// `keccak256(abi.encode(keccak256(pack), entryPoint, chainId))`
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let inner = keccak256(self.pack_for_signature());
        let outer = abi::encode(&[
            Token::FixedBytes(inner.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]);
        H256::from(keccak256(outer))
    }
}

/// EIP-1559 fee pair attached to a user operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

/// What the caller wants the account to execute.
#[derive(Debug, Clone)]
pub struct TransactionDetails {
    pub target: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: Option<GasFees>,
}

/// Result of `eth_getUserOperationReceipt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    pub sender: Address,
    pub nonce: U256,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub success: bool,
    #[serde(default)]
    pub reason: Option<String>,
    pub receipt: BundleReceipt,
}

/// The part of the bundle transaction receipt we look at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReceipt {
    pub transaction_hash: H256,
    #[serde(default)]
    pub block_number: Option<U64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_op() -> UserOperation {
        UserOperation {
            sender: Address::from_str("0x9c5754De1443984659E1b3a8d1931D83475ba29C").unwrap(),
            nonce: U256::from(3),
            init_code: Bytes::default(),
            call_data: Bytes::from(vec![0xb6, 0x1d, 0x27, 0xf6, 0x00, 0x01]),
            call_gas_limit: U256::from(33_100),
            verification_gas_limit: U256::from(100_000),
            pre_verification_gas: U256::from(48_000),
            max_fee_per_gas: U256::from(3_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_500_000_000u64),
            paymaster_and_data: Bytes::default(),
            signature: Bytes::default(),
        }
    }

    #[test]
    fn serializes_camel_case_hex_quantities() {
        let value = serde_json::to_value(sample_op()).unwrap();
        assert_eq!(value["callGasLimit"], "0x814c");
        assert_eq!(value["paymasterAndData"], "0x");
        assert!(value.get("call_gas_limit").is_none());
    }

    #[test]
    fn packed_without_signature_is_ten_words() {
        assert_eq!(sample_op().pack_for_signature().len(), 10 * 32);
    }

    #[test]
    fn hash_ignores_signature_but_binds_entry_point_and_chain() {
        let op = sample_op();
        let entry_point = Address::from_low_u64_be(0xe9);
        let hash = op.hash(entry_point, 5);

        let signed = UserOperation { signature: Bytes::from(vec![1u8; 65]), ..op.clone() };
        assert_eq!(signed.hash(entry_point, 5), hash);
        assert_ne!(op.hash(entry_point, 80001), hash);
        assert_ne!(op.hash(Address::from_low_u64_be(0xea), 5), hash);
    }

    #[test]
    fn pack_strips_offset_and_trailing_word() {
        let op = sample_op();
        let full = abi::encode(&[op.clone().into_token()]);
        let packed = op.pack();
        assert_eq!(packed.len(), full.len() - 64);
        assert_eq!(&packed[..], &full[32..full.len() - 32]);
    }

    #[test]
    fn receipt_parses_bundler_payload() {
        let raw = serde_json::json!({
            "userOpHash": format!("{:?}", H256::repeat_byte(0x11)),
            "entryPoint": "0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789",
            "sender": "0x9c5754de1443984659e1b3a8d1931d83475ba29c",
            "nonce": "0x3",
            "actualGasCost": "0x1b9d2c",
            "actualGasUsed": "0x1d4c0",
            "success": true,
            "logs": [],
            "receipt": {
                "transactionHash": format!("{:?}", H256::repeat_byte(0x22)),
                "blockNumber": "0x10",
                "logs": []
            }
        });
        let receipt: UserOperationReceipt = serde_json::from_value(raw).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.receipt.transaction_hash, H256::repeat_byte(0x22));
        assert_eq!(receipt.receipt.block_number, Some(U64::from(16)));
        assert!(receipt.reason.is_none());
    }
}

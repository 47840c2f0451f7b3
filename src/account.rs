// src/account.rs
use std::sync::Arc;

use ethers::abi::AbiEncode;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::contracts::{EntryPoint, ExecuteCall, SimpleAccountFactory};
use crate::error::{Result, TesterError};
use crate::gas::{calc_pre_verification_gas, get_gas_fee, GasOverheads};
use crate::types::{TransactionDetails, UserOperation};

/// Gas the account's own validation needs, on top of any deployment cost.
const BASE_VERIFICATION_GAS: u64 = 100_000;
/// Salt passed to the factory; one counterfactual account per owner.
const ACCOUNT_INDEX: u64 = 0;

/// Builds and signs user operations for a `SimpleAccount` owned by a local key.
pub struct SimpleAccountApi<M> {
    provider: Arc<M>,
    owner: LocalWallet,
    entry_point: EntryPoint<M>,
    factory: SimpleAccountFactory<M>,
    chain_id: u64,
    overheads: GasOverheads,
    account_address: OnceCell<Address>,
}

impl<M: Middleware + 'static> SimpleAccountApi<M> {
    pub fn new(
        provider: Arc<M>,
        owner: LocalWallet,
        entry_point: Address,
        factory: Address,
        chain_id: u64,
    ) -> Self {
        info!("Simple account owner: {:?}", owner.address());

        Self {
            entry_point: EntryPoint::new(entry_point, provider.clone()),
            factory: SimpleAccountFactory::new(factory, provider.clone()),
            provider,
            owner,
            chain_id,
            overheads: GasOverheads::default(),
            account_address: OnceCell::new(),
        }
    }

    /// Counterfactual account address, looked up once.
    pub async fn account_address(&self) -> Result<Address> {
        self.account_address
            .get_or_try_init(|| async {
                let address = self
                    .factory
                    .get_address(self.owner.address(), U256::from(ACCOUNT_INDEX))
                    .call()
                    .await
                    .map_err(|e| TesterError::ContractError(e.to_string()))?;
                info!("Simple account address: {:?}", address);
                Ok::<_, TesterError>(address)
            })
            .await
            .copied()
    }

    async fn is_deployed(&self) -> Result<bool> {
        let sender = self.account_address().await?;
        let code = self
            .provider
            .get_code(sender, None)
            .await
            .map_err(|e| TesterError::EthereumProviderError(e.to_string()))?;
        Ok(!code.is_empty())
    }

    fn factory_call_data(&self) -> Result<Bytes> {
        self.factory
            .create_account(self.owner.address(), U256::from(ACCOUNT_INDEX))
            .calldata()
            .ok_or_else(|| TesterError::ContractError("could not encode createAccount".to_string()))
    }

    /// Empty once the account exists, otherwise `factory ++ createAccount(owner, 0)`.
    pub async fn init_code(&self) -> Result<Bytes> {
        if self.is_deployed().await? {
            return Ok(Bytes::default());
        }

        let mut init_code = self.factory.address().as_bytes().to_vec();
        init_code.extend_from_slice(&self.factory_call_data()?);
        Ok(init_code.into())
    }

    pub async fn nonce(&self) -> Result<U256> {
        if !self.is_deployed().await? {
            return Ok(U256::zero());
        }
        let sender = self.account_address().await?;
        self.entry_point
            .get_nonce(sender, U256::zero())
            .call()
            .await
            .map_err(|e| TesterError::ContractError(e.to_string()))
    }

    /// Calldata for `SimpleAccount.execute(target, value, data)`.
    pub fn encode_execute(&self, target: Address, value: U256, data: Bytes) -> Bytes {
        ExecuteCall { dest: target, value, func: data }.encode().into()
    }

    async fn estimate_creation_gas(&self, init_code: &Bytes) -> Result<U256> {
        if init_code.is_empty() {
            return Ok(U256::zero());
        }
        let tx: TypedTransaction = TransactionRequest::new()
            .to(self.factory.address())
            .data(self.factory_call_data()?)
            .into();
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| TesterError::EthereumProviderError(e.to_string()))
    }

    async fn estimate_call_gas(&self, sender: Address, call_data: &Bytes) -> Result<U256> {
        let tx: TypedTransaction = TransactionRequest::new()
            .from(self.entry_point.address())
            .to(sender)
            .data(call_data.clone())
            .into();
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| TesterError::EthereumProviderError(e.to_string()))
    }

    /// Fills every field except the signature.
    pub async fn create_unsigned_user_op(&self, details: TransactionDetails) -> Result<UserOperation> {
        // 1. Account address, deployment code and nonce
        let sender = self.account_address().await?;
        let init_code = self.init_code().await?;
        let nonce = self.nonce().await?;
        let call_data = self.encode_execute(details.target, details.value, details.data);

        // 2. Gas limits for the call and for validation (plus deployment, if any)
        let call_gas_limit = self.estimate_call_gas(sender, &call_data).await?;
        let verification_gas_limit =
            U256::from(BASE_VERIFICATION_GAS) + self.estimate_creation_gas(&init_code).await?;

        // 3. Fees, unless the caller already picked them
        let fees = match details.gas {
            Some(fees) => fees,
            None => get_gas_fee(self.provider.as_ref()).await?,
        };

        let mut user_op = UserOperation {
            sender,
            nonce,
            init_code,
            call_data,
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas: U256::zero(),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            paymaster_and_data: Bytes::default(),
            signature: Bytes::default(),
        };
        // 4. Pre-verification gas over the otherwise complete op
        user_op.pre_verification_gas = calc_pre_verification_gas(&user_op, &self.overheads);

        debug!(
            "Unsigned user operation: nonce {} callGasLimit {} verificationGasLimit {} \
             preVerificationGas {}",
            user_op.nonce,
            user_op.call_gas_limit,
            user_op.verification_gas_limit,
            user_op.pre_verification_gas
        );
        Ok(user_op)
    }

    pub fn user_op_hash(&self, user_op: &UserOperation) -> H256 {
        user_op.hash(self.entry_point.address(), self.chain_id)
    }

    /// Signs the user-operation hash as an EIP-191 personal message.
    pub async fn sign_user_op(&self, user_op: UserOperation) -> Result<UserOperation> {
        let hash = self.user_op_hash(&user_op);
        let signature = self
            .owner
            .sign_message(hash.as_bytes())
            .await
            .map_err(|e| TesterError::SigningError(e.to_string()))?;

        Ok(UserOperation { signature: signature.to_vec().into(), ..user_op })
    }

    pub async fn create_signed_user_op(&self, details: TransactionDetails) -> Result<UserOperation> {
        let user_op = self.create_unsigned_user_op(details).await?;
        self.sign_user_op(user_op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ENTRY_POINT, SIMPLE_ACCOUNT_FACTORY};

    const OWNER_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    // Nothing here touches the network; the provider is only constructed.
    fn offline_api() -> SimpleAccountApi<Provider<Http>> {
        let provider = Provider::<Http>::try_from("http://127.0.0.1:8545").unwrap();
        let owner = OWNER_KEY.parse::<LocalWallet>().unwrap().with_chain_id(5u64);
        SimpleAccountApi::new(
            Arc::new(provider),
            owner,
            ENTRY_POINT.parse().unwrap(),
            SIMPLE_ACCOUNT_FACTORY.parse().unwrap(),
            5,
        )
    }

    #[tokio::test]
    async fn signature_recovers_to_owner() {
        let api = offline_api();
        let user_op = UserOperation {
            sender: Address::from_low_u64_be(0x5a),
            nonce: U256::from(1u64),
            call_data: api.encode_execute(
                Address::from_low_u64_be(0xc0),
                U256::zero(),
                Bytes::default(),
            ),
            ..Default::default()
        };

        let signed = api.sign_user_op(user_op.clone()).await.unwrap();
        assert_eq!(signed.signature.len(), 65);
        assert_eq!(api.user_op_hash(&signed), api.user_op_hash(&user_op));

        let signature = Signature::try_from(&signed.signature[..]).unwrap();
        let recovered = signature.recover(api.user_op_hash(&user_op).as_bytes()).unwrap();
        assert_eq!(recovered, api.owner.address());
    }

    #[test]
    fn execute_calldata_starts_with_selector() {
        let api = offline_api();
        let target = Address::from_low_u64_be(0xc0);
        let data = api.encode_execute(target, U256::zero(), vec![1u8, 2, 3].into());
        assert_eq!(&data[..4], &[0xb6, 0x1d, 0x27, 0xf6]);
        // selector + dest + value + offset + length + one padded word
        assert_eq!(data.len(), 4 + 5 * 32);
    }

    #[test]
    fn factory_calldata_targets_create_account() {
        let api = offline_api();
        let data = api.factory_call_data().unwrap();
        // createAccount(address,uint256)
        assert_eq!(&data[..4], &[0x5f, 0xbf, 0xb9, 0xcf]);
        assert_eq!(data.len(), 4 + 2 * 32);
    }
}

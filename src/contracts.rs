// src/contracts.rs
use ethers::contract::{abigen, parse_log};
use ethers::types::{Address, Bytes, TransactionReceipt};

abigen!(
    SimpleEventEmitter,
    r#"[
        function emitEvent(bytes parameter)
        event ParameterEmitted(bytes parameter)
    ]"#
);

abigen!(
    SimpleAccount,
    r#"[
        function execute(address dest, uint256 value, bytes func)
    ]"#
);

abigen!(
    SimpleAccountFactory,
    r#"[
        function createAccount(address owner, uint256 salt) returns (address)
        function getAddress(address owner, uint256 salt) view returns (address)
    ]"#
);

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) view returns (uint256)
    ]"#
);

/// Every `ParameterEmitted` payload the given contract logged in `receipt`.
pub fn emitted_parameters(receipt: &TransactionReceipt, contract: Address) -> Vec<Bytes> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == contract)
        .filter_map(|log| parse_log::<ParameterEmittedFilter>(log.clone()).ok())
        .map(|event| event.parameter)
        .collect()
}

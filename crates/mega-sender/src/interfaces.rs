//! Solidity bindings of the external contracts the orchestration core talks to.

#![allow(missing_docs)]

use alloy_sol_types::sol;

sol! {
    /// Deterministic deployment factory (CreateX).
    #[derive(Debug, PartialEq, Eq)]
    interface ICreateX {
        function deployCreate2(bytes32 salt, bytes initCode) external payable returns (address newContract);
        function deployCreate3(bytes32 salt, bytes initCode) external payable returns (address newContract);
        function computeCreate2Address(bytes32 salt, bytes32 initCodeHash, address deployer) external pure returns (address computedAddress);
        function computeCreate3Address(bytes32 salt, address deployer) external pure returns (address computedAddress);
    }

    /// Safe `MultiSendCallOnly`.
    #[derive(Debug, PartialEq, Eq)]
    interface IMultiSend {
        function multiSend(bytes transactions) external payable;
    }

    /// Safe transaction, hashed with EIP-712 against the Safe's domain.
    #[derive(Debug, PartialEq, Eq)]
    struct SafeTx {
        address to;
        uint256 value;
        bytes data;
        uint8 operation;
        uint256 safeTxGas;
        uint256 baseGas;
        uint256 gasPrice;
        address gasToken;
        address refundReceiver;
        uint256 nonce;
    }
}

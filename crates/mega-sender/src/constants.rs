//! Well-known addresses and protocol constants.

use alloy_primitives::{address, b256, hex, Address, B256};

/// Canonical address of the CreateX deterministic deployment factory.
pub const CREATEX_ADDRESS: Address = address!("ba5Ed099633D3B313e4D5F7bdc1305d3c28ba5Ed");

/// Init code of the proxy CreateX deploys for CREATE3 placements.
pub const CREATE3_PROXY_INITCODE: [u8; 16] = hex!("67363d3d37363d34f03d5260086018f3");

/// `keccak256(CREATE3_PROXY_INITCODE)`.
pub const CREATE3_PROXY_INITCODE_HASH: B256 =
    b256!("21c35dbe1b344a2488cf3321d6ce542f8e9f305544ff09e4993a62319a497c1f");

/// Canonical address of Safe's `MultiSendCallOnly` (v1.3.0).
pub const MULTISEND_CALL_ONLY_ADDRESS: Address =
    address!("40A2aCCbd92BCA938b02010E17A5b8929b49130D");

/// Separator used to join salt entropy components.
pub const SALT_SEPARATOR: &str = "/";

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Gas limit applied to every call in an execution context.
pub const DEFAULT_CALL_GAS_LIMIT: u64 = 15_000_000;

/// Salt flag bytes understood by the factory guard.
pub mod salt_flag {
    /// Guard binds the salt to the caller only.
    pub const SENDER_ONLY: u8 = 0x00;
    /// Guard binds the salt to the caller and the chain id.
    pub const CROSS_CHAIN_PROTECTED: u8 = 0x01;
}

/// Safe transaction operation kinds.
pub mod safe_operation {
    /// Regular call.
    pub const CALL: u8 = 0;
    /// Delegate call, used to reach `MultiSendCallOnly`.
    pub const DELEGATE_CALL: u8 = 1;
}

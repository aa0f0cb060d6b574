//! Deterministic address derivation.
//!
//! Reproduces the salt guard applied by the CreateX factory before it deploys, so that the
//! address of a contract can be known before the deployment is broadcast:
//!
//! - if the leading 20 bytes of the salt equal the caller and byte 21 is `0x00`, the guarded salt
//!   is `keccak256(bytes32(caller) ‖ salt)`;
//! - if the leading 20 bytes equal the caller and byte 21 is `0x01`, the guarded salt is
//!   `keccak256(abi.encode(caller, chainId, salt))`;
//! - otherwise it is `keccak256(abi.encode(salt))`.

use core::{
    fmt::{self, Display},
    str::FromStr,
};

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::{salt_flag, CREATE3_PROXY_INITCODE_HASH, SALT_SEPARATOR},
    interfaces::ICreateX,
    ExecutionContext, Operation, SenderError,
};

/// Hashes the non-empty `components`, joined with `/`, into salt entropy.
pub fn build_entropy<I, S>(components: I) -> B256
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = components
        .into_iter()
        .filter(|component| !component.as_ref().is_empty())
        .map(|component| component.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(SALT_SEPARATOR);
    keccak256(joined.as_bytes())
}

/// Builds a sender-bound salt: `sender ‖ 0x00 ‖ entropy[21..]`.
pub fn base_salt(sender: Address, entropy: B256) -> B256 {
    base_salt_with_flag(sender, salt_flag::SENDER_ONLY, entropy)
}

/// Builds a sender-bound salt with an explicit guard flag byte.
pub fn base_salt_with_flag(sender: Address, flag: u8, entropy: B256) -> B256 {
    let mut salt = B256::ZERO;
    salt[..20].copy_from_slice(sender.as_slice());
    salt[20] = flag;
    salt[21..].copy_from_slice(&entropy[21..]);
    salt
}

/// Applies the factory's salt guard for a deployment issued by `sender` on `chain_id`.
pub fn guarded_salt(salt: B256, sender: Address, chain_id: u64) -> B256 {
    let bound_to_sender = &salt[..20] == sender.as_slice();
    match salt[20] {
        salt_flag::SENDER_ONLY if bound_to_sender => {
            keccak256([sender.into_word().as_slice(), salt.as_slice()].concat())
        }
        salt_flag::CROSS_CHAIN_PROTECTED if bound_to_sender => {
            keccak256((sender, U256::from(chain_id), salt).abi_encode())
        }
        _ => keccak256(salt.abi_encode()),
    }
}

/// How the factory places a contract.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(try_from = "String", into = "&'static str")]
pub enum DeployStrategy {
    /// Two-step placement through a proxy; the address does not depend on the init code.
    #[default]
    Create3,
    /// One-step placement; the address depends on the init code hash.
    Create2,
}

/// String identifiers for deployment strategies.
pub mod name {
    /// The string identifier for [`DeployStrategy::Create3`](super::DeployStrategy::Create3).
    pub const CREATE3: &str = "create3";
    /// The string identifier for [`DeployStrategy::Create2`](super::DeployStrategy::Create2).
    pub const CREATE2: &str = "create2";
}

impl From<DeployStrategy> for &'static str {
    fn from(strategy: DeployStrategy) -> Self {
        match strategy {
            DeployStrategy::Create3 => name::CREATE3,
            DeployStrategy::Create2 => name::CREATE2,
        }
    }
}

impl FromStr for DeployStrategy {
    type Err = SenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            name::CREATE3 => Ok(Self::Create3),
            name::CREATE2 => Ok(Self::Create2),
            _ => Err(SenderError::InvalidStrategy(s.to_string())),
        }
    }
}

impl TryFrom<String> for DeployStrategy {
    type Error = SenderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for DeployStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &'static str = (*self).into();
        write!(f, "{s}")
    }
}

/// Computes the address `factory` places a contract at for an already guarded salt.
pub fn compute_address(
    factory: Address,
    guarded_salt: B256,
    init_code_hash: B256,
    strategy: DeployStrategy,
) -> Address {
    match strategy {
        DeployStrategy::Create2 => factory.create2(guarded_salt, init_code_hash),
        DeployStrategy::Create3 => {
            factory.create2(guarded_salt, CREATE3_PROXY_INITCODE_HASH).create(1)
        }
    }
}

/// Predicts the deployment address, asking the factory's pure endpoints when it is deployed in
/// `ctx` and falling back to [`compute_address`] otherwise.
pub fn predict_address<C: ExecutionContext + ?Sized>(
    ctx: &mut C,
    factory: Address,
    guarded_salt: B256,
    init_code_hash: B256,
    strategy: DeployStrategy,
) -> Result<Address, SenderError> {
    if !ctx.has_code(factory)? {
        return Ok(compute_address(factory, guarded_salt, init_code_hash, strategy));
    }

    let (payload, label) = match strategy {
        DeployStrategy::Create3 => (
            ICreateX::computeCreate3AddressCall { salt: guarded_salt, deployer: factory }
                .abi_encode(),
            ICreateX::computeCreate3AddressCall::SIGNATURE,
        ),
        DeployStrategy::Create2 => (
            ICreateX::computeCreate2AddressCall {
                salt: guarded_salt,
                initCodeHash: init_code_hash,
                deployer: factory,
            }
            .abi_encode(),
            ICreateX::computeCreate2AddressCall::SIGNATURE,
        ),
    };
    let outcome = ctx.view(Address::ZERO, &Operation::new(factory, payload, label))?;
    if !outcome.success {
        return Err(SenderError::AddressPredictionFailure(format!(
            "`{label}` failed on factory {factory}: {}",
            outcome.reason()
        )));
    }
    let predicted = Address::abi_decode(&outcome.return_data).map_err(|err| {
        SenderError::AddressPredictionFailure(format!("cannot decode `{label}` result: {err}"))
    })?;
    debug!(
        target: "mega_sender::salt",
        %factory, %guarded_salt, %strategy, %predicted,
        "Factory predicted address"
    );
    Ok(predicted)
}

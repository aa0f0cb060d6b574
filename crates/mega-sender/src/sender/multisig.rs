//! Safe multisig batching.
//!
//! A batch is turned into a single Safe transaction: a direct call when it holds one operation,
//! otherwise a delegate call into `MultiSendCallOnly` carrying the packed calls. The Safe
//! transaction is hashed with EIP-712 against the Safe's domain, signed by the proposer and
//! handed to a [`ProposalService`].

use std::collections::HashMap;

use alloy_primitives::{Address, Bytes, Signature, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{Eip712Domain, SolCall, SolStruct};
use auto_impl::auto_impl;
use serde::Serialize;
use tracing::debug;

use crate::{
    constants::safe_operation,
    interfaces::{IMultiSend, SafeTx},
    sender_id, Operation, SenderError, SenderId, ServiceError,
};

/// The sender that signs proposals on behalf of a Safe.
#[derive(derive_more::Debug, Clone)]
pub struct Proposer {
    /// Sender name.
    pub name: String,
    /// Sender id.
    pub id: SenderId,
    /// Address of the signing key.
    pub account: Address,
    #[debug(ignore)]
    signer: PrivateKeySigner,
}

impl Proposer {
    /// Wraps the key of the sender named `name`.
    pub fn new(name: impl Into<String>, signer: PrivateKeySigner) -> Self {
        let name = name.into();
        Self { id: sender_id(&name), account: signer.address(), name, signer }
    }

    /// Signs a Safe transaction hash, returning the 65-byte `r ‖ s ‖ v` signature.
    pub fn sign(&self, safe_tx_hash: B256) -> Result<Bytes, SenderError> {
        let signature = self.signer.sign_hash_sync(&safe_tx_hash)?;
        Ok(Bytes::copy_from_slice(&signature.as_bytes()))
    }
}

/// Backend of a [`Capability::BatchProposer`](super::Capability::BatchProposer) sender.
#[derive(Debug, Clone)]
pub struct MultisigBackend {
    /// The Safe account.
    pub safe: Address,
    /// Who signs proposals.
    pub proposer: Proposer,
    /// `MultiSendCallOnly` deployment used for batches of more than one call.
    pub multisend: Address,
}

impl MultisigBackend {
    /// Builds and signs the proposal for `operations` at the given Safe nonce.
    ///
    /// Fails with [`SenderError::ValueNotZero`] if any operation carries value.
    pub fn prepare(
        &self,
        chain_id: u64,
        nonce: U256,
        operations: &[Operation],
    ) -> Result<Proposal, SenderError> {
        if let Some(op) = operations.iter().find(|op| !op.value.is_zero()) {
            return Err(SenderError::ValueNotZero(op.label.clone()));
        }

        let transactions: Vec<_> = operations
            .iter()
            .map(|op| ProposedCall { target: op.target, payload: op.payload.clone() })
            .collect();
        let (to, data, operation) = match transactions.as_slice() {
            [single] => (single.target, single.payload.clone(), safe_operation::CALL),
            calls => (self.multisend, encode_multisend(calls), safe_operation::DELEGATE_CALL),
        };

        let mut proposal = Proposal {
            safe: self.safe,
            chain_id,
            nonce,
            to,
            value: U256::ZERO,
            data,
            operation,
            safe_tx_hash: B256::ZERO,
            proposer: self.proposer.account,
            signature: Bytes::new(),
            transactions,
        };
        proposal.safe_tx_hash = safe_tx_hash(chain_id, self.safe, &proposal.safe_tx());
        proposal.signature = self.proposer.sign(proposal.safe_tx_hash)?;
        Ok(proposal)
    }

    /// Prepares the proposal at the Safe's next nonce and submits it.
    ///
    /// Returns the proposal and the hash acknowledged by the service, which must equal the
    /// locally computed Safe transaction hash.
    pub fn propose<S: ProposalService + ?Sized>(
        &self,
        chain_id: u64,
        operations: &[Operation],
        service: &mut S,
    ) -> Result<(Proposal, B256), SenderError> {
        let nonce = service.next_nonce(self.safe)?;
        let proposal = self.prepare(chain_id, nonce, operations)?;
        debug!(
            target: "mega_sender::multisig",
            safe = %self.safe, %nonce, calls = proposal.transactions.len(),
            safe_tx_hash = %proposal.safe_tx_hash, "Submitting proposal"
        );

        let returned = service.propose(&proposal)?;
        if returned != proposal.safe_tx_hash {
            return Err(ServiceError::HashMismatch { expected: proposal.safe_tx_hash, returned }
                .into());
        }
        Ok((proposal, returned))
    }
}

/// One call inside a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposedCall {
    /// The called contract.
    pub target: Address,
    /// ABI-encoded calldata.
    pub payload: Bytes,
}

/// A signed Safe transaction ready for the coordination service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// The Safe account.
    pub safe: Address,
    /// Chain the Safe lives on.
    pub chain_id: u64,
    /// Safe nonce the transaction is bound to.
    pub nonce: U256,
    /// Safe transaction target.
    pub to: Address,
    /// Safe transaction value. Always zero.
    pub value: U256,
    /// Safe transaction calldata.
    pub data: Bytes,
    /// `0` for call, `1` for delegate call.
    pub operation: u8,
    /// EIP-712 hash of the Safe transaction.
    pub safe_tx_hash: B256,
    /// Address of the signing proposer.
    pub proposer: Address,
    /// Proposer signature over `safe_tx_hash`.
    pub signature: Bytes,
    /// The batched calls, in order.
    pub transactions: Vec<ProposedCall>,
}

impl Proposal {
    /// The Safe transaction this proposal carries. Gas refund fields are zero.
    pub fn safe_tx(&self) -> SafeTx {
        SafeTx {
            to: self.to,
            value: self.value,
            data: self.data.clone(),
            operation: self.operation,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            nonce: self.nonce,
        }
    }
}

/// Packs `calls` for `MultiSendCallOnly.multiSend(bytes)`.
///
/// Each call is encoded as `uint8 operation ‖ address to ‖ uint256 value ‖ uint256 length ‖
/// bytes data`, without padding.
pub fn encode_multisend(calls: &[ProposedCall]) -> Bytes {
    let mut packed = Vec::new();
    for call in calls {
        packed.push(safe_operation::CALL);
        packed.extend_from_slice(call.target.as_slice());
        packed.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
        packed.extend_from_slice(&U256::from(call.payload.len()).to_be_bytes::<32>());
        packed.extend_from_slice(&call.payload);
    }
    IMultiSend::multiSendCall { transactions: packed.into() }.abi_encode().into()
}

/// EIP-712 hash of `tx` for the Safe at `safe` on `chain_id`.
pub fn safe_tx_hash(chain_id: u64, safe: Address, tx: &SafeTx) -> B256 {
    let domain = Eip712Domain::new(None, None, Some(U256::from(chain_id)), Some(safe), None);
    tx.eip712_signing_hash(&domain)
}

/// Port to the off-chain multisig coordination service.
#[auto_impl(&mut, Box)]
pub trait ProposalService {
    /// The nonce the next proposal for `safe` must use.
    fn next_nonce(&mut self, safe: Address) -> Result<U256, ServiceError>;

    /// Submits a proposal, returning the hash the service registered it under.
    fn propose(&mut self, proposal: &Proposal) -> Result<B256, ServiceError>;
}

/// A [`ProposalService`] that validates and records proposals in memory.
///
/// Each accepted proposal consumes the Safe's nonce. Proposals are accepted only if their hash
/// matches their content and the signature recovers to the declared proposer.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProposalService {
    nonces: HashMap<Address, U256>,
    proposals: Vec<Proposal>,
}

impl InMemoryProposalService {
    /// Sets the current nonce of `safe`.
    pub fn with_nonce(mut self, safe: Address, nonce: u64) -> Self {
        self.nonces.insert(safe, U256::from(nonce));
        self
    }

    /// Accepted proposals, in submission order.
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    fn current_nonce(&self, safe: Address) -> U256 {
        self.nonces.get(&safe).copied().unwrap_or_default()
    }
}

impl ProposalService for InMemoryProposalService {
    fn next_nonce(&mut self, safe: Address) -> Result<U256, ServiceError> {
        Ok(self.current_nonce(safe))
    }

    fn propose(&mut self, proposal: &Proposal) -> Result<B256, ServiceError> {
        let safe = proposal.safe;
        let reject = |reason: String| ServiceError::Rejected { safe, reason };

        let nonce = self.current_nonce(safe);
        if proposal.nonce != nonce {
            return Err(reject(format!("expected nonce {nonce}, got {}", proposal.nonce)));
        }
        let hash = safe_tx_hash(proposal.chain_id, safe, &proposal.safe_tx());
        if hash != proposal.safe_tx_hash {
            let claimed = proposal.safe_tx_hash;
            return Err(reject(format!("safe tx hash {claimed} does not match content")));
        }
        let signer = Signature::from_raw(&proposal.signature)
            .and_then(|signature| signature.recover_address_from_prehash(&hash))
            .map_err(|err| reject(format!("invalid signature: {err}")))?;
        if signer != proposal.proposer {
            let proposer = proposal.proposer;
            return Err(reject(format!("signed by {signer}, not by proposer {proposer}")));
        }

        self.nonces.insert(safe, nonce + U256::from(1));
        self.proposals.push(proposal.clone());
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, b256, keccak256};
    use alloy_sol_types::SolValue;

    use super::*;
    use crate::constants::MULTISEND_CALL_ONLY_ADDRESS;

    const SAFE: Address = address!("0000000000000000000000000000000000005afe");
    const TARGET: Address = address!("0000000000000000000000000000000000001000");

    fn backend() -> MultisigBackend {
        let key = b256!("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
        let signer = PrivateKeySigner::from_bytes(&key).unwrap();
        MultisigBackend {
            safe: SAFE,
            proposer: Proposer::new("deployer", signer),
            multisend: MULTISEND_CALL_ONLY_ADDRESS,
        }
    }

    fn op(payload: &'static [u8]) -> Operation {
        Operation::new(TARGET, Bytes::from_static(payload), "f()")
    }

    #[test]
    fn test_safe_tx_hash_matches_manual_encoding() {
        let tx = SafeTx {
            to: TARGET,
            value: U256::ZERO,
            data: Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
            operation: safe_operation::DELEGATE_CALL,
            safeTxGas: U256::ZERO,
            baseGas: U256::ZERO,
            gasPrice: U256::ZERO,
            gasToken: Address::ZERO,
            refundReceiver: Address::ZERO,
            nonce: U256::from(7),
        };

        let type_hash = keccak256(
            "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,\
             uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,\
             uint256 nonce)",
        );
        let struct_hash = keccak256(
            (
                type_hash,
                tx.to,
                tx.value,
                keccak256(&tx.data),
                U256::from(tx.operation),
                U256::ZERO,
                U256::ZERO,
                U256::ZERO,
                Address::ZERO,
                Address::ZERO,
                tx.nonce,
            )
                .abi_encode(),
        );
        let domain_type_hash = keccak256("EIP712Domain(uint256 chainId,address verifyingContract)");
        let domain_separator = keccak256((domain_type_hash, U256::from(10), SAFE).abi_encode());
        let expected = keccak256(
            [&[0x19, 0x01][..], domain_separator.as_slice(), struct_hash.as_slice()].concat(),
        );

        assert_eq!(safe_tx_hash(10, SAFE, &tx), expected);
    }

    #[test]
    fn test_multisend_packing() {
        let calls = [
            ProposedCall { target: TARGET, payload: Bytes::from_static(&[1, 2, 3]) },
            ProposedCall { target: SAFE, payload: Bytes::new() },
        ];
        let encoded = encode_multisend(&calls);
        let decoded = IMultiSend::multiSendCall::abi_decode(&encoded).unwrap();
        let packed = decoded.transactions;

        assert_eq!(packed.len(), (1 + 20 + 32 + 32 + 3) + (1 + 20 + 32 + 32));
        assert_eq!(packed[0], safe_operation::CALL);
        assert_eq!(&packed[1..21], TARGET.as_slice());
        assert_eq!(U256::from_be_slice(&packed[21..53]), U256::ZERO);
        assert_eq!(U256::from_be_slice(&packed[53..85]), U256::from(3));
        assert_eq!(&packed[85..88], &[1, 2, 3]);
        assert_eq!(&packed[89..109], SAFE.as_slice());
    }

    #[test]
    fn test_single_operation_is_a_direct_call() {
        let proposal = backend().prepare(1, U256::ZERO, &[op(&[0xaa])]).unwrap();
        assert_eq!(proposal.to, TARGET);
        assert_eq!(proposal.operation, safe_operation::CALL);
        assert_eq!(proposal.data, Bytes::from_static(&[0xaa]));
    }

    #[test]
    fn test_batch_is_a_multisend_delegate_call() {
        let proposal = backend().prepare(1, U256::ZERO, &[op(&[0xaa]), op(&[0xbb])]).unwrap();
        assert_eq!(proposal.to, MULTISEND_CALL_ONLY_ADDRESS);
        assert_eq!(proposal.operation, safe_operation::DELEGATE_CALL);
        assert_eq!(proposal.data, encode_multisend(&proposal.transactions));
        assert_eq!(proposal.transactions.len(), 2);
    }

    #[test]
    fn test_value_bearing_operation_is_rejected() {
        let operations = [op(&[0xaa]), op(&[0xbb]).with_value(U256::from(1))];
        let err = backend().prepare(1, U256::ZERO, &operations).unwrap_err();
        assert!(matches!(err, SenderError::ValueNotZero(label) if label == "f()"));
    }

    #[test]
    fn test_signature_recovers_to_proposer() {
        let backend = backend();
        let proposal = backend.prepare(1, U256::from(3), &[op(&[0xaa])]).unwrap();
        let signature = Signature::from_raw(&proposal.signature).unwrap();
        assert_eq!(
            signature.recover_address_from_prehash(&proposal.safe_tx_hash).unwrap(),
            backend.proposer.account
        );
        assert_eq!(backend.proposer.account, address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
    }

    #[test]
    fn test_in_memory_service_consumes_nonces() {
        let backend = backend();
        let mut service = InMemoryProposalService::default().with_nonce(SAFE, 5);

        let (first, hash) = backend.propose(1, &[op(&[0xaa])], &mut service).unwrap();
        assert_eq!(first.nonce, U256::from(5));
        assert_eq!(hash, first.safe_tx_hash);

        let (second, _) = backend.propose(1, &[op(&[0xbb])], &mut service).unwrap();
        assert_eq!(second.nonce, U256::from(6));
        assert_eq!(service.proposals(), &[first, second]);
    }

    #[test]
    fn test_in_memory_service_rejects_tampered_proposal() {
        let mut proposal = backend().prepare(1, U256::ZERO, &[op(&[0xaa])]).unwrap();
        proposal.data = Bytes::from_static(&[0xbb]);
        let mut service = InMemoryProposalService::default();
        assert!(matches!(service.propose(&proposal), Err(ServiceError::Rejected { .. })));
        assert!(service.proposals().is_empty());
    }

    #[test]
    fn test_service_hash_mismatch_is_reported() {
        struct Forgetful;

        impl ProposalService for Forgetful {
            fn next_nonce(&mut self, _safe: Address) -> Result<U256, ServiceError> {
                Ok(U256::ZERO)
            }

            fn propose(&mut self, _proposal: &Proposal) -> Result<B256, ServiceError> {
                Ok(B256::ZERO)
            }
        }

        let err = backend().propose(1, &[op(&[0xaa])], &mut Forgetful).unwrap_err();
        assert!(matches!(
            err,
            SenderError::Proposal(ServiceError::HashMismatch { returned, .. }) if returned.is_zero()
        ));
    }
}

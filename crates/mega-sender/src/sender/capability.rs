use alloy_signer_local::PrivateKeySigner;

use super::MultisigBackend;

/// How a sender turns operations into real effects.
#[derive(Debug, Clone)]
pub enum Capability {
    /// Signs and executes each operation on its own, in order. Synchronous.
    ImmediateSigner(SignerBackend),
    /// Accumulates operations and submits them as one multisig proposal. Asynchronous.
    BatchProposer(MultisigBackend),
}

impl Capability {
    /// Whether operations take effect during broadcast rather than after an off-chain approval.
    pub const fn is_synchronous(&self) -> bool {
        matches!(self, Self::ImmediateSigner(_))
    }

    /// The in-memory key, if the sender is backed by one.
    pub fn in_memory_signer(&self) -> Option<&PrivateKeySigner> {
        match self {
            Self::ImmediateSigner(SignerBackend::InMemory(signer)) => Some(signer),
            _ => None,
        }
    }
}

/// Key material behind an [`Capability::ImmediateSigner`].
#[derive(Debug, Clone)]
pub enum SignerBackend {
    /// A private key held in memory.
    InMemory(PrivateKeySigner),
    /// A hardware wallet; signatures happen out of process.
    Hardware {
        /// HD derivation path of the account.
        derivation_path: String,
    },
}

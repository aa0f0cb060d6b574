//! Error types of the orchestration core.
//!
//! Every variant of [`SenderError`] is fatal for the current run: there is no retry layer, the
//! first error is surfaced to the caller as-is.

use alloy_primitives::{Address, B256};

use crate::{OperationId, SenderId};

/// Errors raised while simulating, broadcasting or configuring senders.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// An operation reverted or halted in the simulation context.
    #[error("operation `{label}` failed in simulation: {reason}")]
    SimulationFailure {
        /// The operation label.
        label: String,
        /// Decoded revert reason or halt reason.
        reason: String,
    },

    /// The real context returned data different from the simulated prediction.
    #[error("operation `{0}` returned different data when executed than when simulated")]
    ExecutionMismatch(String),

    /// The operation reverted or halted when replayed in the real context.
    #[error("operation `{label}` failed when executed: {reason}")]
    ExecutionFailed {
        /// The operation label.
        label: String,
        /// Decoded revert reason or halt reason.
        reason: String,
    },

    /// A value-bearing operation was queued into a multisig batch.
    #[error("operation `{0}` carries value and cannot be batched")]
    ValueNotZero(String),

    /// Unknown deployment strategy.
    #[error("invalid deployment strategy `{0}`")]
    InvalidStrategy(String),

    /// The predicted address could not be computed or was contradicted by the factory.
    #[error("address prediction failed: {0}")]
    AddressPredictionFailure(String),

    /// The designated proposer cannot sign proposals.
    #[error("sender `{0}` cannot act as a proposer")]
    ProposerNotSupported(String),

    /// No sender with the given name or id is registered.
    #[error("unknown sender `{0}`")]
    UnknownSender(String),

    /// A sender with the same name is already registered.
    #[error("sender `{0}` is already registered")]
    DuplicateSender(String),

    /// The sender configuration is incomplete or malformed.
    #[error("invalid configuration for sender `{name}`: {reason}")]
    InvalidSenderConfig {
        /// The sender name.
        name: String,
        /// What is wrong.
        reason: String,
    },

    /// The configured account does not match the key's address.
    #[error("sender `{name}` is configured with account {configured} but its key controls {derived}")]
    AccountMismatch {
        /// The sender name.
        name: String,
        /// The configured account.
        configured: Address,
        /// The address derived from the key.
        derived: Address,
    },

    /// The simulation and real contexts disagree on the chain id.
    #[error("simulation context is on chain {simulation} but real context is on chain {real}")]
    ChainMismatch {
        /// Chain id of the simulation context.
        simulation: u64,
        /// Chain id of the real context.
        real: u64,
    },

    /// A previous fatal error aborted the run.
    #[error("run was aborted by a previous error")]
    RunAborted,

    /// The broadcast phase already ran.
    #[error("run was already broadcast")]
    AlreadyBroadcast,

    /// An operation in a terminal status was mutated.
    #[error("operation {0} is already finalized")]
    OperationFinalized(OperationId),

    /// The sender's own queue disagrees with the global queue order.
    #[error("sender {sender} replayed operation {found} but the global queue expected {expected}")]
    QueueOutOfOrder {
        /// The sender.
        sender: SenderId,
        /// Id expected by the global queue.
        expected: OperationId,
        /// Id found at the head of the sender queue.
        found: OperationId,
    },

    /// The simulated return data could not be decoded into the call's return type.
    #[error("cannot decode return data of `{label}`: {reason}")]
    ReturnDecode {
        /// The operation label.
        label: String,
        /// Decoder error.
        reason: String,
    },

    /// The proposer failed to sign.
    #[error("signer error: {0}")]
    Signer(#[from] alloy_signer::Error),

    /// The multisig coordination service rejected the proposal.
    #[error("proposal service error: {0}")]
    Proposal(#[from] ServiceError),

    /// The execution context failed internally.
    #[error("execution context error: {0}")]
    Context(#[from] ContextError),
}

/// Internal failure of an execution context (database or EVM error), as opposed to a reverted
/// call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The EVM could not execute the transaction.
    #[error("EVM error: {0}")]
    Evm(String),
}

/// Error reported by a multisig coordination service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service refused the proposal.
    #[error("proposal rejected for {safe}: {reason}")]
    Rejected {
        /// The multisig account.
        safe: Address,
        /// Service message.
        reason: String,
    },

    /// The service could not be reached.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The service returned a hash different from the locally computed one.
    #[error("service acknowledged {returned} but the proposal hash is {expected}")]
    HashMismatch {
        /// Locally computed safe-tx hash.
        expected: B256,
        /// Hash returned by the service.
        returned: B256,
    },
}

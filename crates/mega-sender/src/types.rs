//! Core value types flowing through the orchestration pipeline.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::SolValue;
use serde::{Deserialize, Serialize};

use crate::SenderError;

/// Unique identifier of a [`RichOperation`] within a run.
pub type OperationId = B256;

/// Identifier of a sender, `keccak256(name)`.
pub type SenderId = B256;

/// Identifier of a flushed batch, `keccak256(abi.encode(senderId, batchSequence))`.
pub type BatchId = B256;

/// Derives the [`SenderId`] of a sender from its name.
pub fn sender_id(name: &str) -> SenderId {
    keccak256(name.as_bytes())
}

/// Derives the [`BatchId`] for the `sequence`-th batch of a sender.
pub fn batch_id(sender: SenderId, sequence: u64) -> BatchId {
    keccak256((sender, U256::from(sequence)).abi_encode())
}

/// A single call request against a target contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// The called contract.
    pub target: Address,
    /// ABI-encoded calldata.
    pub payload: Bytes,
    /// Native value attached to the call.
    pub value: U256,
    /// Human-readable label, usually the called function signature.
    pub label: String,
}

impl Operation {
    /// Creates a value-free operation.
    pub fn new(target: Address, payload: impl Into<Bytes>, label: impl Into<String>) -> Self {
        Self { target, payload: payload.into(), value: U256::ZERO, label: label.into() }
    }

    /// Attaches native value to the operation.
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Lifecycle status of a [`RichOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Created but not simulated yet.
    Pending,
    /// Simulated and waiting for broadcast.
    Simulated,
    /// Replayed in the real context. Terminal.
    Executed,
    /// Handed to the multisig coordination service. Terminal.
    Queued,
}

impl OperationStatus {
    /// Returns `true` for statuses an operation never leaves.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Executed | Self::Queued)
    }
}

/// An [`Operation`] together with its lifecycle bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RichOperation {
    /// Run-unique id.
    pub id: OperationId,
    /// Owning sender.
    pub sender_id: SenderId,
    /// The wrapped operation.
    pub operation: Operation,
    /// Current status.
    pub status: OperationStatus,
    /// Return data captured in the simulation context.
    pub simulated_return_data: Bytes,
    /// Return data observed when replayed in the real context.
    pub executed_return_data: Option<Bytes>,
}

impl RichOperation {
    /// Wraps a freshly simulated operation.
    pub fn simulated(
        id: OperationId,
        sender_id: SenderId,
        operation: Operation,
        return_data: Bytes,
    ) -> Self {
        Self {
            id,
            sender_id,
            operation,
            status: OperationStatus::Simulated,
            simulated_return_data: return_data,
            executed_return_data: None,
        }
    }

    /// The operation label.
    pub fn label(&self) -> &str {
        &self.operation.label
    }

    /// Records the real-context return data and moves the operation to
    /// [`OperationStatus::Executed`].
    pub(crate) fn mark_executed(&mut self, return_data: Bytes) -> Result<(), SenderError> {
        self.ensure_open()?;
        self.executed_return_data = Some(return_data);
        self.status = OperationStatus::Executed;
        Ok(())
    }

    /// Moves the operation to [`OperationStatus::Queued`].
    pub(crate) fn mark_queued(&mut self) -> Result<(), SenderError> {
        self.ensure_open()?;
        self.status = OperationStatus::Queued;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SenderError> {
        if self.status.is_terminal() {
            return Err(SenderError::OperationFinalized(self.id));
        }
        Ok(())
    }
}

/// Generates run-unique operation ids from the chain id, a run marker and a monotonic counter.
#[derive(Debug, Clone)]
pub struct OperationIdGenerator {
    chain_id: u64,
    run_marker: u64,
    counter: u64,
}

impl OperationIdGenerator {
    /// Creates a generator for one run.
    pub const fn new(chain_id: u64, run_marker: u64) -> Self {
        Self { chain_id, run_marker, counter: 0 }
    }

    /// Returns the next id.
    pub fn next_id(&mut self) -> OperationId {
        self.counter += 1;
        keccak256(
            (U256::from(self.chain_id), U256::from(self.run_marker), U256::from(self.counter))
                .abi_encode(),
        )
    }

    /// Number of ids handed out so far.
    pub const fn issued(&self) -> u64 {
        self.counter
    }
}

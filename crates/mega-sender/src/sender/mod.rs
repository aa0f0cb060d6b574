//! Senders: named signing identities with their own pending queue.

use std::collections::VecDeque;

use alloy_primitives::{Address, B256};
use serde::Serialize;
use tracing::{debug, trace};

use crate::{
    batch_id, sender_id, BatchId, EventBus, ExecutionContext, GlobalQueue, LifecycleEvent,
    Operation, OperationId, RichOperation, SenderError, SenderId,
};

mod capability;
pub use capability::*;

mod config;
pub use config::*;

mod multisig;
pub use multisig::*;

/// Where a sender is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderState {
    /// Waiting for the next operation.
    #[default]
    Idle,
    /// An operation is being simulated.
    Simulating,
    /// Operations are being replayed or batched.
    Broadcasting,
    /// The multisig batch was proposed; nothing more will be accepted in this run.
    Flushed,
}

/// A closed batch of one sender's operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// `keccak256(abi.encode(senderId, batchSequence))`.
    pub batch_id: BatchId,
    /// Owning sender.
    pub sender_id: SenderId,
    /// The operations, in simulation order and in terminal status.
    pub operations: Vec<RichOperation>,
    /// The submitted proposal, for multisig batches.
    pub proposal: Option<Proposal>,
    /// Hash acknowledged by the coordination service, for multisig batches.
    pub proposal_hash: Option<B256>,
}

/// A polymorphic execution unit.
///
/// Every operation a sender issues is simulated right away and its id appended to the pending
/// queue; the queue is drained during broadcast, either by replaying the operations one by one
/// ([`Capability::ImmediateSigner`]) or by proposing them as one multisig batch
/// ([`Capability::BatchProposer`]).
#[derive(Debug)]
pub struct Sender {
    id: SenderId,
    name: String,
    account: Address,
    capability: Capability,
    pending: VecDeque<OperationId>,
    batch_sequence: u64,
    state: SenderState,
}

impl Sender {
    /// Creates an idle sender acting as `account`.
    pub fn new(name: impl Into<String>, account: Address, capability: Capability) -> Self {
        let name = name.into();
        Self {
            id: sender_id(&name),
            name,
            account,
            capability,
            pending: VecDeque::new(),
            batch_sequence: 0,
            state: SenderState::Idle,
        }
    }

    /// The sender id, `keccak256(name)`.
    pub const fn id(&self) -> SenderId {
        self.id
    }

    /// The sender name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The account operations are executed as.
    pub const fn account(&self) -> Address {
        self.account
    }

    /// How the sender executes.
    pub const fn capability(&self) -> &Capability {
        &self.capability
    }

    /// Whether the sender executes during broadcast.
    pub const fn is_synchronous(&self) -> bool {
        self.capability.is_synchronous()
    }

    /// Ids of the operations waiting for broadcast, in issuance order.
    pub const fn pending(&self) -> &VecDeque<OperationId> {
        &self.pending
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> SenderState {
        self.state
    }

    /// Number of batches closed so far.
    pub const fn batches_closed(&self) -> u64 {
        self.batch_sequence
    }

    /// Simulates `op` as this sender and queues it as pending.
    pub(crate) fn simulate<C: ExecutionContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        id: OperationId,
        op: Operation,
    ) -> Result<RichOperation, SenderError> {
        self.state = SenderState::Simulating;
        let outcome = ctx.call(self.account, &op);
        self.state = SenderState::Idle;

        let outcome = outcome?;
        if !outcome.success {
            return Err(SenderError::SimulationFailure {
                label: op.label,
                reason: outcome.reason().to_string(),
            });
        }
        trace!(
            target: "mega_sender::sender",
            sender = %self.name, %id, label = %op.label,
            "Simulated"
        );
        self.pending.push_back(id);
        Ok(RichOperation::simulated(id, self.id, op, outcome.return_data))
    }

    /// Replays the head of the pending queue in the real context.
    ///
    /// `rich` must be the operation at the head of the queue. Its real return data must equal
    /// the simulated one.
    pub(crate) fn replay_next<C: ExecutionContext + ?Sized>(
        &mut self,
        ctx: &mut C,
        rich: &mut RichOperation,
        events: &mut EventBus,
    ) -> Result<(), SenderError> {
        self.state = SenderState::Broadcasting;
        match self.pending.front() {
            Some(&found) if found == rich.id => {}
            found => {
                return Err(SenderError::QueueOutOfOrder {
                    sender: self.id,
                    expected: rich.id,
                    found: found.copied().unwrap_or_default(),
                })
            }
        }

        let outcome = ctx.call(self.account, &rich.operation)?;
        if !outcome.success {
            return Err(SenderError::ExecutionFailed {
                label: rich.label().to_string(),
                reason: outcome.reason().to_string(),
            });
        }
        if outcome.return_data != rich.simulated_return_data {
            return Err(SenderError::ExecutionMismatch(rich.label().to_string()));
        }

        rich.mark_executed(outcome.return_data.clone())?;
        self.pending.pop_front();
        events.emit(LifecycleEvent::Executed {
            id: rich.id,
            sender: self.id,
            target: rich.operation.target,
            label: rich.label().to_string(),
            return_data: outcome.return_data,
        });
        Ok(())
    }

    /// Closes the current batch of a synchronous sender whose operations were all replayed.
    fn close_replayed_batch(&mut self, queue: &GlobalQueue) -> Batch {
        let operations = queue.iter().filter(|rich| rich.sender_id == self.id).cloned().collect();
        self.state = SenderState::Idle;
        Batch {
            batch_id: self.next_batch_id(),
            sender_id: self.id,
            operations,
            proposal: None,
            proposal_hash: None,
        }
    }

    /// Drains the pending queue.
    ///
    /// Synchronous senders replay every operation not yet executed in the real context, then close
    /// their batch; multisig senders propose them as one batch through `service` and mark them
    /// queued.
    pub(crate) fn flush<C, S>(
        &mut self,
        ctx: &mut C,
        queue: &mut GlobalQueue,
        service: &mut S,
        events: &mut EventBus,
    ) -> Result<Batch, SenderError>
    where
        C: ExecutionContext + ?Sized,
        S: ProposalService + ?Sized,
    {
        self.state = SenderState::Broadcasting;
        if self.is_synchronous() {
            let sender = self.id;
            for rich in queue.iter_mut().filter(|rich| rich.sender_id == sender) {
                if !rich.status.is_terminal() {
                    self.replay_next(ctx, rich, events)?;
                }
            }
            return Ok(self.close_replayed_batch(queue));
        }
        self.propose_batch(ctx.chain_id(), queue, service, events)
    }

    fn propose_batch<S: ProposalService + ?Sized>(
        &mut self,
        chain_id: u64,
        queue: &mut GlobalQueue,
        service: &mut S,
        events: &mut EventBus,
    ) -> Result<Batch, SenderError> {
        let Capability::BatchProposer(backend) = &self.capability else {
            return Err(SenderError::ProposerNotSupported(self.name.clone()));
        };

        let sender = self.id;
        let mut ids = Vec::with_capacity(self.pending.len());
        let mut operations = Vec::with_capacity(self.pending.len());
        for rich in queue.iter().filter(|rich| rich.sender_id == sender) {
            ids.push(rich.id);
            operations.push(rich.operation.clone());
        }
        for (expected, found) in ids.iter().zip(&self.pending) {
            if expected != found {
                return Err(SenderError::QueueOutOfOrder {
                    sender,
                    expected: *expected,
                    found: *found,
                });
            }
        }

        let (proposal, proposal_hash) = backend.propose(chain_id, &operations, service)?;
        let (safe, proposer) = (backend.safe, backend.proposer.account);

        let mut batched = Vec::with_capacity(ids.len());
        for rich in queue.iter_mut().filter(|rich| rich.sender_id == sender) {
            rich.mark_queued()?;
            batched.push(rich.clone());
        }
        self.pending.clear();
        self.state = SenderState::Flushed;

        let batch_id = self.next_batch_id();
        debug!(
            target: "mega_sender::sender",
            sender = %self.name, %batch_id, %proposal_hash,
            "Batch proposed"
        );
        events.emit(LifecycleEvent::BatchProposed {
            batch_id,
            sender,
            safe,
            proposer,
            operations: ids,
            proposal_hash,
        });
        Ok(Batch {
            batch_id,
            sender_id: sender,
            operations: batched,
            proposal: Some(proposal),
            proposal_hash: Some(proposal_hash),
        })
    }

    fn next_batch_id(&mut self) -> BatchId {
        let id = batch_id(self.id, self.batch_sequence);
        self.batch_sequence += 1;
        id
    }
}

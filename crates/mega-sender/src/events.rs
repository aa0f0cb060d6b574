//! Lifecycle events emitted while a run progresses.

use alloy_primitives::{Address, Bytes, B256};
use auto_impl::auto_impl;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{BatchId, OperationId, SenderId};

/// An observable step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LifecycleEvent {
    /// An operation was simulated and queued.
    Simulated {
        /// The operation id.
        id: OperationId,
        /// The issuing sender.
        sender: SenderId,
        /// The called contract.
        target: Address,
        /// The operation label.
        label: String,
        /// Data returned in the simulation context.
        return_data: Bytes,
    },
    /// An operation failed in simulation or was rejected after it, aborting the run.
    Failed {
        /// The operation id.
        id: OperationId,
        /// The issuing sender.
        sender: SenderId,
        /// The called contract.
        target: Address,
        /// The operation label.
        label: String,
        /// Decoded failure reason.
        reason: String,
    },
    /// An operation was replayed in the real context.
    Executed {
        /// The operation id.
        id: OperationId,
        /// The issuing sender.
        sender: SenderId,
        /// The called contract.
        target: Address,
        /// The operation label.
        label: String,
        /// Data returned in the real context.
        return_data: Bytes,
    },
    /// A multisig batch was handed to the coordination service.
    BatchProposed {
        /// The batch id.
        batch_id: BatchId,
        /// The multisig sender.
        sender: SenderId,
        /// The multisig account.
        safe: Address,
        /// The account that signed the proposal.
        proposer: Address,
        /// Operations in the batch, in simulation order.
        operations: Vec<OperationId>,
        /// Hash acknowledged by the service.
        proposal_hash: B256,
    },
    /// The broadcast phase finished.
    BroadcastCompleted {
        /// Operations replayed in the real context.
        executed: usize,
        /// Operations handed to multisig batches.
        queued: usize,
        /// Batches closed, synchronous and multisig.
        batches: usize,
    },
}

/// Receives every [`LifecycleEvent`] of a run, in emission order.
#[auto_impl(&mut, Box)]
pub trait EventListener {
    /// Called once per event.
    fn on_event(&mut self, event: &LifecycleEvent);
}

/// Fans events out to listeners and keeps the full log.
#[derive(derive_more::Debug, Default)]
pub struct EventBus {
    log: Vec<LifecycleEvent>,
    #[debug(ignore)]
    listeners: Vec<Box<dyn EventListener>>,
}

impl EventBus {
    /// Registers a listener. It only observes events emitted after registration.
    pub fn subscribe(&mut self, listener: impl EventListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Records `event` and delivers it to every listener.
    pub fn emit(&mut self, event: LifecycleEvent) {
        match &event {
            LifecycleEvent::Simulated { id, target, label, .. } => {
                debug!(
                    target: "mega_sender::events",
                    %id, to = %target, %label,
                    "Operation simulated"
                );
            }
            LifecycleEvent::Failed { id, target, label, reason, .. } => {
                warn!(
                    target: "mega_sender::events",
                    %id, to = %target, %label, %reason,
                    "Operation failed"
                );
            }
            LifecycleEvent::Executed { id, target, label, .. } => {
                info!(
                    target: "mega_sender::events",
                    %id, to = %target, %label,
                    "Operation executed"
                );
            }
            LifecycleEvent::BatchProposed { batch_id, safe, operations, proposal_hash, .. } => {
                info!(
                    target: "mega_sender::events",
                    %batch_id, %safe, operations = operations.len(), %proposal_hash,
                    "Batch proposed"
                );
            }
            LifecycleEvent::BroadcastCompleted { executed, queued, batches } => {
                info!(
                    target: "mega_sender::events",
                    executed,
                    queued,
                    batches,
                    "Broadcast completed"
                );
            }
        }
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
        self.log.push(event);
    }

    /// Every event emitted so far.
    pub fn log(&self) -> &[LifecycleEvent] {
        &self.log
    }
}

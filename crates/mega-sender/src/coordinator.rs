//! The transaction coordinator: global ordering and the two-phase run protocol.
//!
//! A run has two phases:
//!
//! 1. **Simulation.** Every [`Coordinator::execute`] simulates its operation in the simulation
//!    context as the issuing sender and appends it to the single global queue, so the queue order
//!    is the call order across all senders.
//! 2. **Broadcast.** [`Coordinator::broadcast`] runs once. It walks the global queue and replays
//!    every operation of a synchronous sender in the real context, in the original interleaving,
//!    verifying each against its simulated return data. Only then is each multisig sender's batch
//!    proposed, in registration order.
//!
//! The first error aborts the run. Nothing already executed in the real context is rolled back.

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    constants::{CREATEX_ADDRESS, DEFAULT_NAMESPACE, MULTISEND_CALL_ONLY_ADDRESS},
    BackendConfig, Batch, Capability, EventBus, EventListener, ExecutionContext,
    ExecutionContexts, Harness, HarnessTable, LifecycleEvent, MultisigBackend, Operation,
    OperationId, OperationIdGenerator, OperationStatus, Proposal, ProposalService, Proposer,
    RichOperation, Sender, SenderError, SenderId, SenderInitConfig, SignerBackend,
};

/// Run-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoordinatorConfig {
    /// Logical environment the run deploys into. Part of every deployment salt.
    pub namespace: String,
    /// The deterministic deployment factory.
    pub factory: Address,
    /// `MultiSendCallOnly` used by multisig batches.
    pub multisend: Address,
    /// Run marker mixed into operation ids. Defaults to the current unix time in seconds.
    pub run_marker: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            factory: CREATEX_ADDRESS,
            multisend: MULTISEND_CALL_ONLY_ADDRESS,
            run_marker: None,
        }
    }
}

/// All operations of a run, in simulation order.
#[derive(Debug, Clone, Default)]
pub struct GlobalQueue {
    entries: Vec<RichOperation>,
    index: HashMap<OperationId, usize>,
}

impl GlobalQueue {
    pub(crate) fn push(&mut self, rich: RichOperation) {
        self.index.insert(rich.id, self.entries.len());
        self.entries.push(rich);
    }

    pub(crate) fn iter_mut(&mut self) -> std::slice::IterMut<'_, RichOperation> {
        self.entries.iter_mut()
    }

    /// Looks an operation up by id.
    pub fn get(&self, id: OperationId) -> Option<&RichOperation> {
        self.index.get(&id).map(|&position| &self.entries[position])
    }

    /// Iterates over the operations in simulation order.
    pub fn iter(&self) -> std::slice::Iter<'_, RichOperation> {
        self.entries.iter()
    }

    /// The operations in simulation order.
    pub fn as_slice(&self) -> &[RichOperation] {
        &self.entries
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    /// Every operation of the run, in simulation order and in terminal status.
    pub operations: Vec<RichOperation>,
    /// Closed batches: synchronous senders first, then multisig senders in registration order.
    pub batches: Vec<Batch>,
}

impl BroadcastReport {
    /// Proposals submitted to the coordination service.
    pub fn proposals(&self) -> impl Iterator<Item = &Proposal> {
        self.batches.iter().filter_map(|batch| batch.proposal.as_ref())
    }

    /// Number of operations with the given status.
    pub fn count(&self, status: OperationStatus) -> usize {
        self.operations.iter().filter(|rich| rich.status == status).count()
    }
}

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    /// Operations are being issued and simulated.
    Simulating,
    /// The broadcast phase ran.
    Broadcast,
    /// A fatal error stopped the run.
    Aborted,
}

/// Owns the senders, the global queue and both execution contexts of one run.
#[derive(derive_more::Debug)]
pub struct Coordinator<C> {
    config: CoordinatorConfig,
    contexts: ExecutionContexts<C>,
    ids: OperationIdGenerator,
    senders: Vec<Sender>,
    queue: GlobalQueue,
    harnesses: HarnessTable,
    events: EventBus,
    phase: RunPhase,
}

impl<C: ExecutionContext> Coordinator<C> {
    /// Starts a run over the given contexts.
    pub fn new(config: CoordinatorConfig, contexts: ExecutionContexts<C>) -> Self {
        let run_marker = config.run_marker.unwrap_or_else(|| {
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
        });
        let ids = OperationIdGenerator::new(contexts.chain_id(), run_marker);
        debug!(
            target: "mega_sender::coordinator",
            chain_id = contexts.chain_id(), run_marker,
            "Run started"
        );
        Self {
            config,
            contexts,
            ids,
            senders: Vec::new(),
            queue: GlobalQueue::default(),
            harnesses: HarnessTable::default(),
            events: EventBus::default(),
            phase: RunPhase::Simulating,
        }
    }

    /// Creates a sender from its configuration.
    ///
    /// A multisig sender's proposer must already be registered and must be backed by an
    /// in-memory key.
    pub fn register_sender(&mut self, config: SenderInitConfig) -> Result<SenderId, SenderError> {
        self.ensure_simulating()?;
        let SenderInitConfig { name, account, backend } = config;
        if name.is_empty() {
            return Err(invalid_config(&name, "name must not be empty"));
        }
        if self.sender(&name).is_some() {
            return Err(SenderError::DuplicateSender(name));
        }

        let (account, capability) = match backend {
            BackendConfig::PrivateKey { key } => {
                let signer = PrivateKeySigner::from_bytes(&key)
                    .map_err(|err| invalid_config(&name, &format!("invalid private key: {err}")))?;
                let derived = signer.address();
                if let Some(configured) = account.filter(|configured| *configured != derived) {
                    return Err(SenderError::AccountMismatch { name, configured, derived });
                }
                (derived, Capability::ImmediateSigner(SignerBackend::InMemory(signer)))
            }
            BackendConfig::Ledger { derivation_path } => {
                let account = account
                    .ok_or_else(|| invalid_config(&name, "a ledger sender needs an account"))?;
                if derivation_path.is_empty() {
                    return Err(invalid_config(&name, "derivation path must not be empty"));
                }
                (account, Capability::ImmediateSigner(SignerBackend::Hardware { derivation_path }))
            }
            BackendConfig::Safe { proposer } => {
                let safe = account
                    .ok_or_else(|| invalid_config(&name, "a safe sender needs the safe address"))?;
                let proposer = self.resolve_proposer(&proposer)?;
                let multisend = self.config.multisend;
                (safe, Capability::BatchProposer(MultisigBackend { safe, proposer, multisend }))
            }
        };
        if account.is_zero() {
            return Err(invalid_config(&name, "account must not be the zero address"));
        }

        let sender = Sender::new(name, account, capability);
        let id = sender.id();
        info!(
            target: "mega_sender::coordinator",
            name = sender.name(), %account, synchronous = sender.is_synchronous(),
            "Sender registered"
        );
        self.senders.push(sender);
        Ok(id)
    }

    fn resolve_proposer(&self, name: &str) -> Result<Proposer, SenderError> {
        let sender =
            self.sender(name).ok_or_else(|| SenderError::UnknownSender(name.to_string()))?;
        let signer = sender
            .capability()
            .in_memory_signer()
            .ok_or_else(|| SenderError::ProposerNotSupported(name.to_string()))?;
        Ok(Proposer::new(name, signer.clone()))
    }

    /// Simulates `op` as `sender` and appends it to the global queue.
    ///
    /// A failed simulation aborts the run: the queue is left unchanged and every later
    /// `execute` or `broadcast` fails with [`SenderError::RunAborted`].
    pub fn execute(&mut self, sender: &str, op: Operation) -> Result<RichOperation, SenderError> {
        self.ensure_simulating()?;
        let index = self.sender_index(sender)?;
        let id = self.ids.next_id();
        let (target, label) = (op.target, op.label.clone());

        let sender = &mut self.senders[index];
        let sender_id = sender.id();
        match sender.simulate(&mut self.contexts.simulation, id, op) {
            Ok(rich) => {
                self.events.emit(LifecycleEvent::Simulated {
                    id,
                    sender: sender_id,
                    target,
                    label,
                    return_data: rich.simulated_return_data.clone(),
                });
                self.queue.push(rich.clone());
                Ok(rich)
            }
            Err(err) => {
                let reason = match &err {
                    SenderError::SimulationFailure { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.events.emit(LifecycleEvent::Failed {
                    id,
                    sender: sender_id,
                    target,
                    label,
                    reason,
                });
                self.abort(&err);
                Err(err)
            }
        }
    }

    /// Executes `ops` in order as `sender`. The first failure aborts the run.
    pub fn execute_all(
        &mut self,
        sender: &str,
        ops: impl IntoIterator<Item = Operation>,
    ) -> Result<Vec<RichOperation>, SenderError> {
        ops.into_iter().map(|op| self.execute(sender, op)).collect()
    }

    /// Wraps `target` so that calls made through it are issued by `sender`.
    pub fn harness(
        &mut self,
        sender: &str,
        target: Address,
    ) -> Result<Harness<'_, C>, SenderError> {
        let index = self.sender_index(sender)?;
        let (id, account) = (self.senders[index].id(), self.senders[index].account());
        let proxy = self.harnesses.proxy(id, account, target);
        Ok(Harness::new(self, sender.to_string(), target, proxy))
    }

    /// Runs the broadcast phase. Can only run once per run.
    pub fn broadcast<S: ProposalService + ?Sized>(
        &mut self,
        service: &mut S,
    ) -> Result<BroadcastReport, SenderError> {
        self.ensure_simulating()?;
        self.phase = RunPhase::Broadcast;
        info!(
            target: "mega_sender::coordinator",
            operations = self.queue.len(), senders = self.senders.len(),
            "Broadcasting"
        );
        self.run_broadcast(service).inspect_err(|err| self.abort(err))
    }

    fn run_broadcast<S: ProposalService + ?Sized>(
        &mut self,
        service: &mut S,
    ) -> Result<BroadcastReport, SenderError> {
        let Self { contexts, senders, queue, events, .. } = self;
        let synchronous: HashMap<SenderId, usize> = senders
            .iter()
            .enumerate()
            .filter(|(_, sender)| sender.is_synchronous())
            .map(|(index, sender)| (sender.id(), index))
            .collect();

        for rich in queue.iter_mut() {
            if let Some(&index) = synchronous.get(&rich.sender_id) {
                senders[index].replay_next(&mut contexts.real, rich, events)?;
            }
        }

        // Synchronous senders have nothing left to replay; flushing closes their batch.
        let mut batches = Vec::new();
        for sender in senders.iter_mut().filter(|sender| sender.is_synchronous()) {
            if queue.iter().any(|rich| rich.sender_id == sender.id()) {
                batches.push(sender.flush(&mut contexts.real, queue, service, events)?);
            }
        }
        for sender in senders.iter_mut().filter(|sender| !sender.is_synchronous()) {
            if !sender.pending().is_empty() {
                batches.push(sender.flush(&mut contexts.real, queue, service, events)?);
            }
        }

        let report = BroadcastReport { operations: queue.as_slice().to_vec(), batches };
        events.emit(LifecycleEvent::BroadcastCompleted {
            executed: report.count(OperationStatus::Executed),
            queued: report.count(OperationStatus::Queued),
            batches: report.batches.len(),
        });
        Ok(report)
    }

    fn ensure_simulating(&self) -> Result<(), SenderError> {
        match self.phase {
            RunPhase::Simulating => Ok(()),
            RunPhase::Broadcast => Err(SenderError::AlreadyBroadcast),
            RunPhase::Aborted => Err(SenderError::RunAborted),
        }
    }

    /// Rejects an operation that simulated successfully but failed a later check.
    ///
    /// The operation stays in the global queue with its simulated status, a
    /// [`LifecycleEvent::Failed`] is emitted for it and the run is aborted, so it can never be
    /// broadcast.
    pub(crate) fn reject(&mut self, rich: &RichOperation, err: &SenderError) {
        self.events.emit(LifecycleEvent::Failed {
            id: rich.id,
            sender: rich.sender_id,
            target: rich.operation.target,
            label: rich.label().to_string(),
            reason: err.to_string(),
        });
        self.abort(err);
    }

    pub(crate) fn abort(&mut self, err: &SenderError) {
        warn!(target: "mega_sender::coordinator", %err, "Run aborted");
        self.phase = RunPhase::Aborted;
    }

    fn sender_index(&self, name: &str) -> Result<usize, SenderError> {
        self.senders
            .iter()
            .position(|sender| sender.name() == name)
            .ok_or_else(|| SenderError::UnknownSender(name.to_string()))
    }

    /// The chain id of the run.
    pub fn chain_id(&self) -> u64 {
        self.contexts.chain_id()
    }
}

impl<C> Coordinator<C> {
    /// Run-wide settings.
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Current phase.
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// The sender named `name`.
    pub fn sender(&self, name: &str) -> Option<&Sender> {
        self.senders.iter().find(|sender| sender.name() == name)
    }

    /// All senders, in registration order.
    pub fn senders(&self) -> &[Sender] {
        &self.senders
    }

    /// The global queue.
    pub const fn queue(&self) -> &GlobalQueue {
        &self.queue
    }

    /// Harness proxies created so far.
    pub const fn harnesses(&self) -> &HarnessTable {
        &self.harnesses
    }

    /// Every lifecycle event emitted so far.
    pub fn events(&self) -> &[LifecycleEvent] {
        self.events.log()
    }

    /// Registers a listener for subsequent lifecycle events.
    pub fn subscribe(&mut self, listener: impl EventListener + 'static) {
        self.events.subscribe(listener);
    }

    /// The execution contexts.
    pub const fn contexts(&self) -> &ExecutionContexts<C> {
        &self.contexts
    }

    /// Mutable access to the execution contexts, for seeding state.
    pub fn contexts_mut(&mut self) -> &mut ExecutionContexts<C> {
        &mut self.contexts
    }

    /// Ends the run and returns its contexts.
    pub fn into_contexts(self) -> ExecutionContexts<C> {
        self.contexts
    }
}

fn invalid_config(name: &str, reason: &str) -> SenderError {
    SenderError::InvalidSenderConfig { name: name.to_string(), reason: reason.to_string() }
}

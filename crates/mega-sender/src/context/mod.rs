//! Execution contexts operations run against.
//!
//! A run owns two contexts of the same kind:
//!
//! - the **simulation** context, where every operation is executed as soon as it is issued so
//!   that later operations observe the effects of earlier ones and callers get return data
//!   immediately;
//! - the **real** context, whose effects are final. Operations only reach it through the
//!   coordinator's verified replay during broadcast.
//!
//! Both are plain values passed explicitly; nothing leaks from one to the other except through
//! the replay step.

use alloy_primitives::{Address, Bytes};
use auto_impl::auto_impl;

use crate::{ContextError, Operation, SenderError};

mod evm;
pub use evm::*;

/// Result of executing an [`Operation`] in an [`ExecutionContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// Whether the call succeeded.
    pub success: bool,
    /// Return data on success, revert data on revert, empty on halt.
    pub return_data: Bytes,
    /// Gas consumed by the call.
    pub gas_used: u64,
    /// Why the call failed, if it did.
    pub reason: Option<String>,
}

impl CallOutcome {
    /// A successful call.
    pub const fn success(return_data: Bytes, gas_used: u64) -> Self {
        Self { success: true, return_data, gas_used, reason: None }
    }

    /// A failed call.
    pub fn failure(return_data: Bytes, gas_used: u64, reason: impl Into<String>) -> Self {
        Self { success: false, return_data, gas_used, reason: Some(reason.into()) }
    }

    /// The failure reason, or an empty string for successful calls.
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }
}

/// An environment in which operations can be executed on behalf of an account.
///
/// Implementations impersonate `from`: no signature is required to act as an account.
#[auto_impl(&mut, Box)]
pub trait ExecutionContext {
    /// The chain id the context executes on.
    fn chain_id(&self) -> u64;

    /// Executes `op` as `from` and commits its effects.
    fn call(&mut self, from: Address, op: &Operation) -> Result<CallOutcome, ContextError>;

    /// Executes `op` as `from` without committing anything.
    fn view(&mut self, from: Address, op: &Operation) -> Result<CallOutcome, ContextError>;

    /// Whether `address` has code deployed.
    fn has_code(&mut self, address: Address) -> Result<bool, ContextError>;
}

/// The pair of execution contexts owned by a run.
#[derive(Debug)]
pub struct ExecutionContexts<C> {
    /// Provisional context; its effects are never final.
    pub simulation: C,
    /// Final context; only written by broadcast replays.
    pub real: C,
}

impl<C: ExecutionContext> ExecutionContexts<C> {
    /// Pairs two contexts, which must agree on the chain id.
    pub fn new(simulation: C, real: C) -> Result<Self, SenderError> {
        let (simulation_chain, real_chain) = (simulation.chain_id(), real.chain_id());
        if simulation_chain != real_chain {
            return Err(SenderError::ChainMismatch {
                simulation: simulation_chain,
                real: real_chain,
            });
        }
        Ok(Self { simulation, real })
    }

    /// The chain id shared by both contexts.
    pub fn chain_id(&self) -> u64 {
        self.real.chain_id()
    }
}

impl<C: ExecutionContext + Clone> ExecutionContexts<C> {
    /// Forks the simulation context off the current state of `real`.
    pub fn fork(real: C) -> Self {
        Self { simulation: real.clone(), real }
    }
}

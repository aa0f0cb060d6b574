//! Call interception: typed calls against a target are captured as operations of a sender.

use std::collections::HashMap;

use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_sol_types::SolCall;

use crate::{Coordinator, ExecutionContext, Operation, RichOperation, SenderError, SenderId};

/// Stable proxy identity of a sender against `target`:
/// `keccak256(senderId ‖ account ‖ target)[12..]`.
///
/// The sender id keeps proxies distinct when two senders act as the same account.
pub fn proxy_address(sender: SenderId, account: Address, target: Address) -> Address {
    let hash = keccak256([sender.as_slice(), account.as_slice(), target.as_slice()].concat());
    Address::from_slice(&hash[12..])
}

/// Lazily populated cache of harness proxies, keyed by sender and target.
#[derive(Debug, Clone, Default)]
pub struct HarnessTable {
    proxies: HashMap<(SenderId, Address), Address>,
}

impl HarnessTable {
    /// Returns the proxy for `(sender, target)`, creating it on first use.
    pub fn proxy(&mut self, sender: SenderId, account: Address, target: Address) -> Address {
        *self
            .proxies
            .entry((sender, target))
            .or_insert_with(|| proxy_address(sender, account, target))
    }

    /// Returns the proxy for `(sender, target)` if it was created.
    pub fn get(&self, sender: SenderId, target: Address) -> Option<Address> {
        self.proxies.get(&(sender, target)).copied()
    }

    /// Number of proxies created.
    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    /// Whether no proxy was created yet.
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// A target contract as seen through one sender.
///
/// Every call made through the harness becomes an [`Operation`] of the sender: it is simulated
/// immediately, queued for broadcast, and its simulated return value is handed back to the
/// caller.
#[derive(Debug)]
pub struct Harness<'a, C> {
    coordinator: &'a mut Coordinator<C>,
    sender: String,
    target: Address,
    proxy: Address,
}

impl<'a, C: ExecutionContext> Harness<'a, C> {
    pub(crate) fn new(
        coordinator: &'a mut Coordinator<C>,
        sender: String,
        target: Address,
        proxy: Address,
    ) -> Self {
        Self { coordinator, sender, target, proxy }
    }

    /// The proxy identity of this (sender, target) pair.
    pub const fn proxy(&self) -> Address {
        self.proxy
    }

    /// The wrapped target.
    pub const fn target(&self) -> Address {
        self.target
    }

    /// Calls the target and returns the simulated, decoded result.
    pub fn call<T: SolCall>(&mut self, call: &T) -> Result<T::Return, SenderError> {
        self.call_with_value(call, U256::ZERO)
    }

    /// Calls the target with native value attached.
    pub fn call_with_value<T: SolCall>(
        &mut self,
        call: &T,
        value: U256,
    ) -> Result<T::Return, SenderError> {
        let op = Operation::new(self.target, call.abi_encode(), T::SIGNATURE).with_value(value);
        let rich = self.coordinator.execute(&self.sender, op)?;
        T::abi_decode_returns(&rich.simulated_return_data).map_err(|err| {
            SenderError::ReturnDecode { label: T::SIGNATURE.to_string(), reason: err.to_string() }
        })
    }

    /// Calls the target with raw calldata.
    pub fn call_raw(
        &mut self,
        payload: impl Into<Bytes>,
        label: impl Into<String>,
    ) -> Result<RichOperation, SenderError> {
        let op = Operation::new(self.target, payload, label);
        self.coordinator.execute(&self.sender, op)
    }
}

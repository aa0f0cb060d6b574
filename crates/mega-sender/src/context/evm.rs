//! In-memory EVM execution context.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::decode_revert_reason;
use revm::{
    context::{
        result::{EVMError, ExecutionResult, Output},
        CfgEnv, TxEnv,
    },
    database::{AccountState, CacheDB, EmptyDB},
    primitives::{TxKind, KECCAK_EMPTY},
    state::Bytecode,
    Context, ExecuteCommitEvm, MainBuilder, MainContext,
};
use tracing::trace;

use super::{CallOutcome, ExecutionContext};
use crate::{constants::DEFAULT_CALL_GAS_LIMIT, ContextError, Operation};

/// An [`ExecutionContext`] backed by a mainnet `revm` EVM over an in-memory database.
///
/// Callers are impersonated: nonce checks and EIP-3607 are disabled so that any account,
/// including contract accounts such as multisigs, can originate calls. Cloning the context
/// forks its state.
#[derive(Debug, Clone, derive_more::Deref)]
pub struct EvmContext {
    #[deref]
    db: CacheDB<EmptyDB>,
    chain_id: u64,
    gas_limit: u64,
}

impl EvmContext {
    /// Creates an empty context on `chain_id`.
    pub fn new(chain_id: u64) -> Self {
        Self { db: CacheDB::default(), chain_id, gas_limit: DEFAULT_CALL_GAS_LIMIT }
    }

    /// Sets the gas limit applied to every call.
    pub const fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Sets the code for an account.
    pub fn set_account_code(&mut self, address: Address, code: Bytes) {
        let bytecode = Bytecode::new_legacy(code);
        let code_hash = bytecode.hash_slow();
        let Ok(account) = self.db.load_account(address);
        account.info.code = Some(bytecode.clone());
        account.info.code_hash = code_hash;
        account.account_state = AccountState::None;
        self.db.cache.contracts.insert(code_hash, bytecode);
    }

    /// Sets the code for an account.
    pub fn account_code(mut self, address: Address, code: Bytes) -> Self {
        self.set_account_code(address, code);
        self
    }

    /// Sets the balance for an account.
    pub fn set_account_balance(&mut self, address: Address, balance: U256) {
        let Ok(account) = self.db.load_account(address);
        account.info.balance = balance;
        account.account_state = AccountState::None;
    }

    /// Sets the balance for an account.
    pub fn account_balance(mut self, address: Address, balance: U256) -> Self {
        self.set_account_balance(address, balance);
        self
    }

    /// Sets the nonce for an account.
    pub fn set_account_nonce(&mut self, address: Address, nonce: u64) {
        let Ok(account) = self.db.load_account(address);
        account.info.nonce = nonce;
        account.account_state = AccountState::None;
    }

    /// Sets a storage slot for an account.
    pub fn set_storage(&mut self, address: Address, slot: U256, value: U256) {
        let Ok(()) = self.db.insert_account_storage(address, slot, value);
    }

    /// Returns the balance of an account.
    pub fn balance(&self, address: Address) -> U256 {
        self.db
            .cache
            .accounts
            .get(&address)
            .map(|account| account.info.balance)
            .unwrap_or_default()
    }

    /// Returns a storage slot of an account.
    pub fn storage(&self, address: Address, slot: U256) -> U256 {
        self.db
            .cache
            .accounts
            .get(&address)
            .and_then(|account| account.storage.get(&slot).copied())
            .unwrap_or_default()
    }

    /// Returns the nonce of an account.
    pub fn nonce(&self, address: Address) -> u64 {
        self.db.cache.accounts.get(&address).map(|account| account.info.nonce).unwrap_or(0)
    }

    fn transact(
        db: &mut CacheDB<EmptyDB>,
        chain_id: u64,
        gas_limit: u64,
        from: Address,
        op: &Operation,
    ) -> Result<CallOutcome, ContextError> {
        let mut cfg: CfgEnv = CfgEnv::default();
        cfg.chain_id = chain_id;
        cfg.disable_nonce_check = true;
        cfg.disable_eip3607 = true;

        let mut evm = Context::mainnet().with_cfg(cfg).with_db(db).build_mainnet();
        let tx = TxEnv {
            caller: from,
            kind: TxKind::Call(op.target),
            data: op.payload.clone(),
            value: op.value,
            gas_limit,
            chain_id: Some(chain_id),
            ..Default::default()
        };

        let result = match evm.transact_commit(tx) {
            Ok(result) => result,
            Err(EVMError::Transaction(err)) => {
                return Ok(CallOutcome::failure(
                    Bytes::new(),
                    0,
                    format!("invalid transaction: {err}"),
                ))
            }
            Err(err) => return Err(ContextError::Evm(err.to_string())),
        };
        trace!(target: "mega_sender::context", %from, to = %op.target, ?result, "Call executed");

        Ok(match result {
            ExecutionResult::Success { output, gas_used, .. } => {
                let return_data = match output {
                    Output::Call(data) => data,
                    Output::Create(_, address) => address
                        .map(|address| Bytes::copy_from_slice(address.into_word().as_slice()))
                        .unwrap_or_default(),
                };
                CallOutcome::success(return_data, gas_used)
            }
            ExecutionResult::Revert { gas_used, output } => {
                let reason = decode_revert_reason(&output)
                    .unwrap_or_else(|| format!("execution reverted with {output}"));
                CallOutcome::failure(output, gas_used, reason)
            }
            ExecutionResult::Halt { reason, gas_used } => {
                let reason = format!("execution halted: {reason:?}");
                CallOutcome::failure(Bytes::new(), gas_used, reason)
            }
        })
    }
}

impl ExecutionContext for EvmContext {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn call(&mut self, from: Address, op: &Operation) -> Result<CallOutcome, ContextError> {
        Self::transact(&mut self.db, self.chain_id, self.gas_limit, from, op)
    }

    fn view(&mut self, from: Address, op: &Operation) -> Result<CallOutcome, ContextError> {
        let mut scratch = self.db.clone();
        Self::transact(&mut scratch, self.chain_id, self.gas_limit, from, op)
    }

    fn has_code(&mut self, address: Address) -> Result<bool, ContextError> {
        Ok(self
            .db
            .cache
            .accounts
            .get(&address)
            .is_some_and(|account| account.info.code_hash != KECCAK_EMPTY))
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;
    use crate::test_utils::{counter_code, reverting_code, word};

    const CALLER: Address = address!("0000000000000000000000000000000000100000");
    const COUNTER: Address = address!("0000000000000000000000000000000000100001");

    fn increment() -> Operation {
        Operation::new(COUNTER, Bytes::new(), "increment()")
    }

    #[test]
    fn test_call_commits_and_view_does_not() {
        let mut ctx = EvmContext::new(1).account_code(COUNTER, counter_code());

        let viewed = ctx.view(CALLER, &increment()).unwrap();
        assert!(viewed.success);
        assert_eq!(viewed.return_data, word(1));
        assert_eq!(ctx.storage(COUNTER, U256::ZERO), U256::ZERO);

        let called = ctx.call(CALLER, &increment()).unwrap();
        assert_eq!(called.return_data, word(1));
        assert_eq!(ctx.storage(COUNTER, U256::ZERO), U256::from(1));

        let called = ctx.call(CALLER, &increment()).unwrap();
        assert_eq!(called.return_data, word(2));
    }

    #[test]
    fn test_clone_forks_state() {
        let real = EvmContext::new(1).account_code(COUNTER, counter_code());
        let mut fork = real.clone();
        fork.call(CALLER, &increment()).unwrap();
        assert_eq!(fork.storage(COUNTER, U256::ZERO), U256::from(1));
        assert_eq!(real.storage(COUNTER, U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_revert_is_reported_as_failure() {
        let target = address!("0000000000000000000000000000000000100002");
        let mut ctx = EvmContext::new(1).account_code(target, reverting_code());
        let outcome = ctx.call(CALLER, &Operation::new(target, Bytes::new(), "boom()")).unwrap();
        assert!(!outcome.success);
        assert!(outcome.reason.is_some());
    }

    #[test]
    fn test_value_transfer_requires_balance() {
        let recipient = address!("0000000000000000000000000000000000100003");
        let transfer =
            Operation::new(recipient, Bytes::new(), "transfer").with_value(U256::from(100));

        let mut ctx = EvmContext::new(1);
        let outcome = ctx.call(CALLER, &transfer).unwrap();
        assert!(!outcome.success);

        ctx.set_account_balance(CALLER, U256::from(1_000));
        let outcome = ctx.call(CALLER, &transfer).unwrap();
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(ctx.balance(recipient), U256::from(100));
        assert_eq!(ctx.balance(CALLER), U256::from(900));
    }

    #[test]
    fn test_has_code() {
        let mut ctx = EvmContext::new(1).account_code(COUNTER, counter_code());
        assert!(ctx.has_code(COUNTER).unwrap());
        assert!(!ctx.has_code(CALLER).unwrap());
    }

    #[test]
    fn test_contract_account_can_originate_calls() {
        let mut ctx = EvmContext::new(1)
            .account_code(COUNTER, counter_code())
            .account_code(CALLER, reverting_code());
        let outcome = ctx.call(CALLER, &increment()).unwrap();
        assert!(outcome.success, "{outcome:?}");
    }
}

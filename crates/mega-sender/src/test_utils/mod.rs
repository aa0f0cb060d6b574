//! Test utilities: bytecode generation and small canned contracts.

use alloy_primitives::{Bytes, B256, U256};
use alloy_sol_types::{Revert, SolError};
use revm::bytecode::opcode::{
    ADD, CALLDATALOAD, CALLER, DUP1, EQ, JUMPDEST, JUMPI, MSTORE, PUSH0, RETURN, SHR, SLOAD, SSTORE,
};

mod opcode_gen;
pub use opcode_gen::*;

/// Reason carried by [`reverting_code`].
pub const REVERT_REASON: &str = "boom";

/// ABI word holding `value`.
pub fn word(value: u64) -> Bytes {
    Bytes::copy_from_slice(&U256::from(value).to_be_bytes::<32>())
}

/// A contract that increments storage slot 0 on every call and returns the new value.
pub fn counter_code() -> Bytes {
    BytecodeBuilder::default()
        .push_number(0)
        .append(SLOAD)
        .push_number(1)
        .append(ADD)
        .append(DUP1)
        .push_number(0)
        .append(SSTORE)
        .push_number(0)
        .append(MSTORE)
        .push_number(32)
        .push_number(0)
        .append(RETURN)
        .build()
}

/// A contract that always reverts with `Error("boom")`.
pub fn reverting_code() -> Bytes {
    let data = Revert { reason: REVERT_REASON.to_string() }.abi_encode();
    BytecodeBuilder::default().revert_with_data(data).build()
}

/// A contract that returns `value` to every call.
pub fn constant_code(value: B256) -> Bytes {
    BytecodeBuilder::default().return_with_data(value).build()
}

/// A contract that returns `msg.sender` as an ABI word.
pub fn caller_code() -> Bytes {
    BytecodeBuilder::default()
        .append(CALLER)
        .push_number(0)
        .append(MSTORE)
        .push_number(32)
        .push_number(0)
        .append(RETURN)
        .build()
}

/// A contract that returns `on_match` when called with `selector` and `otherwise` for any other
/// calldata.
pub fn dispatch_code(selector: [u8; 4], on_match: B256, otherwise: B256) -> Bytes {
    let head = |destination: u64| {
        BytecodeBuilder::default()
            .append(PUSH0)
            .append(CALLDATALOAD)
            .push_number(0xe0)
            .append(SHR)
            .push_bytes(selector)
            .append(EQ)
            .push_number(destination)
            .append(JUMPI)
    };
    let fallback = BytecodeBuilder::default().return_with_data(otherwise).build();
    let destination = head(0).len() + fallback.len();
    assert!(destination < 0x100);
    head(destination as u64)
        .append_many(fallback.iter().copied())
        .append(JUMPDEST)
        .return_with_data(on_match)
        .build()
}

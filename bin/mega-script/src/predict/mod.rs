//! Predict module: offline deterministic address derivation.

mod cmd;

pub use cmd::*;

//! `mega-script` CLI tool for multi-sender deployment scripts
//!
//! Scripts are simulated against an in-memory chain, operation by operation, and then
//! broadcast: key-backed senders replay their operations, Safe senders propose batches.

use clap::Parser;

mod cmd;
pub use cmd::*;

mod common;
mod predict;
mod run;

fn main() -> Result<(), Error> {
    MainCmd::parse().run().inspect_err(|e| eprintln!("{e}"))
}

//! Run module: simulate a script against an in-memory chain, then broadcast it.

mod cmd;
mod script;

pub use cmd::*;
pub use script::*;

pub use crate::common::{PreStateArgs, Result, ScriptError};

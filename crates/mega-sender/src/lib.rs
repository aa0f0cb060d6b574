//! Multi-sender transaction orchestration for `MegaETH` scripts.
//!
//! Operations issued by several senders are simulated as they are issued, kept in one global
//! queue, and then broadcast once: synchronous signers replay their operations in the original
//! interleaving, multisig senders propose their batch afterwards.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;
pub mod interfaces;

mod context;
pub use context::*;

mod coordinator;
pub use coordinator::*;

mod deployer;
pub use deployer::*;

mod error;
pub use error::*;

mod events;
pub use events::*;

mod harness;
pub use harness::*;

mod registry;
pub use registry::*;

pub mod salt;
pub use salt::{
    base_salt, base_salt_with_flag, build_entropy, compute_address, guarded_salt,
    predict_address, DeployStrategy,
};

mod sender;
pub use sender::*;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

mod types;
pub use types::*;

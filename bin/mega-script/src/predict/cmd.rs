use alloy_primitives::{keccak256, Address, Bytes, B256};
use clap::Parser;
use mega_sender::{
    base_salt_with_flag, compute_address,
    constants::{salt_flag, CREATEX_ADDRESS, DEFAULT_NAMESPACE},
    guarded_salt, DeployRequest, DeployStrategy,
};
use serde::Serialize;

use crate::common::Result;

/// Predict the address of a deterministic deployment
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Registry identifier of the contract
    #[arg(value_name = "IDENTIFIER")]
    pub identifier: String,

    /// Deploying account
    #[arg(long = "sender", visible_aliases = ["from"])]
    pub sender: Address,

    /// Instance label
    #[arg(long = "label")]
    pub label: Option<String>,

    /// Namespace of the deployment
    #[arg(long = "namespace", default_value = DEFAULT_NAMESPACE, env = "NAMESPACE")]
    pub namespace: String,

    /// Chain id
    #[arg(long = "chain-id", visible_aliases = ["chainid"], default_value = "1", env = "CHAIN_ID")]
    pub chain_id: u64,

    /// Deployment factory
    #[arg(long = "factory", default_value_t = CREATEX_ADDRESS)]
    pub factory: Address,

    /// Placement strategy (create3 or create2)
    #[arg(long = "strategy", default_value = "create3")]
    pub strategy: String,

    /// Creation code (hex). Only affects create2 placements.
    #[arg(long = "init-code", default_value = "0x")]
    pub init_code: Bytes,

    /// Bind the salt to the chain id
    #[arg(long = "cross-chain-protected")]
    pub cross_chain_protected: bool,
}

/// A predicted deployment.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Salt passed to the factory.
    pub salt: B256,
    /// Salt after the factory's guard.
    pub guarded_salt: B256,
    /// Predicted address.
    pub address: Address,
}

impl Cmd {
    /// Execute the predict command
    pub fn run(&self) -> Result<()> {
        let prediction = self.predict()?;
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        Ok(())
    }

    fn predict(&self) -> Result<Prediction> {
        let strategy: DeployStrategy = self.strategy.parse()?;
        let mut request = DeployRequest::new(self.identifier.clone(), self.init_code.clone());
        if let Some(label) = &self.label {
            request = request.with_label(label.clone());
        }
        let flag = if self.cross_chain_protected {
            salt_flag::CROSS_CHAIN_PROTECTED
        } else {
            salt_flag::SENDER_ONLY
        };

        let salt = base_salt_with_flag(self.sender, flag, request.entropy(&self.namespace));
        let guarded = guarded_salt(salt, self.sender, self.chain_id);
        let address = compute_address(self.factory, guarded, keccak256(&self.init_code), strategy);
        Ok(Prediction { salt, guarded_salt: guarded, address })
    }
}

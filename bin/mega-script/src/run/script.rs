//! Run scripts: the senders of a run and the steps they take.
//!
//! ```json
//! {
//!   "config": { "namespace": "default" },
//!   "senders": [
//!     { "name": "deployer", "kind": "private_key", "key": "0x…" },
//!     { "name": "treasury", "kind": "safe", "account": "0x…", "proposer": "deployer" }
//!   ],
//!   "steps": [
//!     { "deploy": { "sender": "deployer", "identifier": "Token", "initCode": "0x…" } },
//!     { "call": { "sender": "treasury", "contract": "Token", "data": "0x…" } }
//!   ]
//! }
//! ```

use std::path::Path;

use alloy_primitives::{Address, Bytes, U256};
use mega_sender::{
    Coordinator, CoordinatorConfig, DeployRequest, ExecutionContext, Operation, Registry,
    SenderInitConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{Result, ScriptError};

/// A run script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    /// Run-wide settings.
    #[serde(default)]
    pub config: CoordinatorConfig,
    /// Senders, registered in order. Proposers must come before their multisigs.
    pub senders: Vec<SenderInitConfig>,
    /// Steps, issued in order.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One step of a script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Step {
    /// Call a contract.
    Call(CallStep),
    /// Deploy a contract through the factory.
    Deploy(DeployStep),
}

/// A contract call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStep {
    /// Issuing sender.
    pub sender: String,
    /// Called contract.
    #[serde(flatten)]
    pub target: TargetRef,
    /// Calldata.
    #[serde(default)]
    pub data: Bytes,
    /// Attached value.
    #[serde(default)]
    pub value: U256,
    /// Operation label. Defaults to the called contract.
    pub label: Option<String>,
}

/// How a call names its target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TargetRef {
    /// A literal address.
    Address {
        /// The address.
        target: Address,
    },
    /// A registry identifier, resolved on the run's chain.
    Registry {
        /// The identifier.
        contract: String,
        /// Namespace to resolve in. Defaults to the run's namespace.
        namespace: Option<String>,
    },
}

/// A deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployStep {
    /// Issuing sender.
    pub sender: String,
    /// What to deploy.
    #[serde(flatten)]
    pub request: DeployRequest,
}

/// A contract placed by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedContract {
    /// Registry identifier.
    pub identifier: String,
    /// Instance label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Deploying sender.
    pub sender: String,
    /// Deterministic address.
    pub address: Address,
}

impl Script {
    /// Loads a script file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Registers the senders and issues every step against `coordinator`.
    ///
    /// Deployments are recorded in `registry` under the run's namespace so that later steps can
    /// call them by identifier.
    pub fn simulate<C: ExecutionContext>(
        &self,
        coordinator: &mut Coordinator<C>,
        registry: &mut Registry,
    ) -> Result<Vec<DeployedContract>> {
        for sender in &self.senders {
            coordinator.register_sender(sender.clone())?;
        }

        let chain_id = coordinator.chain_id();
        let namespace = coordinator.config().namespace.clone();
        let mut deployed = Vec::new();
        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, ?step, "Issuing step");
            match step {
                Step::Call(call) => {
                    let target = call.target.resolve(registry)?;
                    let label = call.label.clone().unwrap_or_else(|| format!("call {target}"));
                    let op =
                        Operation::new(target, call.data.clone(), label).with_value(call.value);
                    coordinator.execute(&call.sender, op)?;
                }
                Step::Deploy(DeployStep { sender, request }) => {
                    let deployment = coordinator.deploy(sender, request.clone())?;
                    let address = deployment.address();
                    registry.insert(chain_id, namespace.as_str(), &request.identifier, address);
                    info!(identifier = %request.identifier, %address, "Contract deployed");
                    deployed.push(DeployedContract {
                        identifier: request.identifier.clone(),
                        label: request.label.clone(),
                        sender: sender.clone(),
                        address,
                    });
                }
            }
        }
        Ok(deployed)
    }
}

impl TargetRef {
    fn resolve(&self, registry: &Registry) -> Result<Address> {
        match self {
            Self::Address { target } => Ok(*target),
            Self::Registry { contract, namespace } => {
                registry.lookup(contract, namespace.as_deref(), None).ok_or_else(|| {
                    ScriptError::InvalidInput(format!("contract `{contract}` is not registered"))
                })
            }
        }
    }
}

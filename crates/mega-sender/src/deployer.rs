//! Deterministic deployments through the factory.

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolValue};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    base_salt_with_flag, build_entropy,
    constants::salt_flag,
    guarded_salt,
    interfaces::ICreateX,
    predict_address, Coordinator, DeployStrategy, ExecutionContext, Operation, RichOperation,
    SenderError,
};

/// A contract to place at a deterministic address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    /// Registry identifier of the contract. Part of the salt.
    pub identifier: String,
    /// Optional discriminator for several instances of the same contract. Part of the salt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Creation code including constructor arguments.
    pub init_code: Bytes,
    /// Placement strategy.
    #[serde(default)]
    pub strategy: DeployStrategy,
    /// Value forwarded to the constructor.
    #[serde(default)]
    pub value: U256,
    /// Bind the salt to the chain id as well as to the sender.
    #[serde(default)]
    pub cross_chain_protected: bool,
}

impl DeployRequest {
    /// A CREATE3 deployment of `init_code` under `identifier`.
    pub fn new(identifier: impl Into<String>, init_code: impl Into<Bytes>) -> Self {
        Self {
            identifier: identifier.into(),
            label: None,
            init_code: init_code.into(),
            strategy: DeployStrategy::default(),
            value: U256::ZERO,
            cross_chain_protected: false,
        }
    }

    /// Sets the instance label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Sets the placement strategy.
    pub const fn with_strategy(mut self, strategy: DeployStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the value forwarded to the constructor.
    pub const fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Binds the salt to the chain id.
    pub const fn cross_chain_protected(mut self) -> Self {
        self.cross_chain_protected = true;
        self
    }

    /// Salt entropy of the request within `namespace`.
    pub fn entropy(&self, namespace: &str) -> B256 {
        let label = self.label.as_deref().unwrap_or_default();
        build_entropy([namespace, self.identifier.as_str(), label])
    }

    fn salt_flag(&self) -> u8 {
        if self.cross_chain_protected {
            salt_flag::CROSS_CHAIN_PROTECTED
        } else {
            salt_flag::SENDER_ONLY
        }
    }

    fn operation_label(&self) -> String {
        match &self.label {
            Some(label) => format!("deploy {} ({label})", self.identifier),
            None => format!("deploy {}", self.identifier),
        }
    }
}

/// Where a deployment will land and how that was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPrediction {
    /// Salt passed to the factory.
    pub salt: B256,
    /// Salt after the factory's guard.
    pub guarded_salt: B256,
    /// `keccak256(init_code)`.
    pub init_code_hash: B256,
    /// Predicted contract address.
    pub address: Address,
}

/// A simulated deployment whose placement matched the prediction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// The verified prediction.
    pub prediction: DeploymentPrediction,
    /// The queued factory call.
    pub operation: RichOperation,
}

impl Deployment {
    /// The deployed contract address.
    pub const fn address(&self) -> Address {
        self.prediction.address
    }
}

impl<C: ExecutionContext> Coordinator<C> {
    /// Predicts where `request` lands when deployed by `sender`.
    ///
    /// The salt is built from `[namespace, identifier, label]` and bound to the sender's
    /// account. The simulation context is used to reach the factory's pure endpoints.
    pub fn predict_deployment(
        &mut self,
        sender: &str,
        request: &DeployRequest,
    ) -> Result<DeploymentPrediction, SenderError> {
        let account = self
            .sender(sender)
            .ok_or_else(|| SenderError::UnknownSender(sender.to_string()))?
            .account();
        let factory = self.config().factory;
        let entropy = request.entropy(&self.config().namespace);

        let salt = base_salt_with_flag(account, request.salt_flag(), entropy);
        let guarded = guarded_salt(salt, account, self.chain_id());
        let init_code_hash = keccak256(&request.init_code);
        let address = predict_address(
            &mut self.contexts_mut().simulation,
            factory,
            guarded,
            init_code_hash,
            request.strategy,
        )?;
        Ok(DeploymentPrediction { salt, guarded_salt: guarded, init_code_hash, address })
    }

    /// Deploys `request` through the factory as `sender`.
    ///
    /// The factory call is simulated and queued like any other operation. The address the
    /// factory reports must equal the prediction, otherwise a `Failed` event is emitted for the
    /// factory call and the run is aborted with [`SenderError::AddressPredictionFailure`]. The
    /// rejected call remains in the queue but can no longer be broadcast.
    pub fn deploy(
        &mut self,
        sender: &str,
        request: DeployRequest,
    ) -> Result<Deployment, SenderError> {
        let prediction = self.predict_deployment(sender, &request)?;
        let label = request.operation_label();
        let payload = match request.strategy {
            DeployStrategy::Create3 => {
                ICreateX::deployCreate3Call { salt: prediction.salt, initCode: request.init_code }
                    .abi_encode()
            }
            DeployStrategy::Create2 => {
                ICreateX::deployCreate2Call { salt: prediction.salt, initCode: request.init_code }
                    .abi_encode()
            }
        };
        let op = Operation::new(self.config().factory, payload, label).with_value(request.value);
        let operation = self.execute(sender, op)?;

        let placed = Address::abi_decode(&operation.simulated_return_data)
            .map_err(|err| format!("cannot decode factory result: {err}"))
            .and_then(|actual| {
                if actual == prediction.address {
                    Ok(actual)
                } else {
                    Err(format!(
                        "expected {}, factory placed the contract at {actual}",
                        prediction.address
                    ))
                }
            });
        if let Err(reason) = placed {
            let err = SenderError::AddressPredictionFailure(reason);
            self.reject(&operation, &err);
            return Err(err);
        }

        info!(
            target: "mega_sender::deployer",
            identifier = %request.identifier, address = %prediction.address,
            strategy = %request.strategy, "Deployment simulated"
        );
        Ok(Deployment { prediction, operation })
    }
}

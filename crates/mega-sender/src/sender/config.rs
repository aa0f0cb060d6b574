//! Sender configuration.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// Name of the sender kind backed by an in-memory private key.
pub const PRIVATE_KEY_KIND: &str = "private_key";
/// Name of the sender kind backed by a hardware wallet.
pub const LEDGER_KIND: &str = "ledger";
/// Name of the sender kind backed by a Safe multisig.
pub const SAFE_KIND: &str = "safe";

/// Everything needed to construct a [`Sender`](super::Sender).
///
/// ```json
/// { "name": "deployer", "kind": "private_key", "key": "0x…" }
/// { "name": "treasury", "kind": "safe", "account": "0x…", "proposer": "deployer" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderInitConfig {
    /// Unique sender name.
    pub name: String,
    /// Account the sender acts as. Optional for private keys, where it is derived.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Address>,
    /// The signing backend.
    #[serde(flatten)]
    pub backend: BackendConfig,
}

/// Signing backend of a sender, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// A private key held in memory.
    PrivateKey {
        /// The secret key.
        key: B256,
    },
    /// A hardware wallet. Its account must be configured explicitly.
    Ledger {
        /// HD derivation path of the account.
        derivation_path: String,
    },
    /// A Safe multisig. Its account is the Safe address.
    Safe {
        /// Name of the sender that signs proposals for this Safe.
        proposer: String,
    },
}

impl BackendConfig {
    /// The `kind` tag of the backend.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PrivateKey { .. } => PRIVATE_KEY_KIND,
            Self::Ledger { .. } => LEDGER_KIND,
            Self::Safe { .. } => SAFE_KIND,
        }
    }
}

impl SenderInitConfig {
    /// A sender backed by an in-memory private key, acting as the key's address.
    pub fn private_key(name: impl Into<String>, key: B256) -> Self {
        Self { name: name.into(), account: None, backend: BackendConfig::PrivateKey { key } }
    }

    /// A sender backed by a hardware wallet.
    pub fn ledger(
        name: impl Into<String>,
        account: Address,
        derivation_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            account: Some(account),
            backend: BackendConfig::Ledger { derivation_path: derivation_path.into() },
        }
    }

    /// A sender backed by the Safe at `safe`, proposing through the sender named `proposer`.
    pub fn safe(name: impl Into<String>, safe: Address, proposer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account: Some(safe),
            backend: BackendConfig::Safe { proposer: proposer.into() },
        }
    }

    /// Pins the account the sender acts as.
    pub const fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::{address, b256};

    use super::*;

    #[test]
    fn test_deserialize_tagged_backends() {
        let configs: Vec<SenderInitConfig> = serde_json::from_str(
            r#"[
                { "name": "deployer", "kind": "private_key",
                  "key": "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80" },
                { "name": "cold", "kind": "ledger",
                  "account": "0x0000000000000000000000000000000000000c01",
                  "derivation_path": "m/44'/60'/0'/0/0" },
                { "name": "treasury", "kind": "safe",
                  "account": "0x0000000000000000000000000000000000005afe",
                  "proposer": "deployer" }
            ]"#,
        )
        .unwrap();

        assert_eq!(
            configs[0],
            SenderInitConfig::private_key(
                "deployer",
                b256!("ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
            )
        );
        assert_eq!(
            configs[1],
            SenderInitConfig::ledger(
                "cold",
                address!("0000000000000000000000000000000000000c01"),
                "m/44'/60'/0'/0/0"
            )
        );
        assert_eq!(
            configs[2],
            SenderInitConfig::safe(
                "treasury",
                address!("0000000000000000000000000000000000005afe"),
                "deployer"
            )
        );
        assert_eq!(
            configs.iter().map(|config| config.backend.kind()).collect::<Vec<_>>(),
            [PRIVATE_KEY_KIND, LEDGER_KIND, SAFE_KIND]
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let json = r#"{ "name": "x", "kind": "trezor" }"#;
        assert!(serde_json::from_str::<SenderInitConfig>(json).is_err());
    }
}

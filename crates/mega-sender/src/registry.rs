//! Read-only address registry.
//!
//! The registry file maps chain id, then namespace, then identifier to an address:
//!
//! ```json
//! { "1": { "default": { "Token": "0x…" } } }
//! ```

use std::{collections::BTreeMap, path::Path};

use alloy_primitives::Address;
use tracing::debug;

use crate::constants::DEFAULT_NAMESPACE;

type Namespaces = BTreeMap<String, BTreeMap<String, Address>>;

/// Errors loading a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry file could not be read.
    #[error("failed to read registry: {0}")]
    Io(#[from] std::io::Error),
    /// The registry is not valid JSON of the expected shape.
    #[error("failed to parse registry: {0}")]
    Json(#[from] serde_json::Error),
    /// A top-level key is not a chain id.
    #[error("invalid chain id `{0}` in registry")]
    InvalidChain(String),
}

/// Addresses of previously deployed contracts, keyed by chain, namespace and identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    entries: BTreeMap<u64, Namespaces>,
    default_chain: u64,
    default_namespace: String,
}

impl Registry {
    /// An empty registry defaulting to `default_chain` and the default namespace.
    pub fn new(default_chain: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            default_chain,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }

    /// Parses a registry from its JSON representation.
    pub fn from_json(json: &str, default_chain: u64) -> Result<Self, RegistryError> {
        let raw: BTreeMap<String, Namespaces> = serde_json::from_str(json)?;
        let mut registry = Self::new(default_chain);
        for (chain, namespaces) in raw {
            let chain_id =
                chain.trim().parse::<u64>().map_err(|_| RegistryError::InvalidChain(chain))?;
            registry.entries.insert(chain_id, namespaces);
        }
        Ok(registry)
    }

    /// Loads a registry file.
    pub fn load(path: impl AsRef<Path>, default_chain: u64) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let registry = Self::from_json(&json, default_chain)?;
        debug!(
            target: "mega_sender::registry",
            path = %path.display(),
            chains = registry.entries.len(),
            "Loaded registry"
        );
        Ok(registry)
    }

    /// Overrides the namespace used when a lookup names none.
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    /// The chain used when a lookup names none.
    pub const fn default_chain(&self) -> u64 {
        self.default_chain
    }

    /// The namespace used when a lookup names none.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Records an address, replacing any previous entry.
    pub fn insert(
        &mut self,
        chain_id: u64,
        namespace: impl Into<String>,
        identifier: impl Into<String>,
        address: Address,
    ) -> Option<Address> {
        self.entries
            .entry(chain_id)
            .or_default()
            .entry(namespace.into())
            .or_default()
            .insert(identifier.into(), address)
    }

    /// Looks up `identifier`, falling back to the default namespace and chain.
    pub fn lookup(
        &self,
        identifier: &str,
        namespace: Option<&str>,
        chain_id: Option<u64>,
    ) -> Option<Address> {
        let namespace = namespace.unwrap_or(&self.default_namespace);
        let chain_id = chain_id.unwrap_or(self.default_chain);
        self.entries.get(&chain_id)?.get(namespace)?.get(identifier).copied()
    }

    /// Number of recorded addresses across all chains and namespaces.
    pub fn len(&self) -> usize {
        self.entries.values().flat_map(BTreeMap::values).map(BTreeMap::len).sum()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

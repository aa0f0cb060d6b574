//! Initial chain state for a script run.

use std::{collections::BTreeMap, path::PathBuf, str::FromStr};

use alloy_primitives::{Address, Bytes, U256};
use clap::Parser;
use mega_sender::EvmContext;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{Result, ScriptError};

/// Pre-execution state configuration arguments
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "State Options")]
pub struct PreStateArgs {
    /// Chain id of the in-memory chain.
    #[arg(long = "chain-id", visible_aliases = ["chainid"], default_value = "1", env = "CHAIN_ID")]
    pub chain_id: u64,

    /// JSON file with prestate (genesis) config: a map from address to account state.
    #[arg(long = "prestate", visible_aliases = ["pre-state"])]
    pub prestate: Option<PathBuf>,

    /// Override balance for specified addresses. Each entry format: `ADDRESS=VALUE`
    /// VALUE can be: plain number (wei), or number with suffix (ether, gwei, wei).
    /// Examples: `--balance 0x1234=100ether`
    #[arg(long = "balance")]
    pub balance: Vec<String>,
}

/// Account state as found in a prestate file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    /// Account balance
    pub balance: Option<U256>,
    /// Account nonce
    pub nonce: Option<u64>,
    /// Account code (hex string with 0x prefix)
    pub code: Option<Bytes>,
    /// Storage slots
    pub storage: Option<BTreeMap<U256, U256>>,
}

/// Parse ether value string into wei (U256).
/// Supports: plain number (wei), or number with suffix (ether, gwei, wei, etc).
fn parse_ether_value(s: &str) -> Result<U256> {
    use alloy_primitives::utils::parse_units;

    let s = s.trim();
    let split_pos = s.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(s.len());
    let (num_str, unit) = s.split_at(split_pos);
    let unit = if unit.is_empty() { "wei" } else { unit };

    let parsed = parse_units(num_str, unit)
        .map_err(|e| ScriptError::InvalidInput(format!("Invalid ether value '{s}': {e}")))?;
    Ok(parsed.into())
}

impl PreStateArgs {
    /// Parse balance override entries from CLI arguments.
    ///
    /// Each entry should be in the format `ADDRESS=VALUE`.
    pub fn parse_balance(&self) -> Result<Vec<(Address, U256)>> {
        let mut entries = Vec::with_capacity(self.balance.len());
        for entry in &self.balance {
            let (addr_str, value_str) = entry.split_once('=').ok_or_else(|| {
                ScriptError::InvalidInput(format!(
                    "Invalid balance entry '{entry}': expected format 'ADDRESS=VALUE'"
                ))
            })?;
            let address = Address::from_str(addr_str.trim()).map_err(|e| {
                ScriptError::InvalidInput(format!(
                    "Invalid address '{addr_str}' in balance entry '{entry}': {e}"
                ))
            })?;
            entries.push((address, parse_ether_value(value_str)?));
        }
        Ok(entries)
    }

    /// Load the prestate file, if any.
    pub fn load_prestate(&self) -> Result<BTreeMap<Address, AccountState>> {
        let Some(path) = &self.prestate else {
            debug!("No prestate file provided");
            return Ok(BTreeMap::new());
        };
        info!(prestate_path = ?path, "Loading prestate from file");
        let content = std::fs::read_to_string(path)?;
        let prestate: BTreeMap<Address, AccountState> = serde_json::from_str(&content)
            .map_err(|e| ScriptError::InvalidInput(format!("Failed to parse prestate JSON: {e}")))?;
        trace!(accounts = prestate.len(), "Prestate loaded from file");
        Ok(prestate)
    }

    /// Creates the context the run is executed against. Balance overrides win over the prestate.
    pub fn create_context(&self) -> Result<EvmContext> {
        let mut ctx = EvmContext::new(self.chain_id);
        for (address, account) in self.load_prestate()? {
            apply_account(&mut ctx, address, account);
        }
        for (address, balance) in self.parse_balance()? {
            ctx.set_account_balance(address, balance);
        }
        Ok(ctx)
    }
}

fn apply_account(ctx: &mut EvmContext, address: Address, account: AccountState) {
    let AccountState { balance, nonce, code, storage } = account;
    if let Some(balance) = balance {
        ctx.set_account_balance(address, balance);
    }
    if let Some(nonce) = nonce {
        ctx.set_account_nonce(address, nonce);
    }
    if let Some(code) = code {
        ctx.set_account_code(address, code);
    }
    for (slot, value) in storage.unwrap_or_default() {
        ctx.set_storage(address, slot, value);
    }
}

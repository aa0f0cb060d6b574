use std::path::PathBuf;

use alloy_primitives::Address;
use clap::Parser;
use mega_sender::{
    BroadcastReport, Coordinator, ExecutionContexts, InMemoryProposalService, LifecycleEvent,
    Registry,
};
use serde::Serialize;
use tracing::{info, warn};

use super::{DeployedContract, PreStateArgs, Result, Script, ScriptError};

/// Simulate a script, then broadcast it
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Run script (JSON)
    #[arg(value_name = "SCRIPT")]
    pub script: PathBuf,

    /// Address registry (JSON) used to resolve contracts by identifier
    #[arg(long = "registry")]
    pub registry: Option<PathBuf>,

    /// Namespace of the run. Overrides the script.
    #[arg(long = "namespace", env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Run marker mixed into operation ids. Overrides the script.
    #[arg(long = "run-marker")]
    pub run_marker: Option<u64>,

    /// Current nonce of a Safe. Each entry format: `ADDRESS=NONCE` (can be repeated).
    #[arg(long = "safe.nonce", visible_aliases = ["safe-nonce"])]
    pub safe_nonces: Vec<String>,

    /// Write the report to this file instead of stdout
    #[arg(long = "output", short = 'o')]
    pub output: Option<PathBuf>,

    /// Print lifecycle events alongside the report
    #[arg(long = "events")]
    pub events: bool,

    /// Pre-execution state configuration
    #[command(flatten)]
    pub prestate_args: PreStateArgs,
}

/// Output of a run.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    /// Chain the run executed on.
    pub chain_id: u64,
    /// Contracts placed by the run.
    pub deployments: Vec<DeployedContract>,
    /// Broadcast outcome.
    pub report: BroadcastReport,
    /// Lifecycle events, if requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<LifecycleEvent>>,
}

impl Cmd {
    /// Execute the run command
    pub fn run(&self) -> Result<()> {
        let mut script = Script::load(&self.script)?;
        if let Some(namespace) = &self.namespace {
            script.config.namespace = namespace.clone();
        }
        if self.run_marker.is_some() {
            script.config.run_marker = self.run_marker;
        }

        let chain_id = self.prestate_args.chain_id;
        let mut registry = match &self.registry {
            Some(path) => Registry::load(path, chain_id)?,
            None => Registry::new(chain_id),
        }
        .with_default_namespace(script.config.namespace.clone());

        let real = self.prestate_args.create_context()?;
        let contexts = ExecutionContexts::fork(real);
        let mut coordinator = Coordinator::new(script.config.clone(), contexts);

        let deployments = script.simulate(&mut coordinator, &mut registry)?;
        info!(operations = coordinator.queue().len(), "Simulation finished");

        let mut service = self.proposal_service()?;
        let report = coordinator.broadcast(&mut service).inspect_err(|err| {
            warn!(%err, "Broadcast aborted");
        })?;

        let output = RunOutput {
            chain_id,
            deployments,
            report,
            events: self.events.then(|| coordinator.events().to_vec()),
        };
        let json = serde_json::to_string_pretty(&output)?;
        match &self.output {
            Some(path) => std::fs::write(path, json)?,
            None => println!("{json}"),
        }
        Ok(())
    }

    /// Builds the dry-run proposal service with the configured Safe nonces.
    fn proposal_service(&self) -> Result<InMemoryProposalService> {
        let mut service = InMemoryProposalService::default();
        for entry in &self.safe_nonces {
            let (safe, nonce) = parse_safe_nonce(entry)?;
            service = service.with_nonce(safe, nonce);
        }
        Ok(service)
    }
}

fn parse_safe_nonce(entry: &str) -> Result<(Address, u64)> {
    let invalid = || {
        ScriptError::InvalidInput(format!(
            "Invalid safe nonce entry '{entry}': expected format 'ADDRESS=NONCE'"
        ))
    };
    let (safe, nonce) = entry.split_once('=').ok_or_else(invalid)?;
    let safe = safe.trim().parse::<Address>().map_err(|_| invalid())?;
    let nonce = nonce.trim().parse::<u64>().map_err(|_| invalid())?;
    Ok((safe, nonce))
}

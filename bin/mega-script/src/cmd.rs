use clap::Parser;

use crate::common::LogArgs;

/// Main command line of the mega-script CLI tool
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct MainCmd {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,

    /// Logging configuration
    #[command(flatten)]
    pub log_args: LogArgs,
}

/// Subcommands of the mega-script CLI tool
#[derive(clap::Subcommand, Debug)]
#[command(infer_subcommands = true)]
pub enum Command {
    /// Simulate a script, then broadcast it
    Run(crate::run::Cmd),
    /// Predict the address of a deterministic deployment
    Predict(crate::predict::Cmd),
}

/// Error types for the main command system
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Script error (used by all commands)
    #[error("{0}")]
    Script(#[from] crate::common::ScriptError),
}

impl MainCmd {
    /// Execute the main command
    pub fn run(&self) -> Result<(), Error> {
        self.log_args.init()?;
        match &self.command {
            Command::Run(cmd) => cmd.run()?,
            Command::Predict(cmd) => cmd.run()?,
        }
        Ok(())
    }
}

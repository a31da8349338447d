//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deploy;
mod version;

pub use version::VersionCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the server version
    Version,
    /// Inspect deployed versions
    Versions {
        #[command(subcommand)]
        command: VersionCommands,
    },
    /// Deploy the current head again
    Deploy,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        Commands::Version => version::server_version(&client).await,
        Commands::Versions { command } => version::handle_version_command(command, &client).await,
        Commands::Deploy => deploy::start_deployment(&client).await,
    }
}

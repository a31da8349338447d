//! Shipyard CLI
//!
//! Command-line interface for the status API of a Shipyard server.

mod commands;
mod config;
mod id_resolver;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "shipyard")]
#[command(about = "Shipyard continuous deployment CLI", long_about = None)]
struct Cli {
    /// Admin listener URL
    #[arg(long, env = "SHIPYARD_ADMIN_URL", default_value = "http://localhost:8080")]
    admin_url: String,

    /// API username
    #[arg(long, env = "SHIPYARD_API_USERNAME")]
    username: Option<String>,

    /// API password
    #[arg(long, env = "SHIPYARD_API_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        admin_url: cli.admin_url,
        username: cli.username,
        password: cli.password,
    };

    handle_command(cli.command, &config).await
}

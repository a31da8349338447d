//! Deploy command handler

use anyhow::{Context, Result};
use colored::*;
use shipyard_client::ShipyardClient;

/// Ask the server to run the pipeline for the current head
pub async fn start_deployment(client: &ShipyardClient) -> Result<()> {
    let reply = client
        .start_deployment()
        .await
        .context("Failed to request a deployment")?;

    println!("{} Deployment {}", "✓".green(), reply.message);
    Ok(())
}

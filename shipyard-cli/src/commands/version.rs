//! Version command handlers
//!
//! Lists versions, shows the trigger, deploy and release history of one
//! version, and prints the captured output of its release.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use shipyard_client::{LogKind, ShipyardClient, VersionDetails};
use shipyard_core::domain::state::{Runner, RunnerStatus, Step};

use crate::id_resolver::resolve_version;

/// Version subcommands
#[derive(Subcommand)]
pub enum VersionCommands {
    /// List all versions
    List,
    /// Get version details
    Get {
        /// Version or unambiguous prefix
        id: String,
    },
    /// Print the output of a released version
    Logs {
        /// Version or unambiguous prefix
        id: String,

        /// Print standard error instead of standard output
        #[arg(long)]
        err: bool,
    },
}

/// Handle version commands
pub async fn handle_version_command(command: VersionCommands, client: &ShipyardClient) -> Result<()> {
    match command {
        VersionCommands::List => list_versions(client).await,
        VersionCommands::Get { id } => get_version(client, &id).await,
        VersionCommands::Logs { id, err } => {
            let kind = if err { LogKind::Err } else { LogKind::Log };
            get_version_log(client, &id, kind).await
        }
    }
}

/// Print the version of the server
pub async fn server_version(client: &ShipyardClient) -> Result<()> {
    let version = client.server_version().await?;
    println!("{}", version.trim());
    Ok(())
}

/// List all versions
async fn list_versions(client: &ShipyardClient) -> Result<()> {
    let list = client.list_versions().await?;

    if list.versions.is_empty() {
        println!("{}", "No versions found.".yellow());
    } else {
        println!("{}", format!("Found {} version(s):", list.versions.len()).bold());
        println!();
        for version in list.versions {
            println!("  {} {}", "▸".cyan(), version);
        }
    }

    Ok(())
}

/// Get and display a single version
async fn get_version(client: &ShipyardClient, id: &str) -> Result<()> {
    let version = resolve_version(client, id).await?;

    let details = client.get_version(&version).await?;

    print_version_details(&details);

    Ok(())
}

/// Print the captured release output
async fn get_version_log(client: &ShipyardClient, id: &str, kind: LogKind) -> Result<()> {
    let version = resolve_version(client, id).await?;

    let output = client.version_log(&version, kind).await?;

    if output.is_empty() {
        println!("{}", format!("No {} output for version {}.", kind, version).yellow());
    } else {
        print!("{}", output);
    }

    Ok(())
}

/// Print detailed version information
fn print_version_details(details: &VersionDetails) {
    println!("{}", "Version Details:".bold());
    println!("  Version: {}", details.version.cyan());

    for runner in &details.workflows {
        print_runner(runner);
    }
}

fn print_runner(runner: &Runner) {
    println!();
    println!(
        "{} {}",
        format!("{}:", runner.name).bold(),
        colorize_status(&runner.status)
    );

    for step in &runner.steps {
        print_step(step);
    }
}

fn print_step(step: &Step) {
    let mut line = format!("  {} {}", "▸".cyan(), step.name);
    if let Some(duration) = &step.duration {
        line.push_str(&format!(" {}", duration.dimmed()));
    }
    println!("{}", line);

    let mut command = vec![step.spec.command.clone()];
    command.extend(step.spec.args.iter().cloned());
    println!("    Command: {}", command.join(" ").dimmed());

    if let Some(started) = step.start_time {
        println!(
            "    Started: {}",
            started.format("%Y-%m-%d %H:%M:%S").to_string().dimmed()
        );
    }

    for var in step.variables.iter() {
        println!("    {} = {}", var.name.cyan(), var.value);
    }
}

/// Colorize runner status for display
fn colorize_status(status: &RunnerStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunnerStatus::Started => status_str.cyan(),
        RunnerStatus::Success => status_str.green(),
        RunnerStatus::Failure => status_str.red(),
    }
}

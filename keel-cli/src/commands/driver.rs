//! Driver command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use keel_client::OrchestratorClient;
use keel_core::domain::engine::Capability;

use crate::config::Config;

/// Driver subcommands
#[derive(Subcommand)]
pub enum DriverCommands {
    /// Show which capabilities each engine supports
    Capabilities,
}

pub async fn handle_driver_command(command: DriverCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        DriverCommands::Capabilities => list_capabilities(&client).await,
    }
}

async fn list_capabilities(client: &OrchestratorClient) -> Result<()> {
    let matrix = client.driver_capabilities().await?;

    if matrix.is_empty() {
        println!("{}", "No drivers registered.".yellow());
        return Ok(());
    }

    for engine in matrix {
        println!("  {} {}", "▸".cyan(), engine.engine.display_name().bold());
        for capability in Capability::ALL {
            let mark = if engine.capabilities.contains(capability) {
                "✓".green()
            } else {
                "✗".red()
            };
            println!("    {} {}", mark, capability.describe());
        }
        println!();
    }

    Ok(())
}

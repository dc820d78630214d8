//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod bookmark;
mod driver;
mod pipeline;

pub use bookmark::BookmarkCommands;
pub use driver::DriverCommands;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline management
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Database drivers
    Driver {
        #[command(subcommand)]
        command: DriverCommands,
    },
    /// User bookmarks
    Bookmark {
        #[command(subcommand)]
        command: BookmarkCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Driver { command } => driver::handle_driver_command(command, config).await,
        Commands::Bookmark { command } => bookmark::handle_bookmark_command(command, config).await,
    }
}

//! Bookmark command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use keel_client::OrchestratorClient;
use keel_core::dto::bookmark::ListBookmarks;

use crate::config::Config;

/// Bookmark subcommands
#[derive(Subcommand)]
pub enum BookmarkCommands {
    /// Bookmark a resource link
    Create {
        #[arg(long)]
        user: i64,
        link: String,
    },
    /// List bookmarks of a user
    List {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        page_size: Option<i32>,

        /// Token printed by a previous page
        #[arg(long)]
        page_token: Option<String>,
    },
    /// Delete a bookmark by id
    Delete {
        #[arg(long)]
        user: i64,
        id: String,
    },
}

pub async fn handle_bookmark_command(command: BookmarkCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        BookmarkCommands::Create { user, link } => {
            let bookmark = client.create_bookmark(user, link).await?;
            println!("{}", "✓ Bookmark created".green().bold());
            println!("  Name: {}", bookmark.name.cyan());
            println!("  Link: {}", bookmark.link);
        }
        BookmarkCommands::List {
            user,
            page_size,
            page_token,
        } => {
            let page = client
                .list_bookmarks(
                    user,
                    &ListBookmarks {
                        page_size,
                        page_token,
                    },
                )
                .await?;

            if page.bookmarks.is_empty() {
                println!("{}", "No bookmarks found.".yellow());
            }
            for bookmark in &page.bookmarks {
                println!("  {} {}", "▸".cyan(), bookmark.link.bold());
                println!("    {}", bookmark.name.dimmed());
            }
            if !page.next_page_token.is_empty() {
                println!(
                    "\n{}",
                    format!("More results: --page-token {}", page.next_page_token).dimmed()
                );
            }
        }
        BookmarkCommands::Delete { user, id } => {
            client.delete_bookmark(user, &id).await?;
            println!("{}", format!("✓ Bookmark {} deleted", id).green().bold());
        }
    }

    Ok(())
}

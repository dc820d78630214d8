//! Pipeline command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use keel_client::OrchestratorClient;
use keel_core::domain::pipeline::{Pipeline, PipelineFind, PipelineStatus};
use keel_core::domain::task::{Task, TaskStatus};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::plan::Plan;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a pipeline from a JSON plan file
    Create {
        /// Path to the plan file
        #[arg(short, long)]
        file: PathBuf,

        /// Subject id of the creator
        #[arg(long)]
        creator: i64,
    },
    /// List pipelines
    List {
        /// Only open pipelines
        #[arg(long, conflicts_with = "inactive")]
        active: bool,

        /// Only finished pipelines
        #[arg(long)]
        inactive: bool,

        /// Only the pipeline with this id
        #[arg(long)]
        id: Option<i64>,
    },
    /// Get pipeline details
    Get { id: i64 },
    /// Run the next stage of a pipeline
    Advance { id: i64 },
    /// Cancel a pipeline
    Cancel { id: i64 },
    /// Advance a pipeline until it finishes
    Watch {
        id: i64,

        /// Seconds between advances while a stage is still running elsewhere
        #[arg(long, default_value = "2")]
        interval: u64,
    },
}

pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        PipelineCommands::Create { file, creator } => {
            create_pipeline(&client, &file, creator).await
        }
        PipelineCommands::List {
            active,
            inactive,
            id,
        } => {
            let find = PipelineFind {
                id,
                active: match (active, inactive) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            list_pipelines(&client, &find).await
        }
        PipelineCommands::Get { id } => {
            let pipeline = client.get_pipeline(id).await?;
            print_pipeline_details(&pipeline);
            Ok(())
        }
        PipelineCommands::Advance { id } => {
            let pipeline = client.advance_pipeline(id).await?;
            print_pipeline_details(&pipeline);
            Ok(())
        }
        PipelineCommands::Cancel { id } => cancel_pipeline(&client, id).await,
        PipelineCommands::Watch { id, interval } => {
            watch_pipeline(&client, id, Duration::from_secs(interval)).await
        }
    }
}

async fn create_pipeline(client: &OrchestratorClient, file: &Path, creator: i64) -> Result<()> {
    let req = Plan::load(file)?.into_request(creator);
    let pipeline = client.create_pipeline(&req).await?;

    println!("{}", "✓ Pipeline created successfully!".green().bold());
    println!("  ID:     {}", pipeline.id.to_string().cyan());
    println!("  Name:   {}", pipeline.name.bold());
    println!(
        "  Stages: {}",
        pipeline
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );

    Ok(())
}

async fn list_pipelines(client: &OrchestratorClient, find: &PipelineFind) -> Result<()> {
    let pipelines = client.list_pipelines(find).await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} pipeline(s):", pipelines.len()).bold()
        );
        println!();
        for pipeline in pipelines {
            print_pipeline_summary(&pipeline);
        }
    }

    Ok(())
}

async fn cancel_pipeline(client: &OrchestratorClient, id: i64) -> Result<()> {
    println!("{}", format!("Canceling pipeline {}...", id).dimmed());
    let pipeline = client.cancel_pipeline(id).await?;

    if pipeline.status == PipelineStatus::Canceled {
        println!("{}", format!("✓ Pipeline {} canceled", id).green().bold());
    } else {
        println!(
            "{}",
            format!("Pipeline {} had already finished: {}", id, pipeline.status).yellow()
        );
    }

    Ok(())
}

async fn watch_pipeline(client: &OrchestratorClient, id: i64, interval: Duration) -> Result<()> {
    loop {
        let pipeline = client.advance_pipeline(id).await?;

        if let Some(stage) = pipeline.stages.iter().find(|s| !s.is_terminal()) {
            println!(
                "  {} stage {} is {}",
                "▸".cyan(),
                stage.name.bold(),
                stage.status().to_string().yellow()
            );
        }

        if pipeline.is_terminal() {
            print_pipeline_details(&pipeline);
            return Ok(());
        }

        tokio::time::sleep(interval).await;
    }
}

fn print_pipeline_summary(pipeline: &Pipeline) {
    println!("  {} {}", "▸".cyan(), pipeline.name.bold());
    println!("    ID:      {}", pipeline.id.to_string().dimmed());
    println!("    Status:  {}", colorize_pipeline_status(pipeline.status));
    println!(
        "    Created: {}",
        pipeline
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:       {}", pipeline.id.to_string().cyan());
    println!("  Name:     {}", pipeline.name.bold());
    println!("  Status:   {}", colorize_pipeline_status(pipeline.status));
    println!("  Creator:  {}", pipeline.creator_id);
    if pipeline.cancel_requested {
        println!("  {}", "Cancel requested".yellow());
    }
    println!(
        "  Updated:  {}",
        pipeline.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    for stage in &pipeline.stages {
        println!(
            "\n  {} {} {}",
            format!("[{}]", stage.position).dimmed(),
            stage.name.bold(),
            format!("({})", stage.status()).dimmed()
        );
        for task in &stage.tasks {
            print_task(task);
        }
    }
}

fn print_task(task: &Task) {
    println!(
        "    {:<10} {} {}",
        colorize_task_status(task.status),
        task.name,
        task.target.to_string().dimmed()
    );
    if !task.depends_on.is_empty() {
        println!("               after: {}", task.depends_on.join(", ").dimmed());
    }
    if let Some(failure) = &task.failure {
        println!(
            "               {}: {}",
            failure.reason.to_string().red(),
            failure.message
        );
    }
}

fn colorize_pipeline_status(status: PipelineStatus) -> ColoredString {
    match status {
        PipelineStatus::Open => status.as_str().yellow(),
        PipelineStatus::Done => status.as_str().green(),
        PipelineStatus::Canceled => status.as_str().red(),
    }
}

fn colorize_task_status(status: TaskStatus) -> ColoredString {
    match status {
        TaskStatus::Pending => status.as_str().dimmed(),
        TaskStatus::Running => status.as_str().yellow(),
        TaskStatus::Done => status.as_str().green(),
        TaskStatus::Failed => status.as_str().red(),
        TaskStatus::Canceled => status.as_str().magenta(),
    }
}

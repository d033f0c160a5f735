mod config;
mod di;
mod scheduler;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use media_ingestion_domain::TaskStatus;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "media-sync")]
#[command(about = "Media metadata ingestion and maintenance tasks", long_about = None)]
struct Cli {
    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered tasks
    List,
    /// Run one task and print its report
    Run {
        task: String,

        /// Task input as a JSON object
        #[arg(long)]
        input: Option<String>,

        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Run the periodic maintenance tasks until Ctrl+C
    Schedule,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    let app = di::build_app(&config).await?;

    match cli.command {
        Command::List => {
            for definition in app.runner.registry().definitions() {
                println!(
                    "{:<26} {:<7} {}",
                    definition.name(),
                    definition.visibility().as_str(),
                    definition.description()
                );
            }
            let media_types: Vec<_> = app
                .providers
                .media_types()
                .iter()
                .map(|media_type| media_type.as_str())
                .collect();
            println!("\nmedia types: {}", media_types.join(", "));
            Ok(ExitCode::SUCCESS)
        }
        Command::Run {
            task,
            input,
            timeout_secs,
        } => {
            let input = match input {
                Some(raw) => serde_json::from_str(&raw).context("--input is not valid JSON")?,
                None => Value::Null,
            };
            let report = match timeout_secs {
                Some(secs) => {
                    app.runner
                        .run_with_deadline(&task, input, Duration::from_secs(secs))
                        .await?
                }
                None => app.runner.run(&task, input).await?,
            };

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if report.status == TaskStatus::Failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Schedule => {
            info!("Starting scheduler (Press Ctrl+C to stop)");
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for shutdown signal: {}", e);
                }
            };
            scheduler::run_until(
                Arc::new(app.runner),
                scheduler::default_schedule(),
                shutdown,
            )
            .await;
            info!("Shutdown complete");
            Ok(ExitCode::SUCCESS)
        }
    }
}

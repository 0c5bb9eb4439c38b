// ABOUTME: Entry point for the parcel binary.
// ABOUTME: Parses CLI arguments, initializes tracing, loads configuration, and dispatches subcommands.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use parcel_core::{ArtifactType, NewArtifact};

use crate::config::ParcelConfig;

/// Reliable delivery queue for captured artifacts.
#[derive(Parser)]
#[command(name = "parcel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the delivery daemon until Ctrl-C
    Run,
    /// Queue a captured file and run one drain pass
    Enqueue {
        path: PathBuf,
        /// Destination chat id
        #[arg(long)]
        chat: String,
        /// photo, video, audio, location, text, or other
        #[arg(long = "type", value_name = "TYPE")]
        artifact_type: ArtifactType,
        /// Capture time in milliseconds since the Unix epoch (default: now)
        #[arg(long)]
        captured_at: Option<i64>,
    },
    /// Queue a text message and run one drain pass
    Text {
        message: String,
        #[arg(long)]
        chat: String,
    },
    /// Run one drain pass now
    Drain,
    /// Show pending records
    List {
        #[arg(long)]
        json: bool,
    },
    /// Delete artifact files older than the retention period
    Sweep,
    /// Persist the bot token and device label
    Configure {
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        label: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "parcel=info,parcel_engine=info,parcel_store=info,parcel_delivery=info",
                )
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = ParcelConfig::from_env()?;
    let store = app::open_store(&config)?;

    match cli.command {
        Commands::Run => {
            let service = app::build_service(&config, store)?;
            app::run(&config, service).await?;
        }
        Commands::Enqueue {
            path,
            chat,
            artifact_type,
            captured_at,
        } => {
            let artifact = app::file_artifact(path, chat, artifact_type, captured_at)?;
            let service = app::build_service(&config, store)?;
            let result = app::enqueue(&service, artifact).await;
            service.shutdown().await;
            result?;
        }
        Commands::Text { message, chat } => {
            let artifact = NewArtifact::text(message, chat, app::captured_at(None)?);
            let service = app::build_service(&config, store)?;
            let result = app::enqueue(&service, artifact).await;
            service.shutdown().await;
            result?;
        }
        Commands::Drain => {
            let service = app::build_service(&config, store)?;
            let result = app::drain(&service).await;
            service.shutdown().await;
            result?;
        }
        Commands::List { json } => app::list(&store, json)?,
        Commands::Sweep => app::sweep(&config)?,
        Commands::Configure { token, label } => app::configure(&store, token, label)?,
    }

    Ok(())
}

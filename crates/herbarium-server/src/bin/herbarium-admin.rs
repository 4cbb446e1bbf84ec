//! Maintenance commands run against the same database and asset directory
//! as the server.
//!
//! ```text
//! herbarium-admin regenerate-qr
//! herbarium-admin import records.json
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use herbarium_server::{AppState, ServerConfig};

#[derive(Parser)]
#[command(name = "herbarium-admin", version, about = "Herbarium catalogue maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Regenerate the QR artifact of every active record
    RegenerateQr,
    /// Import a JSON array of flat records
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,herbarium_server=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env();
    let state = AppState::new(config).await?;

    match cli.command {
        Command::RegenerateQr => {
            let report = state.catalog.regenerate_all_qr().await?;
            println!("QR codes regenerated: {}", report.updated);
            println!("Failures: {}", report.failed);
        }
        Command::Import { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let parsed: Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", file.display()))?;
            let Value::Array(entries) = parsed else {
                bail!("{} must contain a JSON array of records", file.display());
            };

            info!(file = %file.display(), entries = entries.len(), "Importing records");
            let report = state.catalog.import_records(entries, None).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

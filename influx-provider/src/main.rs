//! influx-provider: reconciles one declared InfluxDB bucket per invocation.
//!
//! Reads the tracked state file, runs a single lifecycle operation against
//! the InfluxDB server, writes the resulting state back and prints it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use influx_provider::{
    bucket_schema, decode_descriptor, run_lifecycle, BucketDescriptor, Lifecycle,
    ProviderConfig, StateFile,
};

/// InfluxDB bucket provider
#[derive(Parser, Debug)]
#[command(name = "influx-provider", version, about)]
struct Args {
    #[command(flatten)]
    provider: ProviderConfig,

    /// Tracked state file
    #[arg(long, default_value = "influxdb_bucket.state.json")]
    state: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the bucket described by a config file
    Create {
        /// Desired bucket attributes (JSON object)
        #[arg(long)]
        config: PathBuf,
    },

    /// Refresh the tracked bucket from the server
    Read,

    /// Push changed attributes to the tracked bucket
    Update {
        /// Desired bucket attributes (JSON object)
        #[arg(long)]
        config: PathBuf,
    },

    /// Delete the tracked bucket
    Delete,

    /// Print the resource schema
    Schema,
}

async fn load_descriptor(path: &Path) -> Result<BucketDescriptor> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("Config {} is not valid JSON", path.display()))?;
    let descriptor = decode_descriptor(&value)
        .with_context(|| format!("Invalid bucket config {}", path.display()))?;
    Ok(descriptor)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr, stdout carries the resulting state.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "influx_provider=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let op = match &args.command {
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&bucket_schema())?);
            return Ok(());
        }
        Command::Create { .. } => Lifecycle::Create,
        Command::Read => Lifecycle::Read,
        Command::Update { .. } => Lifecycle::Update,
        Command::Delete => Lifecycle::Delete,
    };

    let desired = match &args.command {
        Command::Create { config } | Command::Update { config } => {
            Some(load_descriptor(config).await?)
        }
        _ => None,
    };

    let client = args
        .provider
        .connect()
        .context("Failed to build InfluxDB client")?;

    info!("Running {} against {}", op, client.base_url());

    let state_file = StateFile::new(&args.state);
    let state = match run_lifecycle(op, &client, &state_file, desired).await {
        Ok(state) => state,
        Err(e) => {
            error!("{} failed: {}", op, e);
            return Err(e).with_context(|| format!("{} failed", op));
        }
    };

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

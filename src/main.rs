use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use patient_cohort_query::rpc::McpServer;
use patient_cohort_query::{CohortTools, EngineConfig, FilterArgs, RecordStore, DEFAULT_SAMPLE_CAP};

#[derive(Parser)]
#[command(name = "cohort-query")]
#[command(about = "Patient cohort query engine with a staged-result cache", long_about = None)]
struct Cli {
    /// Patient dataset, JSON array or flattened CSV
    #[arg(long, env = "COHORT_DATA_PATH", default_value = "data/patients.json", global = true)]
    data: PathBuf,
    /// Records returned inline by fetch_records
    #[arg(long, env = "COHORT_SAMPLE_CAP", default_value_t = DEFAULT_SAMPLE_CAP, global = true)]
    sample_cap: usize,
    /// Keep at most this many staged cohorts (unbounded when unset)
    #[arg(long, env = "COHORT_CACHE_MAX_ENTRIES", global = true)]
    cache_max_entries: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tools as JSON-RPC over stdio
    Serve,
    /// Filter patients and print the sample
    Fetch {
        #[arg(long, alias = "department")]
        category: Option<String>,
        #[arg(long)]
        risk_threshold: Option<String>,
        #[arg(long)]
        min_oxygen: Option<String>,
        #[arg(long)]
        max_heart_rate: Option<String>,
    },
    /// Print per-department statistics
    Summary,
    /// Print whole-dataset statistics
    Stats,
    /// Check the engine answers
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::new(cli.sample_cap, cli.cache_max_entries)
        .context("invalid engine configuration")?;
    let store = Arc::new(RecordStore::load_or_empty(&cli.data));
    let tools = CohortTools::new(store, &config);

    match cli.command {
        Commands::Serve => serve(McpServer::new(tools)).await?,
        Commands::Fetch {
            category,
            risk_threshold,
            min_oxygen,
            max_heart_rate,
        } => {
            let args = FilterArgs {
                category: category.map(Value::String),
                risk_threshold: risk_threshold.map(Value::String),
                min_oxygen: min_oxygen.map(Value::String),
                max_heart_rate: max_heart_rate.map(Value::String),
            };
            print_json(&tools.fetch_records(&args))?;
        }
        Commands::Summary => print_json(&tools.summarize_by_category())?,
        Commands::Stats => print_json(&tools.dataset_stats())?,
        Commands::Ping => print_json(&tools.ping())?,
    }

    Ok(())
}

/// One JSON-RPC message per line in, one per line out. Logs go to stderr.
async fn serve(server: McpServer) -> anyhow::Result<()> {
    info!(
        records = server.tools().store().len(),
        sample_cap = server.tools().sample_cap(),
        "cohort query server listening on stdio"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("failed to read from stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(response) = server.handle_line(line) {
            let mut payload = serde_json::to_vec(&response).context("failed to encode response")?;
            payload.push(b'\n');
            stdout
                .write_all(&payload)
                .await
                .context("failed to write response")?;
            stdout.flush().await.context("failed to flush stdout")?;
        }
    }

    info!(staged = server.tools().cache().len(), "EOF on stdin, shutting down");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! workq CLI: operator interface to a Postgres-backed queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use workq::config::{Config, WorkerSettings};
use workq::db::{Db, PgStorage};
use workq::notify::{Notifier, TracingObserver};
use workq::storage::Storage;
use workq::telemetry::{TelemetryConfig, init_telemetry};
use workq::{DispatchOptions, JobId, QueueContext};

#[derive(Parser)]
#[command(name = "workq", about = "Persistent background jobs on Postgres")]
struct Cli {
    /// Worker settings TOML (queue, prefix, ...)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a job
    Dispatch {
        /// Registered handler name
        job_name: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
        /// Retries allowed after the first failure
        #[arg(long, default_value_t = 0)]
        max_retries: u32,
        /// Seconds to wait before the job becomes eligible
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Show a stored envelope
    Show {
        /// Job ID (full UUID)
        id: String,
    },
    /// Delete a stored envelope. A pending id left behind is reported as not
    /// found when a worker claims it.
    Cancel {
        /// Job ID (full UUID)
        id: String,
    },
    /// List stored envelopes and the pending count
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let _guard = init_telemetry(
        TelemetryConfig::new("workq")
            .endpoint(config.otel_endpoint.clone())
            .default_filter(config.log_level.clone()),
    )?;

    let settings = match &cli.settings {
        Some(path) => WorkerSettings::load(path)?,
        None => WorkerSettings::from_config(&config),
    };

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    let storage = PgStorage::open(Arc::new(db), settings.storage_key()).await?;

    match cli.command {
        Command::Dispatch {
            job_name,
            payload,
            max_retries,
            delay,
        } => cmd_dispatch(&settings, storage, job_name, payload, max_retries, delay).await,
        Command::Show { id } => cmd_show(&storage, &id).await,
        Command::Cancel { id } => cmd_cancel(&storage, &id).await,
        Command::List => cmd_list(&storage).await,
    }
}

async fn cmd_dispatch(
    settings: &WorkerSettings,
    storage: PgStorage,
    job_name: String,
    payload: Option<String>,
    max_retries: u32,
    delay: Option<u64>,
) -> anyhow::Result<()> {
    // Validate before persisting; the bytes go through untouched.
    let payload = match payload {
        Some(json) => {
            serde_json::from_str::<serde_json::Value>(&json)?;
            json.into_bytes()
        }
        None => b"{}".to_vec(),
    };

    let mut options = DispatchOptions::new().max_retries(max_retries);
    if let Some(secs) = delay {
        options = options.delay(Duration::from_secs(secs));
    }

    let ctx = QueueContext::new(settings.queue_descriptor(), Arc::new(storage))
        .notifier(Notifier::new().with(Arc::new(TracingObserver)));
    let id = ctx.dispatcher().dispatch_raw(&job_name, payload, options).await?;

    println!("Dispatched: {id} ({job_name} on {})", settings.storage_key());
    Ok(())
}

async fn cmd_show(storage: &PgStorage, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let envelope = storage.get(id).await?;

    println!("ID:           {id}");
    println!("Job:          {}", envelope.job_name);
    println!("Queue:        {}", storage.key());
    println!("Retries left: {}", envelope.max_retry_count);
    println!("Attempts:     {}", envelope.attempts());
    println!(
        "Queued:       {}",
        envelope.queued_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(until) = envelope.delay_until {
        println!("Delay until:  {}", until.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    match std::str::from_utf8(&envelope.payload)
        .ok()
        .and_then(|s| serde_json::from_str::<serde_json::Value>(s).ok())
    {
        Some(json) => println!("Payload:\n{}", serde_json::to_string_pretty(&json)?),
        None => println!("Payload:      {} bytes", envelope.payload.len()),
    }
    Ok(())
}

async fn cmd_cancel(storage: &PgStorage, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    // Surface NotFound instead of silently succeeding.
    storage.get(id).await?;
    storage.clear(id).await?;
    println!("Cancelled: {id}");
    Ok(())
}

async fn cmd_list(storage: &PgStorage) -> anyhow::Result<()> {
    let ids = storage.list().await?;
    if ids.is_empty() {
        println!("No stored jobs in {}.", storage.key());
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<5}  {:<8}  QUEUED",
        "ID", "JOB", "LEFT", "ATTEMPTS"
    );
    println!("{}", "-".repeat(96));
    for id in &ids {
        // Another process may finish the job between list and get.
        let Ok(envelope) = storage.get(*id).await else {
            continue;
        };
        println!(
            "{:<36}  {:<20}  {:<5}  {:<8}  {}",
            id,
            envelope.job_name,
            envelope.max_retry_count,
            envelope.attempts(),
            envelope.queued_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!(
        "\n{} stored, {} pending in {}",
        ids.len(),
        storage.pending_len().await?,
        storage.queue_name()
    );
    Ok(())
}

fn parse_id(raw: &str) -> anyhow::Result<JobId> {
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid job id {raw:?}: {e}"))
}

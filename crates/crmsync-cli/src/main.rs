use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crmsync_client::{CrmConfig, JsonlSource, ReqwestUploader};
use crmsync_core::job::WorkerConfig;
use crmsync_core::traits::PassthroughFormatter;
use crmsync_core::worker::TracingWorkerReporter;
use crmsync_core::{
    BatchExporter, DataType, ExportLauncher, JobExecutor, ResponseHandler, Scheduler, SyncConfig,
    Throttle, WorkerService,
};
use crmsync_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "crmsync", version, about = "Rate-limited commerce to CRM synchronization")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a full export of one data type
    Export {
        /// customer, product or sale
        data_type: DataType,

        /// Id of this launch request; repeating it does not restart the run
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Schedule an upload of one changed item
    Sync {
        /// customer, product or sale
        data_type: DataType,

        /// Id of the changed item
        item_id: String,

        /// Enqueue even when the same sync is already pending
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Show the export state of every data type
    Status,

    /// Run queue workers until interrupted
    Worker {
        /// Directory holding the JSON Lines item exports
        #[arg(short, long, env = "CRMSYNC_SOURCE_DIR")]
        source_dir: PathBuf,

        /// Number of workers (defaults to CRMSYNC_CONCURRENT_BATCHES)
        #[arg(short, long)]
        workers: Option<u32>,

        /// Seconds between polls of an empty queue
        #[arg(long, default_value_t = 5)]
        poll_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("crmsync=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = connect_db().await?;

    match cli.command {
        Commands::Export {
            data_type,
            request_id,
        } => cmd_export(&db, data_type, request_id).await,
        Commands::Sync {
            data_type,
            item_id,
            force,
        } => cmd_sync(&db, data_type, &item_id, force).await,
        Commands::Status => cmd_status(&db).await,
        Commands::Worker {
            source_dir,
            workers,
            poll_secs,
        } => cmd_worker(db, source_dir, workers, Duration::from_secs(poll_secs)).await,
    }
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

fn launcher(
    db: &Database,
) -> ExportLauncher<
    crmsync_db::ExportStateRepository,
    crmsync_db::SyncJobRepository,
    crmsync_db::NoticeRepository,
> {
    ExportLauncher::new(
        db.progress_repo(),
        Scheduler::new(db.job_repo()),
        db.notice_repo(),
    )
}

async fn cmd_export(db: &Database, data_type: DataType, request_id: Option<String>) -> Result<()> {
    let outcome = launcher(db).launch_export(data_type, request_id).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn cmd_sync(db: &Database, data_type: DataType, item_id: &str, force: bool) -> Result<()> {
    let scheduler = Scheduler::new(db.job_repo());
    match scheduler
        .schedule_single_update(data_type, item_id, force)
        .await?
    {
        Some(job) => println!("Scheduled sync of {data_type} {item_id} (job {})", job.id),
        None => println!("A sync of {data_type} {item_id} is already pending"),
    }
    Ok(())
}

async fn cmd_status(db: &Database) -> Result<()> {
    let overview = launcher(db).export_status().await?;

    for state in &overview.exports {
        let total = state
            .total_count
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        let last_sync = state.last_sync.map_or("never", |s| s.as_str());
        println!(
            "  {:<9} {:<24} exported {}/{} (offset {}, variants {}) last sync: {}",
            state.data_type.as_str(),
            state.status.to_string(),
            state.exported_count,
            total,
            state.offset,
            state.sub_offset,
            last_sync,
        );
    }

    if overview.export_in_progress {
        println!("\nAn export is in progress.");
    }

    Ok(())
}

async fn cmd_worker(
    db: Database,
    source_dir: PathBuf,
    workers: Option<u32>,
    poll_interval: Duration,
) -> Result<()> {
    let config = SyncConfig::from_env()?.with_workers(workers);
    let crm = CrmConfig::from_env()?;
    let worker_count = config.concurrent_batches;

    let store = db.progress_repo();
    let queue = db.job_repo();
    let source = JsonlSource::new(&source_dir);
    let uploader = ReqwestUploader::new(&crm)?;
    let scheduler = Scheduler::new(queue.clone());

    let exporter = BatchExporter::new(
        store.clone(),
        source.clone(),
        uploader,
        Arc::new(PassthroughFormatter),
        config.page_size,
    );
    let handler = ResponseHandler::new(
        store.clone(),
        scheduler.clone(),
        db.notice_repo(),
        config.rate_limit_backoff,
    );
    let throttle = Throttle::new(Arc::new(config.clone()));
    let executor = JobExecutor::new(store, source, exporter, handler, scheduler, throttle);

    tracing::info!(
        workers = worker_count,
        requests_per_minute = config.requests_per_minute,
        source_dir = %source_dir.display(),
        "Starting workers"
    );

    let cancel = CancellationToken::new();
    let mut handles = Vec::with_capacity(worker_count as usize);
    for index in 0..worker_count {
        let worker_config = WorkerConfig::default()
            .with_worker_id(format!("crmsync-{}-{index}", std::process::id()))
            .with_poll_interval(poll_interval);
        let service = WorkerService::new(queue.clone(), executor.clone(), worker_config);
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            service.run(cancel, &TracingWorkerReporter).await
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    for handle in handles {
        handle.await.context("Worker task panicked")??;
    }

    Ok(())
}

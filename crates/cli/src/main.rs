//! fifoq CLI - Command-line front end for a local fifoq store

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use fifoq_core::application::QueueEvent;
use fifoq_core::domain::Location;
use fifoq_core::{Job, Queue, QueueOptions};
use fifoq_infra_sqlite::SqliteJobStore;
use serde_json::Value;
use tabled::{Table, Tabled};
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_STORE: &str = "~/.fifoq/queue.db";

#[derive(Parser)]
#[command(name = "fifoq")]
#[command(about = "Durable FIFO job queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Queue store: a database file path, or ":memory:"
    #[arg(long, env = "FIFOQ_STORE", default_value = DEFAULT_STORE)]
    store: String,

    /// Log output format (pretty or json)
    #[arg(long, env = "FIFOQ_LOG_FORMAT", default_value = "pretty")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job
    Add {
        /// Payload as JSON string
        payload: String,
    },

    /// Show the number of live jobs
    Count,

    /// List live jobs
    List {
        /// Only jobs whose payload contains this JSON value
        #[arg(short, long)]
        criteria: Option<String>,
    },

    /// Deliver and acknowledge jobs in order
    Drain {
        /// Jobs prefetched per store read
        #[arg(short, long, default_value = "10")]
        batch_size: i64,

        /// Pause between jobs, in milliseconds
        #[arg(short, long, default_value = "0")]
        delay_ms: i64,

        /// Stop after this many jobs
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

#[derive(Tabled)]
struct JobRow {
    id: i64,
    payload: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            payload: job.payload.as_value().to_string(),
        }
    }
}

fn init_logging(log_format: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("fifoq=info"))
        .context("Failed to create env filter")?;

    match log_format {
        "json" => {
            // Machine-readable output for log collectors
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init();
        }
    }

    Ok(())
}

/// Expand `~` and make sure the parent directory of a file store exists
fn resolve_store(raw: &str) -> Result<String> {
    let expanded = shellexpand::tilde(raw).into_owned();

    if let Location::File(path) = Location::parse(&expanded) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    Ok(expanded)
}

fn parse_json(raw: &str, what: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("Invalid JSON {}", what))
}

async fn open_queue(options: QueueOptions) -> Result<Queue<SqliteJobStore>> {
    let queue = Queue::new(SqliteJobStore::new(), options).context("Invalid queue options")?;
    queue
        .open()
        .await
        .with_context(|| format!("Failed to open queue at {}", queue.config().location))?;
    Ok(queue)
}

async fn drain(queue: &Queue<SqliteJobStore>, limit: Option<usize>) -> Result<usize> {
    if queue.is_empty()? || limit == Some(0) {
        return Ok(0);
    }

    let mut events = queue.events();
    queue.start().await?;

    let mut delivered = 0;
    while let Some(event) = events.recv().await {
        match event {
            QueueEvent::Next(job) => {
                delivered += 1;
                println!(
                    "{} {} {}",
                    "→".cyan(),
                    format!("#{}", job.id).bold(),
                    job.payload.as_value()
                );

                if limit.is_some_and(|limit| delivered >= limit) {
                    queue.stop()?;
                    queue.done().await?;
                    break;
                }
                queue.done().await?;
            }
            QueueEvent::Empty => break,
            QueueEvent::Error(e) => return Err(e).context("Delivery failed"),
            other => debug!(event = ?other.kind(), "Queue event"),
        }
    }

    Ok(delivered)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_format)?;

    let store = resolve_store(&cli.store)?;
    info!(store = %store, "Using queue store");

    match cli.command {
        Commands::Add { payload } => {
            let payload = parse_json(&payload, "payload")?;

            let queue = open_queue(QueueOptions::new(store)).await?;
            let job = queue.add(payload).await?;
            queue.close().await?;

            println!("{}", format!("✓ Job {} enqueued", job.id).green().bold());
        }

        Commands::Count => {
            let queue = open_queue(QueueOptions::new(store)).await?;
            let length = queue.length()?;
            queue.close().await?;

            println!("{}", length);
        }

        Commands::List { criteria } => {
            let criteria = match criteria {
                Some(raw) => parse_json(&raw, "criteria")?,
                None => Value::Object(Default::default()),
            };

            let queue = open_queue(QueueOptions::new(store)).await?;
            let jobs = queue.find_jobs(&criteria).await?;
            queue.close().await?;

            if jobs.is_empty() {
                println!("{}", "No matching jobs".yellow());
            } else {
                let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }

        Commands::Drain {
            batch_size,
            delay_ms,
            limit,
        } => {
            let options = QueueOptions::new(store)
                .batch_size(batch_size)
                .after_process_delay(delay_ms);

            let queue = open_queue(options).await?;
            let result = drain(&queue, limit).await;
            let remaining = queue.length()?;
            queue.close().await?;

            let delivered = result?;
            println!();
            println!(
                "  {} {} jobs processed, {} remaining",
                "✓".green(),
                delivered,
                remaining
            );
        }
    }

    Ok(())
}

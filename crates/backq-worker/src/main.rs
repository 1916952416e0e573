use anyhow::Context;
use backq_core::{MemoryAdapter, MemoryQueue, SignalDispatch, WorkerConfig};
use backq_worker::{LogHandler, Worker};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "backq-worker")]
#[command(about = "Background job worker", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Queue to read jobs from
    #[arg(short, long)]
    queue: Option<String>,

    /// Seconds a single fetch may block (0 = block indefinitely)
    #[arg(long)]
    work_timeout: Option<u64>,

    /// Quit after this many seconds without work (0 = disabled)
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Quit after processing this many jobs (0 = disabled)
    #[arg(long)]
    restart_threshold: Option<u64>,

    /// Collect signals once per loop iteration instead of as they arrive
    #[arg(long)]
    polled_signals: bool,

    /// Print idle-timeout and restart-threshold diagnostics
    #[arg(long)]
    debug: bool,

    /// File of newline-delimited payloads to enqueue before starting
    #[arg(long)]
    jobs: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level, args.log_json);

    let mut config = WorkerConfig::load(args.config.as_deref())
        .context("failed to load worker configuration")?;

    // Override with CLI args
    if let Some(queue) = args.queue {
        config.queue_name = queue;
    }
    if let Some(secs) = args.work_timeout {
        config.work_timeout_secs = secs;
    }
    if let Some(secs) = args.idle_timeout {
        config.idle_timeout_secs = secs;
    }
    if let Some(count) = args.restart_threshold {
        config.restart_threshold = count;
    }
    if args.polled_signals {
        config.signal_dispatch = SignalDispatch::Polled;
    }

    let queue = MemoryQueue::new();
    if let Some(path) = &args.jobs {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read jobs file {}", path))?;
        let mut seeded = 0;
        for line in contents.lines().filter(|line| !line.trim().is_empty()) {
            queue.push(&config.queue_name, line.as_bytes().to_vec());
            seeded += 1;
        }
        tracing::info!("Enqueued {} jobs on '{}'", seeded, config.queue_name);
    }

    let mut worker = Worker::new(MemoryAdapter::new(queue), config);
    worker.toggle_debug(args.debug);

    let mut handler = LogHandler::new();
    let processed = worker.run(&mut handler).await?;

    tracing::info!("Processed {} jobs", processed);
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

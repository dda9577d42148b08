//! notegen: run AI front matter and wikilink generation over a Markdown vault.
//!
//! ```text
//! notegen run --vault ~/notes --front-matter --wikilinks --chunk-size 4
//! notegen history
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notegen_core::{defaults, ProcessingOptions, ProcessingStats, StatsSink, TextGenerator};
use notegen_inference::{OllamaConfig, OllamaGenerator};
use notegen_jobs::{BatchEvent, BatchOrchestrator, BatchRequest, EventBus, EventKind};
use notegen_store::{FsDocumentStore, JsonStatsHistory};

#[derive(Parser)]
#[command(name = "notegen")]
#[command(author, version, about = "AI metadata generation for Markdown notes")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every Markdown file in a vault
    Run(RunArgs),

    /// Show past batch runs
    History {
        /// Stats history file
        #[arg(long, env = "NOTEGEN_HISTORY_FILE", default_value = defaults::STATS_HISTORY_FILE)]
        history: PathBuf,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Vault root directory
    #[arg(short, long, env = "NOTEGEN_VAULT")]
    vault: PathBuf,

    /// Generate YAML front matter
    #[arg(long)]
    front_matter: bool,

    /// Insert wikilinks
    #[arg(long)]
    wikilinks: bool,

    /// Regenerate front matter that already exists
    #[arg(long)]
    overwrite: bool,

    /// Files per chunk
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Cooldown between chunks in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Per-file retry budget
    #[arg(long)]
    max_retries: Option<u32>,

    /// Files in flight at once within a chunk
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Generation model (overrides OLLAMA_GEN_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Stats history file
    #[arg(long, env = "NOTEGEN_HISTORY_FILE", default_value = defaults::STATS_HISTORY_FILE)]
    history: PathBuf,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    /// Options from the environment with CLI flags on top.
    fn options(&self, base: ProcessingOptions) -> ProcessingOptions {
        let mut options = base;
        if let Some(size) = self.chunk_size {
            options = options.with_chunk_size(size);
        }
        if let Some(ms) = self.delay_ms {
            options = options.with_delay_between_chunks(ms);
        }
        if let Some(retries) = self.max_retries {
            options = options.with_max_retries(retries);
        }
        if let Some(max) = self.max_concurrent {
            options = options.with_max_concurrent(max);
        }
        // No step flag means the configured default steps.
        if self.front_matter || self.wikilinks {
            options = options.with_steps(self.front_matter, self.wikilinks);
        }
        options
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_logging();

    let result = match cli.command {
        Commands::Run(args) => cmd_run(args).await,
        Commands::History { history, json } => cmd_history(&history, json).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: "notegen=info")
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "notegen=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = Path::new(path);
        let file_dir = path.parent().unwrap_or(Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("notegen.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console logs go to stderr; stdout carries command output.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let options = args.options(ProcessingOptions::from_env());
    options.validate()?;

    let mut config = OllamaConfig::from_env();
    if let Some(model) = &args.model {
        config = config.with_model(model.clone());
    }
    let generator: Arc<dyn TextGenerator> =
        Arc::new(OllamaGenerator::new(config).context("failed to set up the Ollama backend")?);

    let store = Arc::new(FsDocumentStore::new(&args.vault));
    let history = Arc::new(
        JsonStatsHistory::load(args.history.clone())
            .await
            .with_context(|| format!("failed to load history {}", args.history.display()))?,
    );

    let events = EventBus::default();
    events.on(EventKind::Progress, |envelope| {
        if let BatchEvent::Progress { status } = &envelope.payload {
            let eta = status
                .estimated_time_remaining_ms
                .map(|ms| format!(", ~{:.0}s left", ms / 1000.0))
                .unwrap_or_default();
            eprintln!(
                "[{:>5.1}%] {}/{} files{eta}",
                status.percent_complete(),
                status.files_processed,
                status.files_queued
            );
        }
    });
    events.on(EventKind::Error, |envelope| {
        if let BatchEvent::Error(error) = &envelope.payload {
            eprintln!("  failed: {} ({})", error.file_path, error.error);
        }
    });

    let mut builder = BatchOrchestrator::builder(store)
        .with_event_bus(events)
        .with_stats_sink(history.clone())
        .with_overwrite_front_matter(args.overwrite)
        .with_options(options.clone());
    if options.generate_front_matter {
        builder = builder.with_front_matter_generator(generator.clone());
    }
    if options.generate_wikilinks {
        builder = builder.with_wikilink_generator(generator);
    }
    let orchestrator = Arc::new(builder.build());

    let interrupt = orchestrator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current chunk");
            interrupt.shutdown();
        }
    });

    let files = orchestrator
        .list_documents()
        .await
        .with_context(|| format!("failed to list vault {}", args.vault.display()))?;
    if files.is_empty() {
        println!("No Markdown files found in {}", args.vault.display());
        return Ok(());
    }

    let request = BatchRequest::new(
        files,
        options.generate_front_matter,
        options.generate_wikilinks,
    );
    let outcome = orchestrator.process(request).await;
    history.flush().await;
    let outcome = outcome.context("batch failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_stats(&outcome.stats);
    }
    Ok(())
}

async fn cmd_history(path: &Path, json: bool) -> anyhow::Result<()> {
    let history = JsonStatsHistory::load(path.to_path_buf())
        .await
        .with_context(|| format!("failed to load history {}", path.display()))?;
    let runs = history.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("No runs recorded in {}", path.display());
        return Ok(());
    }
    for stats in &runs {
        print_stats(stats);
    }
    Ok(())
}

fn print_stats(stats: &ProcessingStats) {
    println!(
        "{}  {}  total {:>4}  ok {:>4}  failed {:>4}  skipped {:>4}  avg {:>7.0} ms  took {:.1}s",
        stats.batch_id,
        stats.start_time.format("%Y-%m-%d %H:%M:%S"),
        stats.total_files,
        stats.processed_files,
        stats.error_files,
        stats.skipped_files,
        stats.average_processing_time_ms,
        stats.duration_ms() as f64 / 1000.0
    );
}

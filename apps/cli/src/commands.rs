//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use askdocs_channel::{EmbedWorkerPool, InProcessChannel, MessageChannel};
use askdocs_core::{OffloadBridge, Orchestrator, PipelineOutcome, ProgressReporter, ResultDispatcher};
use askdocs_providers::{
    Answerer, CosineRetriever, EmbeddingBackend, ExtractorRegistry, HashEmbedder, HttpEmbedder,
    OpenRouterAnswerer, ParagraphSplitter, Retriever, TextSplitter,
};
use askdocs_shared::{
    AppConfig, Document, MediaType, init_config, load_config, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// askdocs — ask questions about your documents.
#[derive(Parser)]
#[command(
    name = "askdocs",
    version,
    about = "Answer a natural-language question against a small set of local documents.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Ask a question against one or more documents.
    Ask {
        /// Document paths (.txt, .md, .html).
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// The question to answer.
        #[arg(short, long)]
        question: String,

        /// Embedding round-trip deadline in seconds (overrides config).
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Force the deterministic local embedding backend.
        #[arg(long)]
        local_embeddings: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "askdocs=info",
        1 => "askdocs=debug",
        _ => "askdocs=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask {
            files,
            question,
            timeout_secs,
            local_embeddings,
        } => cmd_ask(&files, &question, timeout_secs, local_embeddings).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// ask
// ---------------------------------------------------------------------------

async fn cmd_ask(
    files: &[PathBuf],
    question: &str,
    timeout_secs: Option<u64>,
    local_embeddings: bool,
) -> Result<()> {
    // Validate the API key before doing anything — the answering model needs it.
    let config = load_config()?;
    validate_api_key(&config)?;

    let documents = read_documents(files)?;
    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.embedding.timeout());

    info!(
        documents = documents.len(),
        timeout_secs = timeout.as_secs(),
        "starting question-answering run"
    );

    // Process-scoped channel resources: created once here, shared by
    // reference with the dispatcher, the bridge, and the worker pool.
    let channel: Arc<dyn MessageChannel> =
        Arc::new(InProcessChannel::new(config.channel.capacity));
    let dispatcher = Arc::new(
        ResultDispatcher::spawn(channel.as_ref(), &config.channel.result_topic).await?,
    );

    let backend = embedding_backend(&config, local_embeddings)?;
    let worker_pool = EmbedWorkerPool::spawn(
        Arc::clone(&channel),
        Arc::clone(&backend),
        &config.channel.request_topic,
        &config.channel.result_topic,
        config.embedding.worker_count,
    )
    .await?;

    let bridge = OffloadBridge::new(
        Arc::clone(&channel),
        dispatcher,
        config.channel.request_topic.clone(),
        config.embedding.batch_size,
    );

    let retriever: Arc<dyn Retriever> = Arc::new(CosineRetriever::new(
        Arc::clone(&backend),
        config.retrieval.top_k,
        config.retrieval.min_score,
    ));
    let answerer: Arc<dyn Answerer> =
        Arc::new(OpenRouterAnswerer::from_config(&config.openrouter)?);
    let splitter: Arc<dyn TextSplitter> = Arc::new(ParagraphSplitter::new(
        config.split.max_chars,
        config.split.overlap,
    ));

    let orchestrator = Orchestrator::new(
        ExtractorRegistry::new(),
        splitter,
        bridge,
        retriever,
        answerer,
        config.pipeline.max_documents,
    );

    let reporter = CliProgress::new();
    let outcome = orchestrator
        .execute(&documents, question, timeout, &reporter)
        .await;

    // Stop consuming embed requests before the process winds down.
    worker_pool.shutdown();

    println!();
    println!("{}", outcome.message());
    println!();

    if !outcome.is_answered() {
        std::process::exit(1);
    }
    Ok(())
}

/// Read each file into a [`Document`], guessing the media type from its
/// extension.
fn read_documents(files: &[PathBuf]) -> Result<Vec<Document>> {
    files
        .iter()
        .map(|path| {
            let bytes = std::fs::read(path)
                .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            Ok(Document::new(name, MediaType::from_path(path), bytes))
        })
        .collect()
}

/// Pick the embedding backend: the configured HTTP endpoint, or the
/// deterministic local embedder.
fn embedding_backend(
    config: &AppConfig,
    local_embeddings: bool,
) -> Result<Arc<dyn EmbeddingBackend>> {
    match &config.embedding.endpoint {
        Some(endpoint) if !local_embeddings => {
            let api_key = std::env::var(&config.openrouter.api_key_env)
                .map_err(|_| eyre!("embedding endpoint configured but no API key is set"))?;
            Ok(Arc::new(HttpEmbedder::new(
                endpoint.clone(),
                config.embedding.model.clone(),
                api_key,
                config.embedding.dimension,
            )))
        }
        _ => Ok(Arc::new(HashEmbedder::new(config.embedding.dimension))),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &PipelineOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

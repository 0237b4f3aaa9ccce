use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use ragbot::ai;
use ragbot::app::App;
use ragbot::config::Config;
use ragbot::dispatcher::{self, Dispatcher};
use ragbot::handler;
use ragbot::logging;
use ragbot::mailbox::mailbox;
use ragbot::prompt::InstructionTemplate;
use ragbot::provider::Provider;
use ragbot::retriever::{self, IndexRetriever};
use ragbot::tui::{self, EventHandler, Tui};
use ragbot::ui;

#[derive(Parser)]
#[command(name = "ragbot")]
#[command(version, about = "Ask questions about a local document index, answered by a language model")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding chunk_embeddings.npy and chunk_metadata.json
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Model provider: openai, claude or ollama
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Model name for the selected provider
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Default number of chunks to retrieve per question
    #[arg(short = 'k', long = "top-k", global = true)]
    top_k: Option<usize>,

    /// Sampling temperature
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Maximum number of questions processed at once (default: no limit)
    #[arg(long, global = true)]
    max_concurrent: Option<usize>,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Open the chat window (default)
    Chat,
    /// List models available for the selected provider
    Models,
    /// Download the query embedding model ahead of time
    DownloadModel,
    /// Write the effective configuration to the config file
    InitConfig,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(index) = &self.index {
            config.index_dir = Some(index.clone());
        }
        if let Some(provider) = self.provider {
            if config.provider() != provider && self.model.is_none() {
                // The saved model belongs to the old provider
                config.default_model = None;
            }
            config.provider = Some(provider.as_str().to_string());
        }
        if let Some(model) = &self.model {
            config.default_model = Some(model.clone());
        }
        if let Some(k) = self.top_k {
            config.default_k = Some(k);
        }
        if let Some(t) = self.temperature {
            config.temperature = Some(t);
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent_queries = Some(n);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to read config file")?;
    cli.apply(&mut config);
    config.validate()?;

    let _log_guard = logging::init_or_warn(config.log_dir());

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(config).await,
        Commands::Models => list_models(&config).await,
        Commands::DownloadModel => Ok(retriever::download_embedding_model()?),
        Commands::InitConfig => {
            let path = config.save()?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

async fn list_models(config: &Config) -> Result<()> {
    let provider = config.provider();
    println!("Models for {}:", provider.display_name());

    match ai::list_models(config).await {
        Ok(models) if models.is_empty() => {
            println!("No models found. Pull a model with: ollama pull {}", provider.default_model());
        }
        Ok(models) => {
            for model in models {
                let marker = if model == config.model() { "*" } else { " " };
                println!(" {} {}", marker, model);
            }
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "listing models failed");
            println!("Error listing models: {}", e);
            if provider == Provider::Ollama {
                println!("Make sure Ollama is running: ollama serve");
            }
        }
    }
    Ok(())
}

async fn run_chat(config: Config) -> Result<()> {
    let index_dir = config.index_dir();
    // The only fatal runtime condition: no index, no app
    let retriever = IndexRetriever::open(&index_dir)
        .with_context(|| format!("Error loading the chunk index from {}", index_dir.display()))?;

    let template = match &config.template_file {
        Some(path) => InstructionTemplate::load(path)
            .with_context(|| format!("Error loading instruction template {}", path.display()))?,
        None => InstructionTemplate::default(),
    };

    let provider = config.provider();
    if provider.api_key_env().is_some() && config.api_key(provider).is_none() {
        warn!(provider = %provider, "no API key configured, every question will fail until one is set");
    }
    if retriever.is_empty() {
        warn!(index = %index_dir.display(), "chunk index is empty, answers will have no context");
    }
    let answerer = ai::from_config(&config);

    let (tx, rx) = mailbox();
    let dispatcher = Dispatcher::new(Arc::new(retriever.clone()), answerer, template, tx)
        .with_concurrency_limit(config.max_concurrent_queries);
    match config.max_concurrent_queries {
        Some(limit) => info!(limit, "concurrent queries capped"),
        None => info!("concurrent queries unbounded"),
    }

    let default_k = NonZeroUsize::new(config.default_k()).unwrap_or_else(dispatcher::default_k);
    let index_label = format!("{} ({} chunks)", retriever.path().display(), retriever.len());
    info!(
        index = %retriever.path().display(),
        chunks = retriever.len(),
        provider = %provider,
        model = %config.model(),
        "starting chat"
    );

    let mut app = App::new(dispatcher, rx, default_k, index_label);

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new(Duration::from_millis(config.poll_interval_ms()));

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    info!(
        questions = app.user_count(),
        answers = app.bot_count(),
        unanswered = app.in_flight,
        "chat closed"
    );
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

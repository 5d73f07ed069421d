//! localmind command-line host
//!
//! Run with: cargo run -p localmind-rag --bin localmind -- chat

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use localmind_rag::providers::{ChatProvider, EmbeddingProvider, OllamaChat, OllamaProvider};
use localmind_rag::types::FileKind;
use localmind_rag::{
    AssistantMode, ContextAssembler, Conversation, IngestProgress, IngestionPipeline,
    IngestionSummary, KnowledgeBase, KnowledgeBaseState, RagConfig, Upload,
};

/// Chat with a local model, grounded in your own documents
#[derive(Parser)]
#[command(name = "localmind")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the user config dir, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Assistant persona
    #[arg(long, global = true, value_enum)]
    mode: Option<AssistantMode>,

    /// Chat model to use
    #[arg(long, global = true)]
    model: Option<String>,

    /// Sampling temperature, clamped to [0, 1]
    #[arg(long, global = true)]
    temperature: Option<f32>,

    /// Answer without consulting the knowledge base
    #[arg(long, global = true)]
    no_rag: bool,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add files or directories to the knowledge base
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a single question
    Ask {
        #[arg(required = true)]
        question: Vec<String>,
    },

    /// Start an interactive chat session
    Chat,

    /// Show the passages retrieved for a query
    Search {
        #[arg(required = true)]
        query: Vec<String>,

        /// Number of passages (defaults to retrieval.top_k)
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Remove every document from the knowledge base
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// List installed Ollama models
    Models,

    /// Show configuration and knowledge base status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let (embedder, chat) = OllamaProvider::new(&config)?.split();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(embedder);

    match cli.command {
        Command::Ingest { paths } => ingest(&config, embedder, &paths).await,
        Command::Ask { question } => {
            let state = connect(&config, embedder, cli.no_rag).await;
            ask(&config, &state, &chat, &question.join(" ")).await
        }
        Command::Chat => {
            let state = connect(&config, embedder, cli.no_rag).await;
            chat_loop(&config, &state, &chat).await
        }
        Command::Search { query, k } => search(&config, embedder, &query.join(" "), k).await,
        Command::Clear { yes } => clear(&config, embedder, yes).await,
        Command::Models => models(&config, &chat).await,
        Command::Status => status(&config, embedder, &chat).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "localmind_rag=warn",
        1 => "localmind_rag=info",
        _ => "localmind_rag=debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("localmind").join("config.toml"))
}

fn load_config(cli: &Cli) -> anyhow::Result<RagConfig> {
    let mut config = match &cli.config {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => RagConfig::from_file(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => RagConfig::default(),
        },
    };

    if let Some(mode) = cli.mode {
        config.assistant.mode = mode;
        config.assistant.system_instruction = None;
    }
    if let Some(model) = &cli.model {
        config.llm.chat_model = model.clone();
    }
    if let Some(temperature) = cli.temperature {
        config.llm.temperature = temperature;
    }

    config.validate()?;
    Ok(config)
}

async fn connect(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    no_rag: bool,
) -> KnowledgeBaseState {
    if no_rag {
        return KnowledgeBaseState::Disabled {
            reason: "disabled with --no-rag".into(),
        };
    }

    let state = KnowledgeBaseState::connect(config, embedder).await;
    if let Some(reason) = state.disabled_reason() {
        eprintln!(
            "{} Knowledge base unavailable, answering without it: {}",
            style("!").yellow().bold(),
            reason
        );
        eprintln!(
            "  Make sure `ollama serve` is running and run `ollama pull {}`.",
            config.embeddings.model
        );
    }
    state
}

async fn require_knowledge_base(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> anyhow::Result<KnowledgeBase> {
    match KnowledgeBaseState::connect(config, embedder).await {
        KnowledgeBaseState::Ready(kb) => Ok(kb),
        KnowledgeBaseState::Disabled { reason } => bail!(
            "Knowledge base unavailable: {} (is `ollama serve` running and `{}` pulled?)",
            reason,
            config.embeddings.model
        ),
    }
}

/// Expand directories into the supported files beneath them
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| is_supported(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(FileKind::from_tag)
        .is_some()
}

async fn ingest(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    paths: &[PathBuf],
) -> anyhow::Result<()> {
    let kb = require_knowledge_base(config, embedder).await?;
    let pipeline = IngestionPipeline::from_config(config)?;

    let mut uploads = Vec::new();
    for path in collect_files(paths) {
        match Upload::from_path(&path) {
            Ok(upload) => uploads.push(upload),
            Err(e) => eprintln!("{} {}", style("✗").red(), e),
        }
    }
    if uploads.is_empty() {
        bail!("No readable files to ingest");
    }

    let bar = ProgressBar::new(uploads.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg:>10} [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.set_message("loading");

    let summary = pipeline
        .ingest(&kb, &uploads, |event| match event {
            IngestProgress::Loading { done, total } => {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            }
            IngestProgress::Embedding {
                batch,
                total_batches,
                ..
            } => {
                if batch == 1 {
                    bar.reset();
                    bar.set_length(total_batches as u64);
                    bar.set_message("embedding");
                }
                bar.set_position(batch as u64);
            }
        })
        .await;
    bar.finish_and_clear();

    print_summary(&summary, kb.store().len());
    if let Some(reason) = &summary.aborted {
        bail!("Ingestion stopped: {}", reason);
    }
    Ok(())
}

fn print_summary(summary: &IngestionSummary, indexed: usize) {
    for skipped in &summary.skipped {
        println!("{} {}: {}", style("✗").red(), skipped.filename, skipped.reason);
    }
    for warning in &summary.warnings {
        println!("{} {}", style("!").yellow(), warning);
    }
    for failed in &summary.failed_batches {
        println!(
            "{} batch {} ({} chunks): {}",
            style("✗").red(),
            failed.index + 1,
            failed.chunk_count,
            failed.message
        );
    }

    println!(
        "{} {} file(s) loaded, {} of {} chunk(s) stored, {} chunk(s) in the knowledge base",
        style("✓").green(),
        summary.files_loaded.len(),
        summary.chunks_inserted,
        summary.chunks_total,
        indexed
    );
}

async fn warn_if_model_missing(config: &RagConfig, chat: &OllamaChat) {
    match chat.is_model_available().await {
        Ok(true) => {}
        Ok(false) => eprintln!(
            "{} Model `{}` is not installed. Run `ollama pull {}`.",
            style("!").yellow().bold(),
            chat.model(),
            chat.model()
        ),
        Err(e) => eprintln!(
            "{} Cannot reach Ollama at {} ({}). Start it with `ollama serve`.",
            style("!").yellow().bold(),
            config.llm.base_url,
            e
        ),
    }
}

/// Run one turn, printing fragments as they arrive; Ctrl-C abandons the reply
async fn run_turn(
    config: &RagConfig,
    conversation: &mut Conversation,
    state: &KnowledgeBaseState,
    retriever: &ContextAssembler,
    chat: &OllamaChat,
    text: &str,
) {
    let turn = conversation.respond(state, retriever, chat, text, |fragment| {
        print!("{}", fragment);
        let _ = std::io::stdout().flush();
    });

    let outcome = tokio::select! {
        outcome = turn => outcome,
        _ = tokio::signal::ctrl_c() => {
            println!();
            eprintln!("{} Reply cancelled", style("!").yellow());
            return;
        }
    };
    println!();

    if outcome.context_used && !outcome.sources.is_empty() {
        println!(
            "{}",
            style(format!("Sources: {}", outcome.sources.join("; "))).dim()
        );
    }
    if let Some(e) = outcome.error {
        eprintln!("{} {}", style("Error talking to the model:").red().bold(), e);
        eprintln!(
            "  Make sure `ollama serve` is running and `ollama pull {}` has been run.",
            config.llm.chat_model
        );
    }
}

async fn ask(
    config: &RagConfig,
    state: &KnowledgeBaseState,
    chat: &OllamaChat,
    question: &str,
) -> anyhow::Result<()> {
    warn_if_model_missing(config, chat).await;
    let mut conversation = Conversation::from_config(config);
    let retriever = ContextAssembler::from_config(&config.retrieval);
    run_turn(config, &mut conversation, state, &retriever, chat, question).await;
    Ok(())
}

async fn chat_loop(
    config: &RagConfig,
    state: &KnowledgeBaseState,
    chat: &OllamaChat,
) -> anyhow::Result<()> {
    warn_if_model_missing(config, chat).await;
    let mut conversation = Conversation::from_config(config);
    let retriever = ContextAssembler::from_config(&config.retrieval);

    println!(
        "{} {} · {} · knowledge base {}",
        style("localmind").cyan().bold(),
        chat.model(),
        config.assistant.mode.label(),
        if state.is_enabled() { "on" } else { "off" }
    );
    println!("{}", style("/clear resets the conversation, /exit quits").dim());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", style(">").green().bold());
        std::io::stdout().flush()?;

        let Some(line) = next_prompt_line(&mut lines, tokio::signal::ctrl_c()).await? else {
            break;
        };
        let text = line.trim();
        match text {
            "" => continue,
            "/exit" | "/quit" => break,
            "/clear" => {
                conversation.clear_history();
                println!("{}", style("Conversation cleared").dim());
                continue;
            }
            _ => {}
        }

        run_turn(config, &mut conversation, state, &retriever, chat, text).await;
    }
    Ok(())
}

/// Read one prompt line; `None` on end of input or when `interrupt` fires
///
/// Once a turn has listened for Ctrl-C the signal no longer exits the
/// process, so the prompt has to watch for it too.
async fn next_prompt_line<R, I>(
    lines: &mut Lines<R>,
    interrupt: I,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    I: Future,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

async fn search(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    query: &str,
    k: Option<usize>,
) -> anyhow::Result<()> {
    let kb = require_knowledge_base(config, embedder).await?;
    let hits = kb
        .store()
        .similarity_search(query, k.unwrap_or(config.retrieval.top_k))
        .await?;

    if hits.is_empty() {
        println!("No matching passages.");
        return Ok(());
    }
    for (rank, hit) in hits.iter().enumerate() {
        let snippet: String = hit.chunk.text.chars().take(200).collect();
        println!(
            "{} {} {}",
            style(format!("[{}]", rank + 1)).bold(),
            style(format!("{:.3}", hit.score)).cyan(),
            hit.chunk.format_citation()
        );
        println!("    {}", snippet.replace('\n', " "));
    }
    Ok(())
}

async fn clear(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    yes: bool,
) -> anyhow::Result<()> {
    let kb = require_knowledge_base(config, embedder).await?;

    if !yes {
        print!(
            "Remove all {} chunk(s) from {}? Type 'yes' to confirm: ",
            kb.store().len(),
            kb.store().persist_dir().display()
        );
        std::io::stdout().flush()?;
        let answer = BufReader::new(tokio::io::stdin())
            .lines()
            .next_line()
            .await?
            .unwrap_or_default();
        if answer.trim() != "yes" {
            println!("Aborted.");
            return Ok(());
        }
    }

    kb.clear()?;
    println!("{} Knowledge base cleared", style("✓").green());
    Ok(())
}

async fn models(config: &RagConfig, chat: &OllamaChat) -> anyhow::Result<()> {
    let installed = chat
        .list_models()
        .await
        .with_context(|| format!("Cannot reach Ollama at {}", config.llm.base_url))?;

    for name in &installed {
        let marker = if localmind_rag::generation::ollama::model_matches(name, &config.llm.chat_model) {
            style("*").green().bold().to_string()
        } else {
            " ".to_string()
        };
        println!("{} {}", marker, name);
    }
    if !chat.is_model_available().await.unwrap_or(false) {
        println!(
            "{} Configured model `{}` is not installed. Run `ollama pull {}`.",
            style("!").yellow().bold(),
            config.llm.chat_model,
            config.llm.chat_model
        );
    }
    Ok(())
}

async fn status(
    config: &RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: &OllamaChat,
) -> anyhow::Result<()> {
    println!("{}", style("Configuration").bold());
    println!("  Ollama:        {}", config.llm.base_url);
    println!("  Chat model:    {}", config.llm.chat_model);
    println!("  Embeddings:    {} ({} dims)", config.embeddings.model, config.embeddings.dimensions);
    println!("  Mode:          {}", config.assistant.mode.label());
    println!("  Temperature:   {}", config.llm.effective_temperature());
    println!(
        "  Chunking:      {} chars, {} overlap, batches of {}",
        config.chunking.chunk_size, config.chunking.chunk_overlap, config.ingestion.batch_size
    );

    println!("{}", style("Knowledge base").bold());
    match KnowledgeBaseState::connect(config, embedder).await {
        KnowledgeBaseState::Ready(kb) => {
            let store = kb.store();
            println!("  Location:      {}", store.persist_dir().display());
            println!("  Chunks:        {}", store.len());
            println!("  Distance:      {}", store.distance_metric().as_str());
        }
        KnowledgeBaseState::Disabled { reason } => {
            println!("  {} {}", style("unavailable:").red(), reason);
        }
    }

    println!("{}", style("Chat model").bold());
    match chat.is_model_available().await {
        Ok(true) => println!("  {} {} installed", style("✓").green(), chat.model()),
        Ok(false) => println!(
            "  {} {} missing (run `ollama pull {}`)",
            style("✗").red(),
            chat.model(),
            chat.model()
        ),
        Err(e) => println!("  {} Ollama unreachable: {}", style("✗").red(), e),
    }
    Ok(())
}

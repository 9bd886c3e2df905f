use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use subject_chat_core::{
    CharacterNgramEmbedder, ChatOptions, ChatOrchestrator, ChunkingConfig, CompletionProvider,
    ContextEchoCompletion, DirectoryDocumentStore, EmbeddingProvider, FileSessionStore,
    HttpCompletionClient, HttpEmbeddingClient, LopdfExtractor, OcrEndpointConfig,
    OcrFallbackExtractor, ProviderEndpoint, SubjectFilters, DEFAULT_CHAT_MODEL,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBED_CONCURRENCY, DEFAULT_TOP_K,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "subject-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Root folder holding <year>/<semester>/<subject>/<unit>/*.pdf
    #[arg(long, env = "SUBJECT_CHAT_DOCUMENTS", default_value = "./subject-pdfs")]
    documents_dir: PathBuf,

    /// Folder where chat sessions are persisted
    #[arg(long, env = "SUBJECT_CHAT_SESSIONS", default_value = "./chat-sessions")]
    sessions_dir: PathBuf,

    #[command(flatten)]
    provider: ProviderArgs,

    /// Number of chunks passed to the model as context
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Longest chunk in characters before it is windowed
    #[arg(long, default_value = "1200")]
    chunk_max_chars: usize,

    /// Characters shared between consecutive windows of a long paragraph
    #[arg(long, default_value = "120")]
    chunk_overlap_chars: usize,
}

#[derive(Args)]
struct ProviderArgs {
    /// OpenAI-compatible API base URL
    #[arg(long, env = "LLM_API_BASE_URL", default_value = "https://api.openai.com/v1")]
    api_base_url: String,

    /// API key sent as a bearer token
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Embedding model name
    #[arg(long, env = "LLM_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Chat-completion model name
    #[arg(long, env = "LLM_CHAT_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Concurrent embedding requests per question
    #[arg(long, default_value_t = DEFAULT_EMBED_CONCURRENCY)]
    embed_concurrency: usize,

    /// Use the local n-gram embedder and answer with the retrieved passages
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Multimodal OCR endpoint used when a PDF has no extractable text
    #[arg(long, env = "LLM_OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    /// Bearer token for the OCR endpoint
    #[arg(long, env = "LLM_OCR_API_KEY", hide_env_values = true)]
    ocr_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Open a chat session over the PDFs of one unit.
    Start {
        #[arg(long)]
        year: String,
        #[arg(long)]
        semester: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        unit: String,
    },
    /// Ask a question within an existing session.
    Ask {
        #[arg(long)]
        session: String,
        #[arg(long)]
        question: String,
    },
    /// Print the messages of a session in order.
    History {
        #[arg(long)]
        session: String,
    },
    /// Delete sessions that have been idle for longer than the given days.
    Purge {
        #[arg(long, default_value = "30")]
        max_idle_days: i64,
    },
}

fn build_providers(
    args: &ProviderArgs,
) -> anyhow::Result<(Arc<dyn EmbeddingProvider>, Arc<dyn CompletionProvider>)> {
    if args.offline {
        return Ok((
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(ContextEchoCompletion),
        ));
    }

    if args.api_key.is_none() {
        anyhow::bail!("an API key is required unless --offline is set (LLM_API_KEY)");
    }

    let endpoint = ProviderEndpoint::new(&args.api_base_url, args.api_key.clone())?;
    let embedder = HttpEmbeddingClient::new(endpoint.clone(), &args.embedding_model)
        .with_max_concurrency(args.embed_concurrency);
    let completion = HttpCompletionClient::new(endpoint, &args.chat_model);

    Ok((Arc::new(embedder), Arc::new(completion)))
}

/// Negative values count as zero.
fn idle_window(days: i64) -> anyhow::Result<Duration> {
    Duration::try_days(days.max(0))
        .ok_or_else(|| anyhow::anyhow!("--max-idle-days {days} is out of range"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let chunking = ChunkingConfig {
        max_chars: cli.chunk_max_chars,
        overlap_chars: cli.chunk_overlap_chars,
        ..ChunkingConfig::default()
    };
    chunking.validate()?;

    let options = ChatOptions {
        top_k: cli.top_k.max(1),
        chunking,
        ..ChatOptions::default()
    };

    let (embedder, completion) = build_providers(&cli.provider)?;
    let extractor = OcrFallbackExtractor::new(
        LopdfExtractor,
        OcrEndpointConfig::from_parts(
            cli.provider.ocr_endpoint.clone(),
            cli.provider.ocr_api_key.clone(),
        ),
    );
    let sessions = FileSessionStore::open(&cli.sessions_dir).await?;

    let orchestrator = ChatOrchestrator::with_options(
        DirectoryDocumentStore::new(&cli.documents_dir),
        extractor,
        embedder,
        completion,
        sessions,
        options,
    );

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        offline = cli.provider.offline,
        "subject-chat boot"
    );

    match cli.command {
        Command::Start {
            year,
            semester,
            subject,
            unit,
        } => {
            let filters = SubjectFilters::new(year, semester, subject, unit);
            let session_id = orchestrator.start_chat(filters).await?;
            println!("{session_id}");
        }
        Command::Ask { session, question } => {
            let answer = orchestrator.ask_question(&session, &question).await?;
            println!("{answer}");
        }
        Command::History { session } => {
            let messages = orchestrator.get_history(&session).await?;
            if messages.is_empty() {
                println!("(no messages yet)");
            }
            for message in messages {
                println!(
                    "[{}] {}: {}",
                    message.timestamp.to_rfc3339(),
                    message.role.as_str(),
                    message.content
                );
            }
        }
        Command::Purge { max_idle_days } => {
            let max_idle = idle_window(max_idle_days)?;
            let removed = orchestrator.purge_idle_sessions(max_idle).await?;
            println!("{removed} idle session(s) removed");
        }
    }

    Ok(())
}

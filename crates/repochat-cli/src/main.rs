//! CLI entry point for repochat: ingest a repository, then ask questions about its code.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use repochat_core::{
    app_data_dir, chunk_file, index_path, load_config, repos_dir, save_config, scan_repository,
    status, AnyCompleter, Answer, GitSource, OllamaClient, RagError, Session, SessionState, Settings,
    StoreError, VectorIndex, VectorStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

type CliSession = Session<GitSource, OllamaClient, VectorStore, AnyCompleter>;

#[derive(Parser)]
#[command(name = "repochat")]
#[command(about = "repochat: ask questions about a code repository")]
struct Cli {
    /// Log progress (info level) to stderr. RUST_LOG overrides.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show configuration and indexed repositories.
    Status,
    /// Show where repochat stores its config, index, and clones.
    DataDir,
    /// List the files under a directory that ingestion would index.
    Scan {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Clone (or refresh) a repository and index it.
    Ingest {
        /// GitHub `owner/name`, a git URL, or a local directory.
        #[arg(value_name = "LOCATION")]
        location: String,
    },
    /// Ask one question about an already ingested repository.
    Ask {
        #[arg(value_name = "LOCATION")]
        location: String,
        #[arg(value_name = "QUESTION", num_args = 1.., required = true)]
        question: Vec<String>,
    },
    /// Interactive chat. Starts on LOCATION if it was ingested before.
    Chat {
        #[arg(value_name = "LOCATION")]
        location: Option<String>,
    },
    /// Show or change the persisted configuration.
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    Show,
    /// e.g. `repochat config set completion_backend ollama`
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command.unwrap_or(Commands::Status)).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {message}");
            std::process::ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<(), String> {
    match command {
        Commands::Status => show_status().await,
        Commands::DataDir => {
            let dir = app_data_dir().ok_or("could not determine app data directory")?;
            println!("{}", dir.display());
            Ok(())
        }
        Commands::Scan { path } => {
            let report = scan_repository(&path).map_err(|e| e.to_string())?;
            let config = load_config();
            println!("Found {} file(s) under {}", report.files.len(), path.display());
            for f in &report.files {
                let chunks = chunk_file(f, config.max_chunk_chars).len();
                println!("  {}  ({} chunk(s))", f.relative_path, chunks);
            }
            for s in &report.skipped {
                println!("  skipped {}: {}", s.path.display(), s.reason);
            }
            Ok(())
        }
        Commands::Ingest { location } => {
            let mut session = build_session()?;
            println!("Ingesting {location}...");
            let report = session
                .initialize(&location)
                .await
                .map_err(|e| e.user_message())?;
            println!(
                "Indexed {} chunk(s) from {} of {} file(s) into {} in {} ms",
                report.chunks_written,
                report.files_indexed,
                report.files_scanned,
                report.namespace,
                report.duration_ms
            );
            if report.files_skipped > 0 {
                println!("Skipped {} unreadable file(s).", report.files_skipped);
            }
            Ok(())
        }
        Commands::Ask { location, question } => {
            let mut session = build_session()?;
            session.resume(&location).await.map_err(|e| e.user_message())?;
            let answer = session
                .ask(&question.join(" "))
                .await
                .map_err(|e| e.user_message())?;
            print_answer(&answer);
            Ok(())
        }
        Commands::Chat { location } => chat(location).await,
        Commands::Config { action } => match action.unwrap_or(ConfigAction::Show) {
            ConfigAction::Show => {
                let text = load_config().to_toml().map_err(|e| e.to_string())?;
                print!("{text}");
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                let mut config = load_config();
                config.set(&key, &value).map_err(|e| e.to_string())?;
                save_config(&config).map_err(|e| e.to_string())?;
                println!("{key} = {value}");
                Ok(())
            }
        },
    }
}

async fn show_status() -> Result<(), String> {
    let settings = Settings::from_env(load_config());
    println!("repochat");
    println!("  core: {}", status());
    println!(
        "  completion: {:?} / {}",
        settings.config.completion_backend,
        settings.completion_model()
    );
    println!("  embeddings: {} at {}", settings.config.embed_model, settings.config.ollama_url);
    match settings.require_credentials() {
        Ok(()) => println!("  credentials: ok"),
        Err(e) => println!("  credentials: {e}"),
    }
    let store = open_store().map_err(|e| e.to_string())?;
    let namespaces = store.namespaces().await.map_err(|e| e.to_string())?;
    if namespaces.is_empty() {
        println!("  no repositories indexed yet");
    }
    for (name, info) in namespaces {
        println!(
            "  {name}  {} chunk(s), {} ({} dims)",
            info.entries, info.space.model, info.space.dimension
        );
    }
    Ok(())
}

fn open_store() -> Result<VectorStore, StoreError> {
    match index_path() {
        Some(path) => VectorStore::open(path),
        None => {
            tracing::warn!("no app data directory; index will not be persisted");
            Ok(VectorStore::new())
        }
    }
}

fn build_session() -> Result<CliSession, String> {
    let settings = Settings::from_env(load_config());
    let completer = AnyCompleter::from_settings(&settings)
        .map_err(|e| RagError::from(e).user_message())?;
    let embedder = OllamaClient::from_url(&settings.config.ollama_url)
        .map_err(|e| e.to_string())?
        .with_embed_model(settings.config.embed_model.clone());
    let clone_root = repos_dir().unwrap_or_else(|| std::env::temp_dir().join("repochat-repos"));
    let store = open_store().map_err(|e| e.to_string())?;
    Ok(Session::new(
        settings,
        GitSource::new(clone_root),
        embedder,
        store,
        completer,
    ))
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text.trim());
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for s in &answer.sources {
            println!(
                "  {} [{}/{}]  score {:.2}",
                s.source_path,
                s.chunk_index + 1,
                s.total_chunks,
                s.score
            );
        }
    }
}

async fn chat(location: Option<String>) -> Result<(), String> {
    let mut session = build_session()?;
    if let Some(location) = location {
        match session.resume(&location).await {
            Ok(()) => println!("Chatting about {location}."),
            Err(RagError::NamespaceNotInitialized(_)) => initialize(&mut session, &location).await,
            Err(e) => println!("{}", e.user_message()),
        }
    }
    println!("Type a question, /init <location> to switch repository, /history, or /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();
        let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }
        if line == "/history" {
            for m in &session.conversation().messages {
                println!("[{:?}] {}", m.role, m.content);
            }
            continue;
        }
        if let Some(location) = init_argument(line) {
            initialize(&mut session, location).await;
            continue;
        }
        if !matches!(session.state(), SessionState::Ready { .. }) {
            println!("{}", RagError::NotReady.user_message());
            continue;
        }
        println!("thinking...");
        match session.ask(line).await {
            Ok(answer) => print_answer(&answer),
            Err(e) => println!("{}", e.user_message()),
        }
    }
    Ok(())
}

/// The location after a `/init` command, or `None` if `line` is not one.
fn init_argument(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("/init")?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

async fn initialize(session: &mut CliSession, location: &str) {
    if location.is_empty() {
        println!("Usage: /init <owner/name | git URL | directory>");
        return;
    }
    println!("Initializing {location}... (this can take a while)");
    match session.initialize(location).await {
        Ok(report) => println!(
            "Ready: {} chunk(s) from {} file(s) in {}.",
            report.chunks_written, report.files_indexed, report.namespace
        ),
        Err(e) => println!("{}", e.user_message()),
    }
}

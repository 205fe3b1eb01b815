//! Clausegraph CLI: contract categorisation, explanation and QA.
//!
//! Usage:
//!   clausegraph process <file> [--contract id] [--fresh] [--json]
//!   clausegraph ask <question> [--contract id]
//!   clausegraph categories [--contract id]
//!   clausegraph email [--accepted f] [--rejected f] [--countered f]
//!
//! Model calls go to an OpenAI-compatible API; the key is read from
//! `OPENAI_API_KEY`. `categories` reads the store only and needs no key.
//! Built with `--features embeddings`, `--local-embeddings` embeds with
//! fastembed and searches segments through a sqlite-vec index.

use clap::{Parser, Subcommand};
use clausegraph::pipeline::draft_negotiation_email;
use clausegraph::{
    category_summaries, AnalyzerConfig, CategoryStore, ContractAnalyzer, ContractId, Embedder,
    OpenAiChatClient, OpenAiEmbedder, OpenStore, SqliteStore,
};
#[cfg(feature = "embeddings")]
use clausegraph::{FastEmbedEmbedder, SqliteVecStore, LOCAL_EMBEDDING_DIMENSIONS};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const API_KEY_VAR: &str = "OPENAI_API_KEY";
const DEFAULT_CONTRACT: &str = "default";

#[derive(Parser)]
#[command(
    name = "clausegraph",
    version,
    about = "Contract knowledge graph: clause categories, explanations and QA"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to a YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Embed locally with fastembed and index segments with sqlite-vec
    #[cfg(feature = "embeddings")]
    #[arg(long, global = true)]
    local_embeddings: bool,
}

impl Cli {
    #[cfg(feature = "embeddings")]
    fn local_embeddings(&self) -> bool {
        self.local_embeddings
    }

    #[cfg(not(feature = "embeddings"))]
    fn local_embeddings(&self) -> bool {
        false
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Categorise and explain a contract
    Process {
        /// Plain-text contract file
        file: PathBuf,
        /// Contract id to store it under
        #[arg(long, default_value = DEFAULT_CONTRACT)]
        contract: String,
        /// Discard previously stored categories for this contract first
        #[arg(long)]
        fresh: bool,
        /// Print explanations as JSON
        #[arg(long)]
        json: bool,
    },
    /// Ask a question about a processed contract
    Ask {
        question: String,
        #[arg(long, default_value = DEFAULT_CONTRACT)]
        contract: String,
    },
    /// List categories with their segment counts
    Categories {
        #[arg(long, default_value = DEFAULT_CONTRACT)]
        contract: String,
    },
    /// Draft a negotiation email from accepted, rejected and countered clauses
    Email {
        /// File with accepted clauses
        #[arg(long)]
        accepted: Option<PathBuf>,
        /// File with rejected clauses
        #[arg(long)]
        rejected: Option<PathBuf>,
        /// File with countered clauses and proposed changes
        #[arg(long)]
        countered: Option<PathBuf>,
    },
}

/// Get the default database path (~/.local/share/clausegraph/clausegraph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let app_dir = data_dir.join("clausegraph");
    std::fs::create_dir_all(&app_dir).ok();
    app_dir.join("clausegraph.db")
}

fn init_logging(verbose: bool) {
    let default = if verbose { "clausegraph=debug" } else { "clausegraph=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AnalyzerConfig, String> {
    match path {
        Some(path) => AnalyzerConfig::from_yaml_file(path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e)),
        None => Ok(AnalyzerConfig::default()),
    }
}

fn chat_client(config: &AnalyzerConfig) -> Result<OpenAiChatClient, String> {
    let api_key = std::env::var(API_KEY_VAR).map_err(|_| format!("{} is not set", API_KEY_VAR))?;
    OpenAiChatClient::new(
        api_key,
        config.api_base_url.as_str(),
        config.chat_model.as_str(),
        config.request_timeout(),
    )
    .map_err(|e| format!("Failed to create chat client: {}", e))
}

fn remote_embedder(config: &AnalyzerConfig) -> Result<Arc<dyn Embedder>, String> {
    let api_key = std::env::var(API_KEY_VAR).map_err(|_| format!("{} is not set", API_KEY_VAR))?;
    let embedder = OpenAiEmbedder::new(
        api_key,
        config.api_base_url.as_str(),
        config.embedding_model.as_str(),
        config.embedding_max_input_chars,
        config.request_timeout(),
    )
    .map_err(|e| format!("Failed to create embedder: {}", e))?;
    Ok(Arc::new(embedder))
}

#[cfg(feature = "embeddings")]
fn open_embedder(config: &AnalyzerConfig, local: bool) -> Result<Arc<dyn Embedder>, String> {
    if !local {
        return remote_embedder(config);
    }
    let embedder = FastEmbedEmbedder::default_model()
        .map_err(|e| format!("Failed to load local embedding model: {}", e))?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "embeddings"))]
fn open_embedder(config: &AnalyzerConfig, _local: bool) -> Result<Arc<dyn Embedder>, String> {
    remote_embedder(config)
}

#[cfg(feature = "embeddings")]
fn open_store(db_path: &Path, local: bool) -> Result<Arc<dyn CategoryStore>, String> {
    if local {
        let store = SqliteVecStore::open(db_path, LOCAL_EMBEDDING_DIMENSIONS)
            .map_err(|e| format!("Failed to open database: {}", e))?;
        return Ok(Arc::new(store));
    }
    let store = SqliteStore::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "embeddings"))]
fn open_store(db_path: &Path, _local: bool) -> Result<Arc<dyn CategoryStore>, String> {
    let store = SqliteStore::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

fn open_analyzer(
    db_path: &Path,
    local: bool,
    config: AnalyzerConfig,
    contract: &str,
) -> Result<ContractAnalyzer, String> {
    let llm = chat_client(&config)?;
    let embedder = open_embedder(&config, local)?;
    let store = open_store(db_path, local)?;
    Ok(ContractAnalyzer::new(ContractId::from_string(contract), Arc::new(llm), embedder, store)
        .with_config(config))
}

/// Run one async command on a fresh runtime.
fn block_on<F: Future<Output = i32>>(command: F) -> i32 {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(command),
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            1
        }
    }
}

fn read_optional(path: Option<&Path>) -> Result<String, String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e)),
        None => Ok(String::new()),
    }
}

async fn cmd_process(analyzer: &ContractAnalyzer, file: &Path, fresh: bool, json: bool) -> i32 {
    let text = match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", file.display(), e);
            return 1;
        }
    };

    if fresh {
        if let Err(e) = analyzer.clear() {
            eprintln!("Error: {}", e);
            return 1;
        }
    }

    let explanations = match analyzer.process_contract(&text).await {
        Ok(explanations) => explanations,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&explanations) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
        return 0;
    }

    for item in &explanations {
        println!("## {}", item.clause);
        println!("{}", item.explanation.meaning);
        for counter in &item.explanation.counters {
            println!("  - {}", counter);
        }
        println!();
    }
    println!("{} clause(s) in contract '{}'", explanations.len(), analyzer.contract());
    0
}

async fn cmd_ask(analyzer: &ContractAnalyzer, question: &str) -> i32 {
    match analyzer.answer_question(question).await {
        Ok(answer) => {
            println!("{}", answer);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_categories(db_path: &Path, local: bool, contract: &str) -> i32 {
    let store = match open_store(db_path, local) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let contract = ContractId::from_string(contract);
    let categories = match category_summaries(store.as_ref(), &contract) {
        Ok(categories) => categories,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if categories.is_empty() {
        println!("No categories for contract '{}'", contract);
        return 0;
    }
    let width = categories.iter().map(|c| c.name.len()).max().unwrap_or(4).max(4);
    println!("{:<width$}  SEGMENTS", "NAME", width = width);
    for category in &categories {
        println!("{:<width$}  {}", category.name, category.segments, width = width);
    }
    0
}

async fn cmd_email(
    llm: &OpenAiChatClient,
    temperature: f32,
    accepted: Option<&Path>,
    rejected: Option<&Path>,
    countered: Option<&Path>,
) -> i32 {
    let sections = read_optional(accepted).and_then(|a| {
        let r = read_optional(rejected)?;
        let c = read_optional(countered)?;
        Ok((a, r, c))
    });
    let (accepted, rejected, countered) = match sections {
        Ok(sections) => sections,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match draft_negotiation_email(llm, &accepted, &rejected, &countered, temperature).await {
        Ok(email) => {
            println!("{}", email);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let local = cli.local_embeddings();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let db_path = cli.db.clone().unwrap_or_else(default_db_path);

    let code = match &cli.command {
        Commands::Categories { contract } => cmd_categories(&db_path, local, contract),
        Commands::Email {
            accepted,
            rejected,
            countered,
        } => match chat_client(&config) {
            Ok(llm) => block_on(cmd_email(
                &llm,
                config.email_temperature,
                accepted.as_deref(),
                rejected.as_deref(),
                countered.as_deref(),
            )),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Process {
            file,
            contract,
            fresh,
            json,
        } => match open_analyzer(&db_path, local, config, contract) {
            Ok(analyzer) => block_on(cmd_process(&analyzer, file, *fresh, *json)),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Ask { question, contract } => {
            match open_analyzer(&db_path, local, config, contract) {
                Ok(analyzer) => block_on(cmd_ask(&analyzer, question)),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    1
                }
            }
        }
    };
    std::process::exit(code);
}
